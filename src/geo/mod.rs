//! Geographic helpers shared by the day summaries and run detection.

pub mod dbscan;

pub use dbscan::{cluster, DbscanResult};

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Anything that may carry a coordinate.
pub trait Located {
    fn location(&self) -> Option<(f64, f64)>;
}

impl Located for crate::media::Media {
    fn location(&self) -> Option<(f64, f64)> {
        self.coordinates()
    }
}

impl Located for (f64, f64) {
    fn location(&self) -> Option<(f64, f64)> {
        Some(*self)
    }
}

/// Great-circle distance between two coordinates, in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// Arithmetic centroid of a set of coordinates. `None` for an empty set.
pub fn centroid<I>(points: I) -> Option<(f64, f64)>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut count = 0usize;
    let (mut lat, mut lon) = (0.0, 0.0);
    for (p_lat, p_lon) in points {
        lat += p_lat;
        lon += p_lon;
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some((lat / count as f64, lon / count as f64))
}

pub fn midpoint(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0)
}
