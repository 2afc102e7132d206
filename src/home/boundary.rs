//! Time-bounded home centers.

use chrono::{DateTime, Utc};

use super::{Home, HomeCenter};
use crate::geo::haversine_km;

/// Centers valid at `at`. Falls back to every center when none is valid,
/// and to the home's own location when no centers are declared.
pub fn centers(home: &Home, at: DateTime<Utc>) -> Vec<HomeCenter> {
    if home.centers.is_empty() {
        return vec![HomeCenter {
            latitude: home.latitude,
            longitude: home.longitude,
            radius_km: Some(home.radius_km),
            valid_from: None,
            valid_until: None,
        }];
    }

    let valid: Vec<HomeCenter> = home
        .centers
        .iter()
        .filter(|c| c.is_valid_at(at))
        .cloned()
        .collect();

    if valid.is_empty() {
        home.centers.clone()
    } else {
        valid
    }
}

/// Closest center valid at `at` (nearest overall when none is valid) and
/// its distance in kilometres.
pub fn nearest_center(home: &Home, lat: f64, lon: f64, at: DateTime<Utc>) -> (HomeCenter, f64) {
    centers(home, at)
        .into_iter()
        .map(|c| {
            let d = haversine_km(lat, lon, c.latitude, c.longitude);
            (c, d)
        })
        .fold(None, |best: Option<(HomeCenter, f64)>, (c, d)| match best {
            Some((_, best_d)) if best_d <= d => best,
            _ => Some((c, d)),
        })
        .unwrap_or_else(|| {
            let d = haversine_km(lat, lon, home.latitude, home.longitude);
            (HomeCenter::new(home.latitude, home.longitude), d)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn two_center_home() -> Home {
        let moved = Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap();
        let mut home = Home::new(52.52, 13.405, 10.0);
        home.centers = vec![
            HomeCenter {
                latitude: 52.52,
                longitude: 13.405,
                radius_km: None,
                valid_from: None,
                valid_until: Some(moved),
            },
            HomeCenter {
                latitude: 48.137,
                longitude: 11.575,
                radius_km: Some(20.0),
                valid_from: Some(moved),
                valid_until: None,
            },
        ];
        home
    }

    #[test]
    fn test_centers_without_declared_centers() {
        let home = Home::new(52.52, 13.405, 10.0);
        let at = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let list = centers(&home, at);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].latitude, 52.52);
    }

    #[test]
    fn test_centers_filtered_by_time() {
        let home = two_center_home();
        let before = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(centers(&home, before)[0].latitude, 52.52);
        assert_eq!(centers(&home, after)[0].latitude, 48.137);
    }

    #[test]
    fn test_nearest_center_uses_valid_center() {
        let home = two_center_home();
        let after = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        // A point in Berlin after the move is far from the valid (Munich) center
        let (center, distance) = nearest_center(&home, 52.52, 13.405, after);
        assert_eq!(center.latitude, 48.137);
        assert!(distance > 400.0);
        assert!(home.is_away(52.52, 13.405, after));
    }

    #[test]
    fn test_nearest_center_falls_back_to_all() {
        let mut home = two_center_home();
        let start = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        for center in &mut home.centers {
            center.valid_from = Some(start);
            center.valid_until = Some(start);
        }
        let at = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let (center, distance) = nearest_center(&home, 52.5, 13.4, at);
        assert_eq!(center.latitude, 52.52);
        assert!(distance < 5.0);
    }
}
