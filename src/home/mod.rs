//! The user's home reference: one location, or several time-bounded centers.

pub mod boundary;
pub mod locator;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

pub use boundary::{centers, nearest_center};
pub use locator::HomeLocator;

/// A home center, optionally valid only within a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeCenter {
    pub latitude: f64,
    pub longitude: f64,

    /// Overrides the home radius for this center.
    #[serde(default)]
    pub radius_km: Option<f64>,

    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,

    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

impl HomeCenter {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            radius_km: None,
            valid_from: None,
            valid_until: None,
        }
    }

    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.valid_from.map_or(true, |from| at >= from)
            && self.valid_until.map_or(true, |until| at <= until)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Home {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: f64,

    #[serde(default)]
    pub country: Option<String>,

    #[serde(default)]
    pub timezone_offset_minutes: Option<i32>,

    #[serde(default)]
    pub centers: Vec<HomeCenter>,
}

impl Home {
    pub fn new(latitude: f64, longitude: f64, radius_km: f64) -> Self {
        Self {
            latitude,
            longitude,
            radius_km,
            country: None,
            timezone_offset_minutes: None,
            centers: Vec::new(),
        }
    }

    /// Radius that applies to a given center.
    pub fn radius_for(&self, center: &HomeCenter) -> f64 {
        center.radius_km.unwrap_or(self.radius_km)
    }

    pub fn fixed_offset(&self) -> Option<FixedOffset> {
        self.timezone_offset_minutes
            .and_then(|minutes| FixedOffset::east_opt(minutes * 60))
    }

    /// Whether a coordinate lies beyond the radius of the nearest center at `at`.
    pub fn is_away(&self, lat: f64, lon: f64, at: DateTime<Utc>) -> bool {
        let (center, distance) = nearest_center(self, lat, lon, at);
        distance > self.radius_for(&center)
    }

    pub fn distance_km(&self, lat: f64, lon: f64, at: DateTime<Utc>) -> f64 {
        nearest_center(self, lat, lon, at).1
    }
}
