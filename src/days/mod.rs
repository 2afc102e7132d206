//! Per-day geotemporal summaries.
//!
//! A [`DaySummary`] aggregates everything the run detection and selection
//! stages need to know about one local calendar day: where the camera was,
//! how far from home, how fast it moved, where it dwelled and where it
//! probably slept.

pub mod base_location;
pub mod builder;
pub mod poi;
pub mod staypoint;
pub mod timezone;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::geo;
use crate::media::{Media, MediaId};

pub use base_location::{BaseLocation, BaseLocationResolver, BaseLocationSource};
pub use builder::{build_day_summaries, DaySummaryBuilder};
pub use poi::PoiClassifier;
pub use staypoint::{Staypoint, StaypointDetector, StaypointIndex};
pub use timezone::{LocalZone, TimezoneResolver, TimezoneVotes};

/// A GPS fix with both its instant and its local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub id: MediaId,
    pub latitude: f64,
    pub longitude: f64,
    pub at: DateTime<Utc>,
    pub local: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub members: Vec<Media>,
    pub gps_members: Vec<Media>,

    pub max_distance_km: f64,
    pub avg_distance_km: f64,
    pub travel_km: f64,
    pub max_speed_kmh: f64,
    pub avg_speed_kmh: f64,
    /// Share of GPS segments at transit speed.
    pub transit_ratio: f64,
    pub high_speed_transit: bool,
    /// High-speed movement, or a transit share at or above the configured ratio.
    pub in_transit: bool,

    pub country_codes: BTreeSet<String>,
    pub timezone_votes: TimezoneVotes,
    pub timezone_identifier: String,

    pub poi_samples: usize,
    pub tourism_hits: usize,
    pub transport_hits: usize,
    pub tourism_ratio: f64,
    pub transport_ratio: f64,

    pub staypoints: Vec<Staypoint>,
    pub staypoint_index: StaypointIndex,
    pub dominant_staypoints: Vec<Staypoint>,

    pub first_gps_fix: Option<GpsFix>,
    pub last_gps_fix: Option<GpsFix>,
    pub base_location: Option<BaseLocation>,

    pub is_away: bool,
    pub is_core: bool,
    /// Placeholder bridging a photo-free gap inside a trip.
    pub is_synthetic: bool,
}

impl DaySummary {
    /// A day without any members.
    pub fn empty(date: NaiveDate, timezone_identifier: impl Into<String>) -> Self {
        Self {
            date,
            members: Vec::new(),
            gps_members: Vec::new(),
            max_distance_km: 0.0,
            avg_distance_km: 0.0,
            travel_km: 0.0,
            max_speed_kmh: 0.0,
            avg_speed_kmh: 0.0,
            transit_ratio: 0.0,
            high_speed_transit: false,
            in_transit: false,
            country_codes: BTreeSet::new(),
            timezone_votes: TimezoneVotes::default(),
            timezone_identifier: timezone_identifier.into(),
            poi_samples: 0,
            tourism_hits: 0,
            transport_hits: 0,
            tourism_ratio: 0.0,
            transport_ratio: 0.0,
            staypoints: Vec::new(),
            staypoint_index: StaypointIndex::default(),
            dominant_staypoints: Vec::new(),
            first_gps_fix: None,
            last_gps_fix: None,
            base_location: None,
            is_away: false,
            is_core: false,
            is_synthetic: false,
        }
    }

    pub fn synthetic(date: NaiveDate, timezone_identifier: impl Into<String>) -> Self {
        Self {
            is_away: true,
            is_synthetic: true,
            ..Self::empty(date, timezone_identifier)
        }
    }

    pub fn photo_count(&self) -> usize {
        self.members.iter().filter(|m| !m.is_video).count()
    }

    pub fn video_count(&self) -> usize {
        self.members.iter().filter(|m| m.is_video).count()
    }

    pub fn gps_centroid(&self) -> Option<(f64, f64)> {
        geo::centroid(self.gps_members.iter().filter_map(Media::coordinates))
    }

    /// Best known position: base location, main staypoint, GPS centroid.
    pub fn location(&self) -> Option<(f64, f64)> {
        if let Some(base) = &self.base_location {
            return Some((base.latitude, base.longitude));
        }
        if let Some(staypoint) = self.dominant_staypoints.first() {
            return Some((staypoint.latitude, staypoint.longitude));
        }
        self.gps_centroid()
    }

    /// Seconds between the first and last capture of the day.
    pub fn time_span_seconds(&self) -> i64 {
        let mut times = self.members.iter().filter_map(|m| m.taken_at);
        let Some(first) = times.next() else {
            return 0;
        };
        let (min, max) = times.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t)));
        (max - min).num_seconds()
    }
}
