//! Staypoint detection: places where the camera dwelled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::StaypointConfig;
use crate::geo::{self, haversine_km};
use crate::media::{Media, MediaId};

/// An inferred dwell location within one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Staypoint {
    pub key: String,
    pub latitude: f64,
    pub longitude: f64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub dwell_seconds: i64,
    pub member_ids: Vec<MediaId>,
}

impl Staypoint {
    /// Build from time-ordered fixes. `None` when no fix has a coordinate and time.
    fn from_fixes(fixes: &[&Fix]) -> Option<Self> {
        let first = fixes.first()?;
        let last = fixes.last()?;
        let (latitude, longitude) = geo::centroid(fixes.iter().map(|f| (f.lat, f.lon)))?;

        Some(Self {
            key: format!("{:.5},{:.5}@{}", latitude, longitude, first.at.timestamp()),
            latitude,
            longitude,
            start: first.at,
            end: last.at,
            dwell_seconds: (last.at - first.at).num_seconds(),
            member_ids: fixes.iter().map(|f| f.id).collect(),
        })
    }

    pub fn overlaps(&self, other: &Staypoint) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

#[derive(Debug, Clone, Copy)]
struct Fix {
    id: MediaId,
    lat: f64,
    lon: f64,
    at: DateTime<Utc>,
}

impl geo::Located for Fix {
    fn location(&self) -> Option<(f64, f64)> {
        Some((self.lat, self.lon))
    }
}

pub struct StaypointDetector {
    config: StaypointConfig,
}

impl StaypointDetector {
    pub fn new(config: StaypointConfig) -> Self {
        Self { config }
    }

    /// Detect staypoints in a day's GPS members. Members lacking a
    /// coordinate or timestamp are ignored.
    pub fn detect(&self, gps_members: &[Media]) -> Vec<Staypoint> {
        let mut fixes: Vec<Fix> = gps_members
            .iter()
            .filter_map(|m| {
                let (lat, lon) = m.coordinates()?;
                Some(Fix {
                    id: m.id,
                    lat,
                    lon,
                    at: m.taken_at?,
                })
            })
            .collect();
        fixes.sort_by_key(|f| (f.at, f.id));

        let staypoints = self.detect_sequential(&fixes);
        if !staypoints.is_empty() {
            return staypoints;
        }

        self.detect_clustered(&fixes)
    }

    fn detect_sequential(&self, fixes: &[Fix]) -> Vec<Staypoint> {
        let min_dwell = self.config.min_dwell_minutes * 60;
        let mut staypoints = Vec::new();
        let mut i = 0;

        while i < fixes.len() {
            let mut j = i + 1;
            while j < fixes.len()
                && haversine_km(fixes[j - 1].lat, fixes[j - 1].lon, fixes[j].lat, fixes[j].lon)
                    <= self.config.radius_km
            {
                j += 1;
            }

            let dwell = (fixes[j - 1].at - fixes[i].at).num_seconds();
            if dwell >= min_dwell {
                let window: Vec<&Fix> = fixes[i..j].iter().collect();
                if let Some(staypoint) = Staypoint::from_fixes(&window) {
                    staypoints.push(staypoint);
                }
                i = j;
            } else {
                i += 1;
            }
        }

        staypoints
    }

    fn detect_clustered(&self, fixes: &[Fix]) -> Vec<Staypoint> {
        let min_dwell = self
            .config
            .fallback_min_dwell_minutes
            .max(self.config.min_dwell_minutes)
            * 60;

        let result = geo::cluster(
            fixes,
            self.config.fallback_radius_km,
            self.config.fallback_min_samples,
        );

        let mut candidates: Vec<Staypoint> = result
            .clusters
            .iter()
            .filter_map(|indices| {
                let members: Vec<&Fix> = indices.iter().map(|&i| &fixes[i]).collect();
                Staypoint::from_fixes(&members)
            })
            .filter(|s| s.dwell_seconds >= min_dwell)
            .collect();

        // Longest dwell first; drop clusters interleaved in time with a kept one.
        candidates.sort_by(|a, b| b.dwell_seconds.cmp(&a.dwell_seconds).then(a.start.cmp(&b.start)));
        let mut kept: Vec<Staypoint> = Vec::new();
        for candidate in candidates {
            if kept.iter().all(|k| !k.overlaps(&candidate)) {
                kept.push(candidate);
            }
        }
        kept.sort_by_key(|s| s.start);

        if !kept.is_empty() {
            debug!(count = kept.len(), "Staypoints recovered by clustering fallback");
        }
        kept
    }
}

/// Member → staypoint key lookup for one day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaypointIndex {
    keys: BTreeMap<MediaId, String>,
    counts: BTreeMap<String, usize>,
}

impl StaypointIndex {
    pub fn build(staypoints: &[Staypoint]) -> Self {
        let mut index = Self::default();
        for staypoint in staypoints {
            for id in &staypoint.member_ids {
                if index.keys.contains_key(id) {
                    continue;
                }
                index.keys.insert(*id, staypoint.key.clone());
                *index.counts.entry(staypoint.key.clone()).or_default() += 1;
            }
        }
        index
    }

    pub fn key_for(&self, id: MediaId) -> Option<&str> {
        self.keys.get(&id).map(String::as_str)
    }

    pub fn count(&self, key: &str) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &BTreeMap<String, usize> {
        &self.counts
    }

    pub fn mapped_members(&self) -> usize {
        self.keys.len()
    }
}
