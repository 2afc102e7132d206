//! Resolves the home reference, from configuration or from the library itself.

use chrono::{Duration, NaiveDate, Timelike};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use super::Home;
use crate::config::HomeConfig;
use crate::media::Media;

/// Grid resolution for home inference, cells of roughly 1 km.
const GRID_SCALE: f64 = 100.0;

#[derive(Debug, Default)]
struct Cell {
    days: BTreeSet<NaiveDate>,
    night_captures: usize,
    members: usize,
    lat_sum: f64,
    lon_sum: f64,
    countries: BTreeMap<String, usize>,
    offsets: BTreeMap<i32, usize>,
}

pub struct HomeLocator {
    config: HomeConfig,
}

impl HomeLocator {
    pub fn new(config: HomeConfig) -> Self {
        Self { config }
    }

    /// The home declared in configuration, if latitude and longitude are set.
    pub fn configured_home(&self) -> Option<Home> {
        let (latitude, longitude) = match (self.config.latitude, self.config.longitude) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => return None,
        };

        Some(Home {
            latitude,
            longitude,
            radius_km: self.config.radius_km,
            country: self.config.country.as_ref().map(|c| c.to_lowercase()),
            timezone_offset_minutes: self.config.timezone_offset_minutes,
            centers: self.config.centers.clone(),
        })
    }

    /// Configured home, or the location the library returns to on the most days.
    pub fn determine_home(&self, media: &[Media]) -> Option<Home> {
        if let Some(home) = self.configured_home() {
            return Some(home);
        }

        let mut cells: BTreeMap<(i64, i64), Cell> = BTreeMap::new();
        for item in media {
            let (Some((lat, lon)), Some(taken_at)) = (item.coordinates(), item.taken_at) else {
                continue;
            };

            let offset = item.tz_offset_minutes.unwrap_or(0);
            let local = taken_at.naive_utc() + Duration::minutes(offset as i64);
            let key = (
                (lat * GRID_SCALE).round() as i64,
                (lon * GRID_SCALE).round() as i64,
            );

            let cell = cells.entry(key).or_default();
            cell.days.insert(local.date());
            if self.is_night(local.hour()) {
                cell.night_captures += 1;
            }
            cell.members += 1;
            cell.lat_sum += lat;
            cell.lon_sum += lon;
            if let Some(country) = &item.country_code {
                *cell.countries.entry(country.to_lowercase()).or_default() += 1;
            }
            if let Some(offset) = item.tz_offset_minutes {
                *cell.offsets.entry(offset).or_default() += 1;
            }
        }

        // BTreeMap iteration is key-ascending, so max_by_key keeps the last
        // maximum; Reverse(key) makes the smallest key win ties.
        let (key, cell) = cells
            .iter()
            .max_by_key(|(key, cell)| {
                (cell.days.len(), cell.night_captures, cell.members, Reverse(**key))
            })?;

        if cell.days.len() < self.config.min_home_days {
            debug!(
                days = cell.days.len(),
                required = self.config.min_home_days,
                "No home candidate seen on enough days"
            );
            return None;
        }

        let count = cell.members as f64;
        let country = most_common(&cell.countries, |a, b| a.cmp(b));
        let offset = most_common(&cell.offsets, |a, b| {
            a.abs().cmp(&b.abs()).then(a.cmp(b))
        });

        info!(
            cell_lat = key.0,
            cell_lon = key.1,
            days = cell.days.len(),
            "Inferred home location"
        );

        Some(Home {
            latitude: cell.lat_sum / count,
            longitude: cell.lon_sum / count,
            radius_km: self.config.radius_km,
            country,
            timezone_offset_minutes: offset,
            centers: Vec::new(),
        })
    }

    fn is_night(&self, hour: u32) -> bool {
        hour >= self.config.night_start_hour || hour < self.config.night_end_hour
    }
}

/// Most frequent key; ties go to the key ordered first by `tie_break`.
fn most_common<K: Clone>(
    counts: &BTreeMap<K, usize>,
    tie_break: impl Fn(&K, &K) -> std::cmp::Ordering,
) -> Option<K> {
    counts
        .iter()
        .max_by(|(ka, ca), (kb, cb)| ca.cmp(cb).then_with(|| tie_break(*kb, *ka)))
        .map(|(k, _)| k.clone())
}
