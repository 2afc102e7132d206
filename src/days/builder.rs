//! Builds the day map in three passes:
//!
//! 1. summarize each local calendar day on its own;
//! 2. resolve base locations (needs the following day's first fix) and
//!    classify away/core days;
//! 3. inject synthetic days across short photo-free gaps inside trips.

use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::{
    BaseLocation, BaseLocationResolver, DaySummary, GpsFix, PoiClassifier, StaypointDetector,
    StaypointIndex, TimezoneResolver, TimezoneVotes,
};
use crate::config::DayConfig;
use crate::geo::haversine_km;
use crate::home::{nearest_center, Home};
use crate::media::Media;

/// Convenience entry point: build all day summaries for a media batch.
pub fn build_day_summaries(
    media: &[Media],
    home: &Home,
    config: &DayConfig,
) -> BTreeMap<NaiveDate, DaySummary> {
    DaySummaryBuilder::new(config, home).build(media)
}

pub struct DaySummaryBuilder<'a> {
    config: &'a DayConfig,
    home: &'a Home,
    timezone: TimezoneResolver,
    staypoints: StaypointDetector,
    poi: PoiClassifier,
    base_location: BaseLocationResolver,
}

impl<'a> DaySummaryBuilder<'a> {
    pub fn new(config: &'a DayConfig, home: &'a Home) -> Self {
        Self {
            config,
            home,
            timezone: TimezoneResolver::new(home),
            staypoints: StaypointDetector::new(config.staypoint.clone()),
            poi: PoiClassifier,
            base_location: BaseLocationResolver::new(config.base_location.clone()),
        }
    }

    pub fn build(&self, media: &[Media]) -> BTreeMap<NaiveDate, DaySummary> {
        let mut groups: BTreeMap<NaiveDate, Vec<Media>> = BTreeMap::new();
        let mut undated = 0usize;
        for item in media {
            match self.timezone.local_date(item) {
                Some(date) => groups.entry(date).or_default().push(item.clone()),
                None => undated += 1,
            }
        }
        if undated > 0 {
            debug!(undated, "Skipped media without capture time");
        }

        let mut days: BTreeMap<NaiveDate, DaySummary> = groups
            .into_iter()
            .map(|(date, mut members)| {
                members.sort_by_key(|m| (m.taken_at, m.id));
                (date, self.summarize(date, members))
            })
            .collect();

        self.resolve_base_locations(&mut days);
        let synthetic = self.fill_gaps(&mut days);

        debug!(days = days.len(), synthetic, "Built day summaries");
        days
    }

    fn summarize(&self, date: NaiveDate, members: Vec<Media>) -> DaySummary {
        let gps_members: Vec<Media> = members.iter().filter(|m| m.has_gps()).cloned().collect();

        let mut day = DaySummary::empty(date, String::new());

        // Distance from home
        let mut distance_sum = 0.0;
        let mut any_away = false;
        let mut fixes: Vec<GpsFix> = Vec::with_capacity(gps_members.len());
        for m in &gps_members {
            let (Some((lat, lon)), Some(at), Some(local)) =
                (m.coordinates(), m.taken_at, self.timezone.local_datetime(m))
            else {
                continue;
            };

            let (center, distance) = nearest_center(self.home, lat, lon, at);
            distance_sum += distance;
            day.max_distance_km = day.max_distance_km.max(distance);
            any_away |= distance > self.home.radius_for(&center);

            fixes.push(GpsFix {
                id: m.id,
                latitude: lat,
                longitude: lon,
                at,
                local,
            });
        }
        if !fixes.is_empty() {
            day.avg_distance_km = distance_sum / fixes.len() as f64;
        }

        // Travel and speed
        let mut speeds = Vec::new();
        for pair in fixes.windows(2) {
            let segment_km = haversine_km(
                pair[0].latitude,
                pair[0].longitude,
                pair[1].latitude,
                pair[1].longitude,
            );
            day.travel_km += segment_km;

            let seconds = (pair[1].at - pair[0].at).num_seconds();
            if seconds >= self.config.min_segment_seconds && seconds > 0 {
                speeds.push(segment_km / (seconds as f64 / 3600.0));
            }
        }
        if !speeds.is_empty() {
            day.max_speed_kmh = speeds.iter().copied().fold(0.0, f64::max);
            day.avg_speed_kmh = speeds.iter().sum::<f64>() / speeds.len() as f64;
            let fast = speeds
                .iter()
                .filter(|&&s| s >= self.config.transit_speed_kmh)
                .count();
            day.transit_ratio = fast as f64 / speeds.len() as f64;
        }
        day.high_speed_transit = day.max_speed_kmh >= self.config.high_speed_kmh;
        day.in_transit =
            day.high_speed_transit || day.transit_ratio >= self.config.transit_ratio_threshold;

        // Countries and timezone votes
        let mut votes = TimezoneVotes::default();
        let mut countries = BTreeSet::new();
        for m in &members {
            self.timezone.vote(&mut votes, m);
            if let Some(country) = &m.country_code {
                countries.insert(country.to_lowercase());
            }
        }
        day.timezone_identifier = self.timezone.determine_local_timezone_identifier(&votes);
        day.timezone_votes = votes;
        day.country_codes = countries;

        // Points of interest
        for poi in members.iter().filter_map(|m| m.poi.as_ref()) {
            day.poi_samples += 1;
            if self.poi.is_tourism(poi) {
                day.tourism_hits += 1;
            }
            if self.poi.is_transport(poi) {
                day.transport_hits += 1;
            }
        }
        if day.poi_samples > 0 {
            day.tourism_ratio = day.tourism_hits as f64 / day.poi_samples as f64;
            day.transport_ratio = day.transport_hits as f64 / day.poi_samples as f64;
        }

        // Staypoints
        let staypoints = self.staypoints.detect(&gps_members);
        let mut dominant = staypoints.clone();
        dominant.sort_by(|a, b| b.dwell_seconds.cmp(&a.dwell_seconds).then(a.start.cmp(&b.start)));
        dominant.truncate(self.config.dominant_staypoints);
        day.staypoint_index = StaypointIndex::build(&staypoints);
        day.staypoints = staypoints;
        day.dominant_staypoints = dominant;

        day.first_gps_fix = fixes.first().copied();
        day.last_gps_fix = fixes.last().copied();
        day.is_away = any_away;
        day.members = members;
        day.gps_members = gps_members;
        day
    }

    fn resolve_base_locations(&self, days: &mut BTreeMap<NaiveDate, DaySummary>) {
        let resolved: Vec<(NaiveDate, Option<BaseLocation>)> = days
            .values()
            .map(|day| {
                let next = day.date.succ_opt().and_then(|d| days.get(&d));
                let zone = self.timezone.resolve_summary_timezone(day);
                (day.date, self.base_location.resolve(day, next, self.home, &zone))
            })
            .collect();

        for (date, base) in resolved {
            if let Some(day) = days.get_mut(&date) {
                day.base_location = base;
                self.classify(day);
            }
        }
    }

    fn classify(&self, day: &mut DaySummary) {
        day.is_away = day.is_away || day.base_location.is_some();
        day.is_core = day.is_away
            && !day.in_transit
            && (day.base_location.is_some()
                || day.tourism_ratio >= self.config.core_tourism_ratio
                || day.members.len() >= self.config.core_min_members);
    }

    fn fill_gaps(&self, days: &mut BTreeMap<NaiveDate, DaySummary>) -> usize {
        let mut inserts = Vec::new();
        let entries: Vec<&DaySummary> = days.values().collect();

        for pair in entries.windows(2) {
            let (before, after) = (pair[0], pair[1]);
            if !before.is_away || !after.is_away {
                continue;
            }
            let gap = (after.date - before.date).num_days() - 1;
            if gap < 1 || gap > self.config.max_synthetic_gap_days {
                continue;
            }
            for offset in 1..=gap {
                let date = before.date + Duration::days(offset);
                inserts.push(DaySummary::synthetic(date, before.timezone_identifier.clone()));
            }
        }

        let count = inserts.len();
        for day in inserts {
            days.insert(day.date, day);
        }
        count
    }
}
