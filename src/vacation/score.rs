//! Scores a run into a [`ClusterDraft`] and curates its members.

use chrono::{Datelike, NaiveDate, Weekday};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use super::{
    Centroid, ClusterDraft, DayContext, DraftMeta, DraftParams, MemberSelection, RunMetrics,
    SelectionRunMetrics, Waypoint,
};
use crate::config::VacationConfig;
use crate::days::DaySummary;
use crate::geo::{self, haversine_km};
use crate::home::Home;
use crate::media::{Media, MediaId};
use crate::monitor::MonitoringSink;
use crate::selection::{FeatureAvailability, SelectionEngine, SelectionPolicyProvider, SelectionResult};

pub const MONITOR_JOB: &str = "vacation_curation";

pub struct VacationScoreCalculator<'a> {
    config: &'a VacationConfig,
    policies: &'a SelectionPolicyProvider,
    features: FeatureAvailability,
    monitor: &'a dyn MonitoringSink,
}

impl<'a> VacationScoreCalculator<'a> {
    pub fn new(
        config: &'a VacationConfig,
        policies: &'a SelectionPolicyProvider,
        features: FeatureAvailability,
        monitor: &'a dyn MonitoringSink,
    ) -> Self {
        Self {
            config,
            policies,
            features,
            monitor,
        }
    }

    /// Score the run and select its members. `None` when the run is not a
    /// vacation; the reason goes to the monitor.
    pub fn build_draft(
        &self,
        day_keys: &[NaiveDate],
        days: &BTreeMap<NaiveDate, DaySummary>,
        home: &Home,
        day_context: &DayContext,
    ) -> Option<ClusterDraft> {
        let run_days: Vec<&DaySummary> = day_keys.iter().filter_map(|d| days.get(d)).collect();
        let (start, end) = match (day_keys.first(), day_keys.last()) {
            (Some(start), Some(end)) => (*start, *end),
            _ => return self.reject("no_core_day", json!({})),
        };
        let span = json!({ "start": start, "end": end });

        if !run_days.iter().any(|d| d.is_core) {
            return self.reject("no_core_day", span);
        }

        let away_days = run_days.iter().filter(|d| d.is_away).count();
        if away_days < self.config.min_away_days {
            return self.reject(
                "too_few_away_days",
                json!({ "start": start, "end": end, "away_days": away_days }),
            );
        }

        let mut members: Vec<Media> = run_days
            .iter()
            .filter(|d| !d.is_synthetic)
            .flat_map(|d| d.members.iter().cloned())
            .collect();
        members.sort_by_key(|m| (m.taken_at, m.id));
        if members.len() < self.config.min_members {
            return self.reject(
                "too_few_members",
                json!({ "start": start, "end": end, "members": members.len() }),
            );
        }

        let metrics = run_metrics(&run_days, &members, home, day_keys.len());
        let classification = self.classify(away_days, day_keys);
        let score = score(&metrics);

        let profile = if self.policies.profile(classification).is_some() {
            classification
        } else {
            self.config.profile.as_str()
        };
        let policy = match self.policies.for_run(profile, day_context, self.features) {
            Ok(policy) => policy,
            Err(e) => {
                warn!(profile, error = %e, "Invalid selection policy");
                return self.reject(
                    "invalid_policy",
                    json!({ "start": start, "end": end, "error": e.to_string() }),
                );
            }
        };
        let policy_values = policy.values().clone();

        let selection = SelectionEngine::new(policy).select(&run_days, home);
        let run_selection = selection_metrics(&selection, &run_days);

        let centroid = geo::centroid(
            run_days
                .iter()
                .flat_map(|d| d.gps_members.iter())
                .filter_map(Media::coordinates),
        )
        .map(|(latitude, longitude)| Centroid {
            latitude,
            longitude,
        });

        self.monitor.emit(
            MONITOR_JOB,
            "selected",
            &json!({
                "start": start,
                "end": end,
                "classification": classification,
                "score": score,
                "members": members.len(),
                "selected": selection.members.len(),
                "relaxations": selection.telemetry.relaxations.len(),
            }),
        );
        info!(
            %start,
            %end,
            classification,
            score,
            selected = selection.members.len(),
            "Vacation draft built"
        );

        Some(ClusterDraft {
            algorithm: self.config.algorithm.clone(),
            params: DraftParams {
                score,
                group: classification.to_string(),
                member_selection: MemberSelection {
                    profile: profile.to_string(),
                    selected: selection.member_ids(),
                    policy: policy_values,
                    telemetry: selection.telemetry,
                },
                meta: DraftMeta {
                    classification: classification.to_string(),
                    start_date: start,
                    end_date: end,
                    dates: day_keys.to_vec(),
                    route: self.route(&run_days),
                    day_context: day_context.clone(),
                    metrics,
                    run_metrics: run_selection,
                },
            },
            centroid,
            members,
        })
    }

    fn reject(&self, reason: &str, mut context: Value) -> Option<ClusterDraft> {
        if let Value::Object(map) = &mut context {
            map.insert("reason".to_string(), Value::from(reason));
        }
        debug!(reason, "Run rejected");
        self.monitor.emit(MONITOR_JOB, "rejected", &context);
        None
    }

    pub fn classify(&self, away_days: usize, day_keys: &[NaiveDate]) -> &'static str {
        if away_days >= self.config.vacation_min_days {
            return "vacation";
        }

        let weekend_span = day_keys.iter().all(|d| {
            matches!(
                d.weekday(),
                Weekday::Fri | Weekday::Sat | Weekday::Sun | Weekday::Mon
            )
        });
        let has_weekend = day_keys
            .iter()
            .any(|d| matches!(d.weekday(), Weekday::Sat | Weekday::Sun));
        if !day_keys.is_empty() && day_keys.len() <= 3 && weekend_span && has_weekend {
            "weekend_getaway"
        } else {
            "short_trip"
        }
    }

    /// One waypoint per day with a known position, merging consecutive
    /// waypoints closer than `waypoint_merge_km`.
    fn route(&self, run_days: &[&DaySummary]) -> Vec<Waypoint> {
        let mut route: Vec<Waypoint> = Vec::new();
        for day in run_days.iter().filter(|d| !d.is_synthetic) {
            let Some(waypoint) = waypoint(day) else {
                continue;
            };
            let duplicate = route.last().is_some_and(|prev| {
                haversine_km(prev.latitude, prev.longitude, waypoint.latitude, waypoint.longitude)
                    <= self.config.waypoint_merge_km
            });
            if !duplicate {
                route.push(waypoint);
            }
        }
        route
    }
}

fn waypoint(day: &DaySummary) -> Option<Waypoint> {
    let (latitude, longitude, source) = if let Some(base) = &day.base_location {
        (base.latitude, base.longitude, "base_location")
    } else if let Some(staypoint) = day.dominant_staypoints.first() {
        (staypoint.latitude, staypoint.longitude, "staypoint")
    } else {
        let (lat, lon) = day.gps_centroid()?;
        (lat, lon, "centroid")
    };
    Some(Waypoint {
        date: day.date,
        latitude,
        longitude,
        source: source.to_string(),
    })
}

fn run_metrics(run_days: &[&DaySummary], members: &[Media], home: &Home, span_days: usize) -> RunMetrics {
    let mut metrics = RunMetrics {
        away_days: run_days.iter().filter(|d| d.is_away).count(),
        nights: span_days.saturating_sub(1),
        based_nights: run_days.iter().filter(|d| d.base_location.is_some()).count(),
        ..Default::default()
    };

    let mut poi_samples = 0;
    let mut tourism_hits = 0;
    for day in run_days {
        metrics.countries.extend(day.country_codes.iter().cloned());
        if !day.is_synthetic {
            metrics.timezones.insert(day.timezone_identifier.clone());
        }
        metrics.travel_km += day.travel_km;
        let base_distance = day.base_location.map_or(0.0, |b| b.distance_km);
        metrics.max_distance_km = metrics
            .max_distance_km
            .max(day.max_distance_km)
            .max(base_distance);
        poi_samples += day.poi_samples;
        tourism_hits += day.tourism_hits;
    }

    metrics.foreign = match &home.country {
        Some(country) => metrics.countries.iter().any(|c| !c.eq_ignore_ascii_case(country)),
        None => false,
    };
    if poi_samples > 0 {
        metrics.tourism_ratio = tourism_hits as f64 / poi_samples as f64;
    }
    if !members.is_empty() {
        metrics.avg_quality = members.iter().map(Media::quality).sum::<f64>() / members.len() as f64;
    }
    metrics.video_count = members.iter().filter(|m| m.is_video).count();
    metrics.photo_count = members.len() - metrics.video_count;
    for person in members.iter().flat_map(|m| m.person_ids.iter()) {
        *metrics.people.entry(*person).or_default() += 1;
    }

    metrics
}

/// Weighted run score, rounded to three decimals.
pub fn score(metrics: &RunMetrics) -> f64 {
    let duration = (metrics.away_days as f64 / 7.0).min(1.0) * 3.0;
    let distance = (metrics.max_distance_km / 1000.0).min(1.0) * 2.0;
    let foreign = if metrics.foreign { 1.0 } else { 0.0 };
    let tourism = metrics.tourism_ratio * 1.5;
    let people = (metrics.people.len() as f64 / 5.0).min(1.0) * 0.5;

    let total = duration + distance + foreign + tourism + metrics.avg_quality + people;
    (total * 1000.0).round() / 1000.0
}

fn selection_metrics(selection: &SelectionResult, run_days: &[&DaySummary]) -> SelectionRunMetrics {
    let day_of: HashMap<MediaId, NaiveDate> = run_days
        .iter()
        .flat_map(|d| d.members.iter().map(move |m| (m.id, d.date)))
        .collect();

    let mut timed: Vec<(NaiveDate, i64)> = selection
        .members
        .iter()
        .filter_map(|m| Some((*day_of.get(&m.id)?, m.timestamp()?)))
        .collect();
    timed.sort_unstable();

    let gaps: Vec<i64> = timed
        .windows(2)
        .filter(|w| w[0].0 == w[1].0)
        .map(|w| w[1].1 - w[0].1)
        .collect();
    let average_spacing_seconds = if gaps.is_empty() {
        0.0
    } else {
        gaps.iter().sum::<i64>() as f64 / gaps.len() as f64
    };

    SelectionRunMetrics {
        dedupe_rate: selection.telemetry.dedupe_rate(),
        average_spacing_seconds,
        relaxations_applied: selection.telemetry.relaxations.len(),
    }
}
