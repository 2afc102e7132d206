//! Vacation runs and their scored cluster drafts.

pub mod context;
pub mod runs;
pub mod score;
pub mod transport;

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::VacationConfig;
use crate::days::DaySummary;
use crate::media::{Media, MediaId, PersonId};
use crate::selection::{PolicyValues, SelectionTelemetry};

pub use context::{DayContext, DayContextEntry, DayRole};
pub use runs::VacationRunDetector;
pub use score::VacationScoreCalculator;
pub use transport::TransportDayExtender;

/// Day keys of every vacation run, chronological. Home is already folded
/// into each summary's away flag.
pub fn detect_vacation_runs(
    days: &BTreeMap<NaiveDate, DaySummary>,
    config: &VacationConfig,
) -> Vec<Vec<NaiveDate>> {
    VacationRunDetector::new(config).detect(days)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Centroid {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waypoint {
    pub date: NaiveDate,
    pub latitude: f64,
    pub longitude: f64,
    /// `base_location`, `staypoint` or `centroid`.
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunMetrics {
    pub away_days: usize,
    pub nights: usize,
    /// Days with a resolved base location.
    pub based_nights: usize,
    pub countries: BTreeSet<String>,
    pub foreign: bool,
    pub timezones: BTreeSet<String>,
    pub travel_km: f64,
    pub max_distance_km: f64,
    pub tourism_ratio: f64,
    pub avg_quality: f64,
    pub photo_count: usize,
    pub video_count: usize,
    pub people: BTreeMap<PersonId, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SelectionRunMetrics {
    pub dedupe_rate: f64,
    pub average_spacing_seconds: f64,
    pub relaxations_applied: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberSelection {
    pub profile: String,
    pub selected: Vec<MediaId>,
    pub policy: PolicyValues,
    pub telemetry: SelectionTelemetry,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftMeta {
    pub classification: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub dates: Vec<NaiveDate>,
    pub route: Vec<Waypoint>,
    pub day_context: DayContext,
    pub metrics: RunMetrics,
    pub run_metrics: SelectionRunMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftParams {
    pub score: f64,
    /// Classification group: `vacation`, `short_trip` or `weekend_getaway`.
    pub group: String,
    pub member_selection: MemberSelection,
    pub meta: DraftMeta,
}

/// A scored vacation, ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterDraft {
    pub algorithm: String,
    pub params: DraftParams,
    pub centroid: Option<Centroid>,
    /// Every non-synthetic member of the run, chronological.
    pub members: Vec<Media>,
}

impl ClusterDraft {
    pub fn selected_ids(&self) -> &[MediaId] {
        &self.params.member_selection.selected
    }
}
