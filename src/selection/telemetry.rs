//! Selection telemetry, serialized into the draft parameters.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use super::relaxation::RelaxationStep;
use crate::media::{MediaId, PersonId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    TimeSlotSpacing,
    DayQuota,
    PhashSimilarity,
    PeopleBalance,
    StaypointQuota,
    GreedySpacing,
    GreedyDayCap,
    GreedyStaypointCap,
}

/// One MMR pick inside a (day, slot) bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MmrTraceEntry {
    pub id: MediaId,
    pub day: NaiveDate,
    pub slot: u32,
    pub relevance: f64,
    pub redundancy: f64,
    pub mmr: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SelectionTelemetry {
    pub candidates: usize,
    pub eligible: usize,
    pub prefilter_quality_floor: usize,
    pub burst_collapsed: usize,
    pub rejections: BTreeMap<RejectionReason, usize>,
    pub replacements: usize,
    pub near_duplicate_blocked: usize,
    /// Members added after the cascade to reach the minimum.
    pub backfilled: usize,
    pub relaxations: Vec<RelaxationStep>,
    pub passes: usize,
    /// Largest spacing enforced by the time-slot stage in the last pass.
    pub max_spacing_seconds: i64,
    /// Largest phash threshold used by the diversity stage in the last pass.
    pub max_phash_threshold: u32,
    pub mmr_trace: Vec<MmrTraceEntry>,
    pub people_balance: BTreeMap<PersonId, usize>,
    pub per_day: BTreeMap<NaiveDate, usize>,
    pub selected: usize,
}

impl SelectionTelemetry {
    pub fn reject(&mut self, reason: RejectionReason) {
        *self.rejections.entry(reason).or_default() += 1;
    }

    pub fn rejections_for(&self, reason: RejectionReason) -> usize {
        self.rejections.get(&reason).copied().unwrap_or(0)
    }

    /// Stage and greedy staypoint rejections combined.
    pub fn staypoint_rejections(&self) -> usize {
        self.rejections_for(RejectionReason::StaypointQuota)
            + self.rejections_for(RejectionReason::GreedyStaypointCap)
    }

    pub fn relaxed(&self) -> bool {
        !self.relaxations.is_empty()
    }

    /// Share of eligible candidates dropped as bursts or near duplicates.
    pub fn dedupe_rate(&self) -> f64 {
        if self.eligible == 0 {
            return 0.0;
        }
        let removed = self.burst_collapsed
            + self.rejections_for(RejectionReason::PhashSimilarity)
            + self.near_duplicate_blocked;
        (removed as f64 / self.eligible as f64).min(1.0)
    }
}
