//! Curated member selection for a vacation run.
//!
//! Candidates pass through pre-filters, a fixed stage pipeline and a greedy
//! MMR core. When the result falls short of the policy minimum the
//! thresholds are relaxed step by step and the pass is rerun.

pub mod candidate;
pub mod greedy;
pub mod policy;
pub mod relaxation;
pub mod stages;
pub mod telemetry;

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, info};

use crate::days::{DaySummary, TimezoneResolver};
use crate::home::Home;
use crate::media::{Media, MediaId};

pub use candidate::Candidate;
pub use policy::{
    FeatureAvailability, PeopleBalance, PolicyValues, SelectionPolicy, SelectionPolicyProvider,
    SelectionProfile,
};
pub use relaxation::{RelaxationRule, RelaxationStep, Thresholds};
pub use stages::{SelectionStage, StageContext};
pub use telemetry::{MmrTraceEntry, RejectionReason, SelectionTelemetry};

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionResult {
    pub members: Vec<Media>,
    pub telemetry: SelectionTelemetry,
}

impl SelectionResult {
    pub fn member_ids(&self) -> Vec<MediaId> {
        self.members.iter().map(|m| m.id).collect()
    }
}

pub struct SelectionEngine {
    policy: SelectionPolicy,
    stages: Vec<Box<dyn SelectionStage + Send + Sync>>,
}

impl SelectionEngine {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self {
            policy,
            stages: stages::default_stages(),
        }
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    pub fn select(&self, days: &[&DaySummary], home: &Home) -> SelectionResult {
        let resolver = TimezoneResolver::new(home);
        let mut prefilter = SelectionTelemetry::default();

        let candidates = candidate::build_candidates(days, &self.policy, &resolver);
        prefilter.candidates = candidates.len();
        let eligible = candidate::apply_quality_floor(candidates, &self.policy, &mut prefilter);
        prefilter.eligible = eligible.len();

        if eligible.is_empty() {
            debug!(
                profile = self.policy.profile(),
                "No eligible candidates after quality floor"
            );
            return SelectionResult {
                members: Vec::new(),
                telemetry: prefilter,
            };
        }

        let pool = candidate::collapse_bursts(eligible, &self.policy, &mut prefilter);

        let mut thresholds = Thresholds::strict(&self.policy);
        let (mut accepted, mut last) = self.run_pass(&pool, &thresholds);
        let mut relaxations = Vec::new();
        let mut passes = 1;

        for rule in RelaxationRule::CASCADE {
            if accepted.len() >= self.policy.minimum_total() {
                break;
            }
            let Some(step) = thresholds.relax(rule, &self.policy, &last) else {
                continue;
            };
            debug!(
                rule = ?step.rule,
                from = ?step.from,
                to = ?step.to,
                selected = accepted.len(),
                "Relaxing selection threshold"
            );
            relaxations.push(step);
            (accepted, last) = self.run_pass(&pool, &thresholds);
            passes += 1;
        }

        let backfilled = self.backfill(&mut accepted, &pool, prefilter.eligible, &thresholds);
        let ordered = round_robin(accepted);

        let mut telemetry = last;
        telemetry.candidates = prefilter.candidates;
        telemetry.eligible = prefilter.eligible;
        telemetry.prefilter_quality_floor = prefilter.prefilter_quality_floor;
        telemetry.burst_collapsed = prefilter.burst_collapsed;
        telemetry.relaxations = relaxations;
        telemetry.passes = passes;
        telemetry.backfilled = backfilled;
        telemetry.selected = ordered.len();
        for c in &ordered {
            *telemetry.per_day.entry(c.day).or_default() += 1;
            for person in &c.person_ids {
                *telemetry.people_balance.entry(*person).or_default() += 1;
            }
        }

        let by_id: HashMap<MediaId, &Media> = days
            .iter()
            .flat_map(|d| d.members.iter())
            .map(|m| (m.id, m))
            .collect();
        let members: Vec<Media> = ordered
            .iter()
            .filter_map(|c| by_id.get(&c.id).map(|m| (*m).clone()))
            .collect();

        info!(
            profile = self.policy.profile(),
            selected = members.len(),
            eligible = telemetry.eligible,
            relaxations = telemetry.relaxations.len(),
            "Selection finished"
        );

        SelectionResult { members, telemetry }
    }

    fn run_pass(
        &self,
        pool: &[Candidate],
        thresholds: &Thresholds,
    ) -> (Vec<Candidate>, SelectionTelemetry) {
        let ctx = StageContext {
            policy: &self.policy,
            thresholds,
            expected_total: self.policy.target_total().min(pool.len()),
        };
        let mut telemetry = SelectionTelemetry::default();

        let mut survivors = pool.to_vec();
        survivors.sort_by(candidate::priority_order);
        for stage in &self.stages {
            let before = survivors.len();
            survivors = stage.apply(survivors, &ctx, &mut telemetry);
            debug!(stage = stage.name(), before, after = survivors.len(), "Stage applied");
        }

        let accepted = greedy::greedy_select(survivors, &ctx, &mut telemetry);
        (accepted, telemetry)
    }

    /// Top up to the minimum once every relaxation is spent. Only burst
    /// representatives are used, and each one must clear the hard caps and
    /// the pHash floor under the final thresholds. Skipped when fewer than
    /// `minimum_total` frames cleared the quality floor.
    fn backfill(
        &self,
        accepted: &mut Vec<Candidate>,
        pool: &[Candidate],
        eligible: usize,
        thresholds: &Thresholds,
    ) -> usize {
        let minimum = self.policy.minimum_total();
        if accepted.len() >= minimum || eligible < minimum {
            return 0;
        }

        let ctx = StageContext {
            policy: &self.policy,
            thresholds,
            expected_total: self.policy.target_total().min(pool.len()),
        };
        let mut taken: HashSet<MediaId> = accepted.iter().map(|c| c.id).collect();
        let mut representatives = pool.to_vec();
        representatives.sort_by(candidate::priority_order);

        let mut added = 0;
        for c in representatives {
            if accepted.len() >= minimum {
                break;
            }
            if taken.contains(&c.id)
                || !greedy::near_duplicates_of(&c, accepted, &ctx).is_empty()
                || greedy::check_caps(&c, accepted, None, &ctx).is_err()
            {
                continue;
            }
            taken.insert(c.id);
            accepted.push(c);
            added += 1;
        }
        added
    }
}

/// Interleave days, chronological within each day.
fn round_robin(accepted: Vec<Candidate>) -> Vec<Candidate> {
    let mut by_day: BTreeMap<NaiveDate, Vec<Candidate>> = BTreeMap::new();
    for c in accepted {
        by_day.entry(c.day).or_default().push(c);
    }

    let mut queues: Vec<VecDeque<Candidate>> = by_day
        .into_values()
        .map(|mut members| {
            members.sort_by_key(|c| (c.timestamp, c.id));
            members.into()
        })
        .collect();

    let mut ordered = Vec::new();
    loop {
        let before = ordered.len();
        for queue in &mut queues {
            if let Some(c) = queue.pop_front() {
                ordered.push(c);
            }
        }
        if ordered.len() == before {
            break;
        }
    }
    ordered
}
