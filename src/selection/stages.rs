//! Filtering stages run ahead of the greedy core.
//!
//! Every stage receives candidates in priority order and returns its
//! survivors in that same order, counting each rejection under its reason.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use super::candidate::Candidate;
use super::policy::SelectionPolicy;
use super::relaxation::Thresholds;
use super::telemetry::{RejectionReason, SelectionTelemetry};
use crate::media::{MediaId, PersonId};

pub struct StageContext<'a> {
    pub policy: &'a SelectionPolicy,
    pub thresholds: &'a Thresholds,
    /// Members the run is expected to end up with.
    pub expected_total: usize,
}

impl StageContext<'_> {
    pub fn day_cap(&self, day: NaiveDate) -> Option<usize> {
        if self.thresholds.day_caps {
            self.policy.day_cap(day)
        } else {
            None
        }
    }

    /// Minimum seconds between two members of one day.
    pub fn spacing_for(&self, day: NaiveDate, day_duration: i64) -> i64 {
        if !self.thresholds.spacing {
            return 0;
        }
        let quota = self
            .day_cap(day)
            .unwrap_or(self.policy.target_total())
            .max(1) as i64;
        (day_duration / quota).max(self.policy.spacing_floor_seconds())
    }

    pub fn staypoint_cap(&self) -> Option<usize> {
        self.thresholds.staypoint_cap
    }
}

pub trait SelectionStage {
    fn name(&self) -> &'static str;

    fn apply(
        &self,
        candidates: Vec<Candidate>,
        ctx: &StageContext<'_>,
        telemetry: &mut SelectionTelemetry,
    ) -> Vec<Candidate>;
}

/// Stages in the order they run.
pub fn default_stages() -> Vec<Box<dyn SelectionStage + Send + Sync>> {
    vec![
        Box::new(TimeSlotStage),
        Box::new(DayQuotaStage),
        Box::new(PhashDiversityStage),
        Box::new(PeopleBalanceStage),
        Box::new(StaypointQuotaStage),
    ]
}

/// Keeps members of one day apart in time.
pub struct TimeSlotStage;

impl SelectionStage for TimeSlotStage {
    fn name(&self) -> &'static str {
        "time_slot"
    }

    fn apply(
        &self,
        candidates: Vec<Candidate>,
        ctx: &StageContext<'_>,
        telemetry: &mut SelectionTelemetry,
    ) -> Vec<Candidate> {
        let mut accepted: HashMap<NaiveDate, Vec<i64>> = HashMap::new();
        let mut kept = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let spacing = ctx.spacing_for(candidate.day, candidate.day_duration);
            telemetry.max_spacing_seconds = telemetry.max_spacing_seconds.max(spacing);

            let times = accepted.entry(candidate.day).or_default();
            if times.iter().any(|t| (candidate.timestamp - t).abs() < spacing) {
                telemetry.reject(RejectionReason::TimeSlotSpacing);
                continue;
            }
            times.push(candidate.timestamp);
            kept.push(candidate);
        }
        kept
    }
}

/// Enforces per-day quotas, preferring people combinations not yet seen.
pub struct DayQuotaStage;

impl SelectionStage for DayQuotaStage {
    fn name(&self) -> &'static str {
        "day_quota"
    }

    fn apply(
        &self,
        candidates: Vec<Candidate>,
        ctx: &StageContext<'_>,
        telemetry: &mut SelectionTelemetry,
    ) -> Vec<Candidate> {
        let mut by_day: BTreeMap<NaiveDate, Vec<&Candidate>> = BTreeMap::new();
        for candidate in &candidates {
            by_day.entry(candidate.day).or_default().push(candidate);
        }

        let mut accepted: HashSet<MediaId> = HashSet::new();
        for (day, members) in &by_day {
            let Some(quota) = ctx.day_cap(*day) else {
                accepted.extend(members.iter().map(|c| c.id));
                continue;
            };

            let mut taken = 0;
            let mut seen: HashSet<String> = HashSet::new();
            for candidate in members {
                if taken < quota && seen.insert(candidate.person_signature()) {
                    accepted.insert(candidate.id);
                    taken += 1;
                }
            }
            for candidate in members {
                if taken >= quota {
                    break;
                }
                if accepted.insert(candidate.id) {
                    taken += 1;
                }
            }
        }

        let (kept, rejected): (Vec<Candidate>, Vec<Candidate>) = candidates
            .into_iter()
            .partition(|c| accepted.contains(&c.id));
        for _ in &rejected {
            telemetry.reject(RejectionReason::DayQuota);
        }
        kept
    }
}

/// Defers near-duplicate frames within a day.
pub struct PhashDiversityStage;

impl PhashDiversityStage {
    fn threshold(&self, members: &[&Candidate], ctx: &StageContext<'_>) -> u32 {
        let floor = ctx.policy.phash_min_hamming();
        if !ctx.thresholds.adaptive_phash {
            return floor;
        }

        let mut distances = Vec::new();
        for (i, a) in members.iter().enumerate() {
            for b in &members[i + 1..] {
                if let Some(d) = a.hash_distance(b) {
                    distances.push(d);
                }
            }
        }
        if distances.is_empty() {
            return floor;
        }
        distances.sort_unstable();
        let rank = (ctx.policy.phash_percentile() * (distances.len() - 1) as f64).floor() as usize;
        floor.max(distances[rank.min(distances.len() - 1)])
    }
}

impl SelectionStage for PhashDiversityStage {
    fn name(&self) -> &'static str {
        "phash_diversity"
    }

    fn apply(
        &self,
        candidates: Vec<Candidate>,
        ctx: &StageContext<'_>,
        telemetry: &mut SelectionTelemetry,
    ) -> Vec<Candidate> {
        let mut by_day: BTreeMap<NaiveDate, Vec<&Candidate>> = BTreeMap::new();
        for candidate in &candidates {
            by_day.entry(candidate.day).or_default().push(candidate);
        }

        let mut accepted: HashSet<MediaId> = HashSet::new();
        for (day, members) in &by_day {
            let threshold = self.threshold(members, ctx);
            telemetry.max_phash_threshold = telemetry.max_phash_threshold.max(threshold);

            let mut kept: Vec<&Candidate> = Vec::new();
            let mut deferred: Vec<&Candidate> = Vec::new();
            for candidate in members {
                let near_duplicate = kept
                    .iter()
                    .any(|k| k.hash_distance(candidate).is_some_and(|d| d < threshold));
                if near_duplicate {
                    deferred.push(candidate);
                } else {
                    kept.push(candidate);
                }
            }

            // Readmit duplicates only while the day would stay under capacity
            let capacity = ctx.day_cap(*day).unwrap_or(kept.len());
            let room = capacity.saturating_sub(kept.len());
            accepted.extend(kept.iter().map(|c| c.id));
            accepted.extend(deferred.iter().take(room).map(|c| c.id));
        }

        let (kept, rejected): (Vec<Candidate>, Vec<Candidate>) = candidates
            .into_iter()
            .partition(|c| accepted.contains(&c.id));
        for _ in &rejected {
            telemetry.reject(RejectionReason::PhashSimilarity);
        }
        kept
    }
}

/// Keeps any one person from dominating the run.
pub struct PeopleBalanceStage;

impl PeopleBalanceStage {
    fn caps(&self, candidates: &[Candidate], ctx: &StageContext<'_>) -> BTreeMap<PersonId, usize> {
        let people = ctx.policy.people();
        let persons: BTreeSet<PersonId> = candidates
            .iter()
            .flat_map(|c| c.person_ids.iter().copied())
            .collect();
        if persons.is_empty() {
            return BTreeMap::new();
        }

        let neutral = (1.0 / persons.len() as f64 + 0.15).clamp(0.25, 1.0);
        let expected = ctx.expected_total.max(1) as f64;
        persons
            .into_iter()
            .map(|person| {
                let share = if people.important_person_ids.contains(&person) {
                    neutral.max(0.5)
                } else {
                    neutral
                };
                (person, ((share * expected).ceil() as usize).max(1))
            })
            .collect()
    }
}

impl SelectionStage for PeopleBalanceStage {
    fn name(&self) -> &'static str {
        "people_balance"
    }

    fn apply(
        &self,
        candidates: Vec<Candidate>,
        ctx: &StageContext<'_>,
        telemetry: &mut SelectionTelemetry,
    ) -> Vec<Candidate> {
        let people = ctx.policy.people();
        if !people.enabled {
            return candidates;
        }
        let caps = self.caps(&candidates, ctx);
        if caps.is_empty() {
            return candidates;
        }

        let group_allowance =
            (people.group_shot_coverage * ctx.expected_total as f64).floor() as usize;
        let mut group_exempted = 0;
        let mut counts: BTreeMap<PersonId, usize> = BTreeMap::new();
        let mut kept = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let over_cap = candidate.person_ids.iter().any(|p| {
                counts.get(p).copied().unwrap_or(0) >= caps.get(p).copied().unwrap_or(usize::MAX)
            });
            if over_cap {
                let is_group = people.group_shot_min_faces > 0
                    && candidate.person_ids.len() >= people.group_shot_min_faces;
                if !is_group || group_exempted >= group_allowance {
                    telemetry.reject(RejectionReason::PeopleBalance);
                    continue;
                }
                group_exempted += 1;
            }
            for person in &candidate.person_ids {
                *counts.entry(*person).or_default() += 1;
            }
            kept.push(candidate);
        }
        kept
    }
}

/// Caps members per staypoint.
pub struct StaypointQuotaStage;

impl SelectionStage for StaypointQuotaStage {
    fn name(&self) -> &'static str {
        "staypoint_quota"
    }

    fn apply(
        &self,
        candidates: Vec<Candidate>,
        ctx: &StageContext<'_>,
        telemetry: &mut SelectionTelemetry,
    ) -> Vec<Candidate> {
        let Some(cap) = ctx.staypoint_cap() else {
            return candidates;
        };

        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut kept = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if let Some(key) = &candidate.staypoint {
                let count = counts.entry(key.clone()).or_default();
                if *count >= cap {
                    telemetry.reject(RejectionReason::StaypointQuota);
                    continue;
                }
                *count += 1;
            }
            kept.push(candidate);
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::PerceptualHash;
    use crate::selection::policy::PolicyValues;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
    }

    fn candidate(id: i64, score: f64, timestamp: i64) -> Candidate {
        Candidate {
            id,
            score,
            quality: score,
            day: day(1),
            timestamp,
            local_seconds: timestamp % 86_400,
            slot: 0,
            staypoint: None,
            hash: None,
            person_ids: Vec::new(),
            face_count: 0,
            is_video: false,
            day_duration: 0,
        }
    }

    fn run(
        stage: &dyn SelectionStage,
        values: PolicyValues,
        candidates: Vec<Candidate>,
    ) -> (Vec<MediaId>, SelectionTelemetry) {
        let policy = SelectionPolicy::new(values).unwrap();
        let thresholds = Thresholds::strict(&policy);
        let ctx = StageContext {
            policy: &policy,
            thresholds: &thresholds,
            expected_total: policy.target_total().min(candidates.len()),
        };
        let mut telemetry = SelectionTelemetry::default();
        let kept = stage.apply(candidates, &ctx, &mut telemetry);
        (kept.iter().map(|c| c.id).collect(), telemetry)
    }

    #[test]
    fn test_time_slot_spacing() {
        let values = PolicyValues {
            min_spacing_seconds: 600,
            ..PolicyValues::default()
        };
        let (ids, telemetry) = run(
            &TimeSlotStage,
            values,
            vec![
                candidate(1, 0.9, 1000),
                candidate(2, 0.8, 1300),
                candidate(3, 0.7, 1700),
            ],
        );
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(telemetry.rejections_for(RejectionReason::TimeSlotSpacing), 1);
        assert_eq!(telemetry.max_spacing_seconds, 600);
    }

    #[test]
    fn test_day_quota_prefers_new_people() {
        let values = PolicyValues {
            max_per_day: Some(2),
            ..PolicyValues::default()
        };
        let mut a = candidate(1, 0.9, 0);
        a.person_ids = vec![1];
        let mut b = candidate(2, 0.8, 100);
        b.person_ids = vec![1];
        let mut c = candidate(3, 0.7, 200);
        c.person_ids = vec![2];

        let (ids, telemetry) = run(&DayQuotaStage, values, vec![a, b, c]);
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(telemetry.rejections_for(RejectionReason::DayQuota), 1);
    }

    #[test]
    fn test_phash_defers_near_duplicates() {
        let values = PolicyValues {
            max_per_day: Some(2),
            ..PolicyValues::default()
        };
        let mut a = candidate(1, 0.9, 0);
        a.hash = PerceptualHash::parse("0000000000000000");
        let mut b = candidate(2, 0.8, 100);
        b.hash = PerceptualHash::parse("0000000000000001");
        let mut c = candidate(3, 0.7, 200);
        c.hash = PerceptualHash::parse("0000000000000003");
        let mut d = candidate(4, 0.6, 300);
        d.hash = PerceptualHash::parse("ffffffffffffffff");

        let (ids, telemetry) = run(&PhashDiversityStage, values, vec![a, b, c, d]);
        assert_eq!(ids, vec![1, 4]);
        assert_eq!(telemetry.rejections_for(RejectionReason::PhashSimilarity), 2);
    }

    #[test]
    fn test_phash_readmits_when_short() {
        let values = PolicyValues {
            max_per_day: Some(3),
            ..PolicyValues::default()
        };
        let mut a = candidate(1, 0.9, 0);
        a.hash = PerceptualHash::parse("0000000000000000");
        let mut b = candidate(2, 0.8, 100);
        b.hash = PerceptualHash::parse("0000000000000001");

        let (ids, _) = run(&PhashDiversityStage, values, vec![a, b]);
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_people_balance_caps_dominant_person() {
        let values = PolicyValues {
            target_total: 4,
            minimum_total: 1,
            ..PolicyValues::default()
        };
        let mut candidates = Vec::new();
        for id in 1..=4 {
            let mut c = candidate(id, 1.0 - id as f64 * 0.1, id * 1000);
            c.person_ids = vec![10];
            candidates.push(c);
        }
        let mut other = candidate(5, 0.1, 9000);
        other.person_ids = vec![20];
        candidates.push(other);

        // Two persons: neutral share 0.65, expected 4, cap 3
        let (ids, telemetry) = run(&PeopleBalanceStage, values, candidates);
        assert_eq!(ids, vec![1, 2, 3, 5]);
        assert_eq!(telemetry.rejections_for(RejectionReason::PeopleBalance), 1);
    }

    fn crowd() -> Vec<Candidate> {
        // Person 10 in eight frames, three others once each.
        let mut candidates = Vec::new();
        for id in 1..=8 {
            let mut c = candidate(id, 1.0 - id as f64 * 0.05, id * 1000);
            c.person_ids = vec![10];
            candidates.push(c);
        }
        for (id, person) in [(9, 20), (10, 30), (11, 40)] {
            let mut c = candidate(id, 0.3, id * 1000);
            c.person_ids = vec![person];
            candidates.push(c);
        }
        candidates
    }

    #[test]
    fn test_important_person_gets_larger_share() {
        // Four persons: neutral share 0.40, expected 9, cap ceil(3.6) = 4
        let values = PolicyValues {
            target_total: 9,
            minimum_total: 1,
            ..PolicyValues::default()
        };
        let (ids, telemetry) = run(&PeopleBalanceStage, values.clone(), crowd());
        assert_eq!(ids, vec![1, 2, 3, 4, 9, 10, 11]);
        assert_eq!(telemetry.rejections_for(RejectionReason::PeopleBalance), 4);

        // Important: share max(0.40, 0.5), cap ceil(4.5) = 5
        let mut values = values;
        values.people.important_person_ids.insert(10);
        let (ids, telemetry) = run(&PeopleBalanceStage, values, crowd());
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 9, 10, 11]);
        assert_eq!(telemetry.rejections_for(RejectionReason::PeopleBalance), 3);
    }

    fn group_shots() -> Vec<Candidate> {
        (1..=6)
            .map(|id| {
                let mut c = candidate(id, 1.0 - id as f64 * 0.1, id * 1000);
                c.person_ids = vec![1, 2, 3];
                c.face_count = 3;
                c
            })
            .collect()
    }

    #[test]
    fn test_group_shots_exempt_up_to_coverage() {
        // Three persons: share 0.483, expected 6, cap 3; coverage 0.3 of 6
        // lets one extra group shot through.
        let values = PolicyValues {
            target_total: 6,
            minimum_total: 1,
            ..PolicyValues::default()
        };
        let (ids, telemetry) = run(&PeopleBalanceStage, values.clone(), group_shots());
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(telemetry.rejections_for(RejectionReason::PeopleBalance), 2);

        // Below the group size nothing is exempt.
        let mut values = values;
        values.people.group_shot_min_faces = 4;
        let (ids, telemetry) = run(&PeopleBalanceStage, values, group_shots());
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(telemetry.rejections_for(RejectionReason::PeopleBalance), 3);
    }

    #[test]
    fn test_people_balance_disabled() {
        let mut values = PolicyValues::default();
        values.people.enabled = false;
        let mut candidates = Vec::new();
        for id in 1..=4 {
            let mut c = candidate(id, 0.5, id * 1000);
            c.person_ids = vec![10];
            candidates.push(c);
        }
        let (ids, _) = run(&PeopleBalanceStage, values, candidates);
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_staypoint_quota() {
        let values = PolicyValues {
            max_per_staypoint: Some(1),
            ..PolicyValues::default()
        };
        let candidates: Vec<Candidate> = (1..=3)
            .map(|id| {
                let mut c = candidate(id, 0.9 - id as f64 * 0.1, id * 3600);
                c.staypoint = Some("cafe".to_string());
                c
            })
            .collect();

        let (ids, telemetry) = run(&StaypointQuotaStage, values, candidates);
        assert_eq!(ids, vec![1]);
        assert_eq!(telemetry.rejections_for(RejectionReason::StaypointQuota), 2);
    }
}
