//! Selection policy: validated thresholds for one run, and the provider that
//! derives them from a configured profile.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::config::SelectionConfig;
use crate::error::PolicyError;
use crate::media::PersonId;
use crate::vacation::DayContext;

/// Named, user-editable selection profile (`[selection.profiles.<name>]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionProfile {
    #[serde(default = "default_target_total")]
    pub target_total: usize,

    #[serde(default = "default_minimum_total")]
    pub minimum_total: usize,

    /// Target members per active day before the profile ceiling applies.
    #[serde(default = "default_per_day_target")]
    pub per_day_target: f64,

    #[serde(default = "default_max_per_day")]
    pub max_per_day: usize,

    #[serde(default = "default_time_slot_hours")]
    pub time_slot_hours: f64,

    #[serde(default = "default_min_spacing_seconds")]
    pub min_spacing_seconds: i64,

    #[serde(default = "default_factor")]
    pub spacing_progress_factor: f64,

    #[serde(default = "default_phash_min_hamming")]
    pub phash_min_hamming: u32,

    /// Percentile of same-day pairwise hash distances used as adaptive threshold.
    #[serde(default = "default_phash_percentile")]
    pub phash_percentile: f64,

    #[serde(default = "default_max_per_staypoint")]
    pub max_per_staypoint: Option<usize>,

    /// Cap once relaxed. Unset means unbounded.
    #[serde(default = "default_max_per_staypoint_relaxed")]
    pub max_per_staypoint_relaxed: Option<usize>,

    #[serde(default = "default_quality_floor")]
    pub quality_floor: f64,

    #[serde(default = "default_video_bonus")]
    pub video_bonus: f64,

    #[serde(default = "default_face_bonus")]
    pub face_bonus: f64,

    #[serde(default = "default_selfie_penalty")]
    pub selfie_penalty: f64,

    #[serde(default = "default_burst_window_seconds")]
    pub burst_window_seconds: i64,

    #[serde(default = "default_burst_max_hamming")]
    pub burst_max_hamming: u32,

    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f64,

    #[serde(default = "default_people_balance")]
    pub people_balance: bool,

    #[serde(default = "default_group_shot_min_faces")]
    pub group_shot_min_faces: usize,

    #[serde(default = "default_group_shot_coverage")]
    pub group_shot_coverage: f64,
}

fn default_target_total() -> usize {
    40
}

fn default_minimum_total() -> usize {
    8
}

fn default_per_day_target() -> f64 {
    6.0
}

fn default_max_per_day() -> usize {
    10
}

fn default_time_slot_hours() -> f64 {
    2.0
}

fn default_min_spacing_seconds() -> i64 {
    900
}

fn default_factor() -> f64 {
    1.0
}

fn default_phash_min_hamming() -> u32 {
    6
}

fn default_phash_percentile() -> f64 {
    0.1
}

fn default_max_per_staypoint() -> Option<usize> {
    Some(4)
}

fn default_max_per_staypoint_relaxed() -> Option<usize> {
    Some(8)
}

fn default_quality_floor() -> f64 {
    0.3
}

fn default_video_bonus() -> f64 {
    0.08
}

fn default_face_bonus() -> f64 {
    0.05
}

fn default_selfie_penalty() -> f64 {
    0.1
}

fn default_burst_window_seconds() -> i64 {
    45
}

fn default_burst_max_hamming() -> u32 {
    12
}

fn default_mmr_lambda() -> f64 {
    0.75
}

fn default_people_balance() -> bool {
    true
}

fn default_group_shot_min_faces() -> usize {
    3
}

fn default_group_shot_coverage() -> f64 {
    0.3
}

impl Default for SelectionProfile {
    fn default() -> Self {
        Self {
            target_total: default_target_total(),
            minimum_total: default_minimum_total(),
            per_day_target: default_per_day_target(),
            max_per_day: default_max_per_day(),
            time_slot_hours: default_time_slot_hours(),
            min_spacing_seconds: default_min_spacing_seconds(),
            spacing_progress_factor: default_factor(),
            phash_min_hamming: default_phash_min_hamming(),
            phash_percentile: default_phash_percentile(),
            max_per_staypoint: default_max_per_staypoint(),
            max_per_staypoint_relaxed: default_max_per_staypoint_relaxed(),
            quality_floor: default_quality_floor(),
            video_bonus: default_video_bonus(),
            face_bonus: default_face_bonus(),
            selfie_penalty: default_selfie_penalty(),
            burst_window_seconds: default_burst_window_seconds(),
            burst_max_hamming: default_burst_max_hamming(),
            mmr_lambda: default_mmr_lambda(),
            people_balance: default_people_balance(),
            group_shot_min_faces: default_group_shot_min_faces(),
            group_shot_coverage: default_group_shot_coverage(),
        }
    }
}

/// Upstream enrichment that the policy may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureAvailability {
    pub face_detection: bool,
}

impl Default for FeatureAvailability {
    fn default() -> Self {
        Self {
            face_detection: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeopleBalance {
    pub enabled: bool,
    pub important_person_ids: BTreeSet<PersonId>,
    pub group_shot_min_faces: usize,
    pub group_shot_coverage: f64,
}

/// Raw policy values. Validated by [`SelectionPolicy::new`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyValues {
    pub profile: String,
    pub target_total: usize,
    pub minimum_total: usize,
    /// `None` means no per-day ceiling.
    pub max_per_day: Option<usize>,
    pub time_slot_hours: f64,
    pub min_spacing_seconds: i64,
    pub spacing_progress_factor: f64,
    pub phash_min_hamming: u32,
    pub phash_percentile: f64,
    pub max_per_staypoint: Option<usize>,
    pub max_per_staypoint_relaxed: Option<usize>,
    pub quality_floor: f64,
    pub video_bonus: f64,
    pub face_bonus: f64,
    pub selfie_penalty: f64,
    pub burst_window_seconds: i64,
    pub burst_max_hamming: u32,
    pub mmr_lambda: f64,
    pub people: PeopleBalance,
    pub day_quotas: BTreeMap<NaiveDate, usize>,
}

impl PolicyValues {
    /// Values taken straight from a profile, without run-length scaling.
    pub fn from_profile(name: &str, profile: &SelectionProfile) -> Self {
        Self {
            profile: name.to_string(),
            target_total: profile.target_total,
            minimum_total: profile.minimum_total,
            max_per_day: Some(profile.max_per_day).filter(|cap| *cap > 0),
            time_slot_hours: profile.time_slot_hours,
            min_spacing_seconds: profile.min_spacing_seconds,
            spacing_progress_factor: profile.spacing_progress_factor,
            phash_min_hamming: profile.phash_min_hamming,
            phash_percentile: profile.phash_percentile,
            max_per_staypoint: profile.max_per_staypoint,
            max_per_staypoint_relaxed: profile.max_per_staypoint_relaxed,
            quality_floor: profile.quality_floor,
            video_bonus: profile.video_bonus,
            face_bonus: profile.face_bonus,
            selfie_penalty: profile.selfie_penalty,
            burst_window_seconds: profile.burst_window_seconds,
            burst_max_hamming: profile.burst_max_hamming,
            mmr_lambda: profile.mmr_lambda,
            people: PeopleBalance {
                enabled: profile.people_balance,
                important_person_ids: BTreeSet::new(),
                group_shot_min_faces: profile.group_shot_min_faces,
                group_shot_coverage: profile.group_shot_coverage,
            },
            day_quotas: BTreeMap::new(),
        }
    }
}

impl Default for PolicyValues {
    fn default() -> Self {
        Self::from_profile("default", &SelectionProfile::default())
    }
}

/// Immutable, validated selection policy.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionPolicy {
    values: PolicyValues,
}

impl SelectionPolicy {
    pub fn new(values: PolicyValues) -> Result<Self, PolicyError> {
        if values.target_total == 0 {
            return Err(PolicyError::ZeroTarget);
        }
        if values.minimum_total > values.target_total {
            return Err(PolicyError::MinimumExceedsTarget {
                minimum: values.minimum_total,
                target: values.target_total,
            });
        }
        if !(0.0..=1.0).contains(&values.quality_floor) {
            return Err(PolicyError::QualityFloorOutOfRange(values.quality_floor));
        }
        if !(values.time_slot_hours > 0.0) || !values.time_slot_hours.is_finite() {
            return Err(PolicyError::InvalidValue {
                field: "time_slot_hours",
                value: values.time_slot_hours,
            });
        }

        let non_negative = [
            ("min_spacing_seconds", values.min_spacing_seconds as f64),
            ("spacing_progress_factor", values.spacing_progress_factor),
            ("video_bonus", values.video_bonus),
            ("face_bonus", values.face_bonus),
            ("selfie_penalty", values.selfie_penalty),
            ("burst_window_seconds", values.burst_window_seconds as f64),
            ("group_shot_coverage", values.people.group_shot_coverage),
        ];
        for (field, value) in non_negative {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(PolicyError::InvalidValue { field, value });
            }
        }

        for (field, value) in [
            ("phash_percentile", values.phash_percentile),
            ("mmr_lambda", values.mmr_lambda),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PolicyError::InvalidValue { field, value });
            }
        }

        let relaxed_ok = match (values.max_per_staypoint, values.max_per_staypoint_relaxed) {
            (None, relaxed) => relaxed.is_none(),
            (Some(_), None) => true,
            (Some(strict), Some(relaxed)) => relaxed >= strict,
        };
        if !relaxed_ok {
            return Err(PolicyError::RelaxedCapTooStrict {
                strict: values.max_per_staypoint,
                relaxed: values.max_per_staypoint_relaxed,
            });
        }

        Ok(Self { values })
    }

    pub fn values(&self) -> &PolicyValues {
        &self.values
    }

    pub fn profile(&self) -> &str {
        &self.values.profile
    }

    pub fn target_total(&self) -> usize {
        self.values.target_total
    }

    pub fn minimum_total(&self) -> usize {
        self.values.minimum_total
    }

    pub fn max_per_day(&self) -> Option<usize> {
        self.values.max_per_day
    }

    pub fn time_slot_seconds(&self) -> i64 {
        ((self.values.time_slot_hours * 3600.0).round() as i64).max(1)
    }

    pub fn min_spacing_seconds(&self) -> i64 {
        self.values.min_spacing_seconds
    }

    /// Spacing floor after the progress factor.
    pub fn spacing_floor_seconds(&self) -> i64 {
        (self.values.min_spacing_seconds as f64 * self.values.spacing_progress_factor).round() as i64
    }

    pub fn phash_min_hamming(&self) -> u32 {
        self.values.phash_min_hamming
    }

    pub fn phash_percentile(&self) -> f64 {
        self.values.phash_percentile
    }

    pub fn max_per_staypoint(&self) -> Option<usize> {
        self.values.max_per_staypoint
    }

    pub fn max_per_staypoint_relaxed(&self) -> Option<usize> {
        self.values.max_per_staypoint_relaxed
    }

    pub fn quality_floor(&self) -> f64 {
        self.values.quality_floor
    }

    pub fn video_bonus(&self) -> f64 {
        self.values.video_bonus
    }

    pub fn face_bonus(&self) -> f64 {
        self.values.face_bonus
    }

    pub fn selfie_penalty(&self) -> f64 {
        self.values.selfie_penalty
    }

    pub fn burst_window_seconds(&self) -> i64 {
        self.values.burst_window_seconds
    }

    pub fn burst_max_hamming(&self) -> u32 {
        self.values.burst_max_hamming
    }

    pub fn mmr_lambda(&self) -> f64 {
        self.values.mmr_lambda
    }

    pub fn people(&self) -> &PeopleBalance {
        &self.values.people
    }

    pub fn day_quotas(&self) -> &BTreeMap<NaiveDate, usize> {
        &self.values.day_quotas
    }

    /// Effective ceiling for one day: its quota bounded by the per-day cap.
    pub fn day_cap(&self, day: NaiveDate) -> Option<usize> {
        match (self.values.day_quotas.get(&day).copied(), self.values.max_per_day) {
            (Some(quota), Some(cap)) => Some(quota.min(cap)),
            (Some(quota), None) => Some(quota),
            (None, cap) => cap,
        }
    }

    /// Largest ceiling any day is held to, `None` when nothing is capped.
    pub fn largest_day_cap(&self) -> Option<usize> {
        let quotas = self.values.day_quotas.keys().filter_map(|d| self.day_cap(*d));
        quotas.chain(self.values.max_per_day).max()
    }
}

/// Resolves a profile into a run-specific policy.
pub struct SelectionPolicyProvider {
    profiles: BTreeMap<String, SelectionProfile>,
    important_person_ids: BTreeSet<PersonId>,
}

impl SelectionPolicyProvider {
    pub fn new(config: &SelectionConfig) -> Self {
        Self {
            profiles: config.profiles.clone(),
            important_person_ids: config.important_person_ids.iter().copied().collect(),
        }
    }

    pub fn profile(&self, name: &str) -> Option<&SelectionProfile> {
        self.profiles.get(name)
    }

    pub fn for_run(
        &self,
        profile_name: &str,
        context: &DayContext,
        features: FeatureAvailability,
    ) -> Result<SelectionPolicy, PolicyError> {
        let profile = self
            .profiles
            .get(profile_name)
            .ok_or_else(|| PolicyError::UnknownProfile(profile_name.to_string()))?;

        let active_days = context.active_days().max(1);
        let scaled = (profile.per_day_target * active_days as f64).ceil().max(0.0) as usize;
        let target = profile.target_total.min(profile.minimum_total.max(scaled));
        let per_day_cap = profile.max_per_day.max(target.div_ceil(active_days));

        let mut values = PolicyValues::from_profile(profile_name, profile);
        values.target_total = target;
        values.minimum_total = profile.minimum_total.min(target);
        values.max_per_day = Some(per_day_cap);
        values.people.important_person_ids = self.important_person_ids.clone();
        values.day_quotas = distribute_quotas(context, target, per_day_cap);

        if !features.face_detection {
            values.face_bonus = 0.0;
            values.selfie_penalty = 0.0;
            values.people.enabled = false;
        }

        debug!(
            profile = profile_name,
            target,
            active_days,
            per_day_cap,
            "Resolved selection policy"
        );

        SelectionPolicy::new(values)
    }
}

/// Spread `target` over days with members proportionally to their weight.
fn distribute_quotas(context: &DayContext, target: usize, cap: usize) -> BTreeMap<NaiveDate, usize> {
    let active: Vec<(NaiveDate, f64)> = context
        .iter()
        .filter(|(_, entry)| entry.member_count > 0)
        .map(|(date, entry)| (*date, entry.weight))
        .collect();
    if active.is_empty() {
        return BTreeMap::new();
    }

    let total_weight: f64 = active.iter().map(|(_, w)| w).sum();
    active
        .iter()
        .map(|(date, weight)| {
            let share = if total_weight > 0.0 {
                target as f64 * weight / total_weight
            } else {
                target as f64 / active.len() as f64
            };
            (*date, (share.round() as usize).clamp(1, cap.max(1)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vacation::{DayContextEntry, DayRole};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, day).unwrap()
    }

    fn context(roles: &[(u32, DayRole, usize)]) -> DayContext {
        let mut ctx = DayContext::default();
        for (day, role, members) in roles {
            ctx.insert(date(*day), DayContextEntry::new(*role, *members));
        }
        ctx
    }

    #[test]
    fn test_validation() {
        assert!(SelectionPolicy::new(PolicyValues::default()).is_ok());

        let values = PolicyValues {
            target_total: 0,
            minimum_total: 0,
            ..PolicyValues::default()
        };
        assert_eq!(SelectionPolicy::new(values), Err(PolicyError::ZeroTarget));

        let values = PolicyValues {
            target_total: 5,
            minimum_total: 6,
            ..PolicyValues::default()
        };
        assert_eq!(
            SelectionPolicy::new(values),
            Err(PolicyError::MinimumExceedsTarget {
                minimum: 6,
                target: 5
            })
        );

        let values = PolicyValues {
            quality_floor: 1.5,
            ..PolicyValues::default()
        };
        assert!(matches!(
            SelectionPolicy::new(values),
            Err(PolicyError::QualityFloorOutOfRange(_))
        ));

        let values = PolicyValues {
            time_slot_hours: 0.0,
            ..PolicyValues::default()
        };
        assert!(SelectionPolicy::new(values).is_err());

        let values = PolicyValues {
            video_bonus: f64::NAN,
            ..PolicyValues::default()
        };
        assert!(SelectionPolicy::new(values).is_err());

        let values = PolicyValues {
            max_per_staypoint: Some(4),
            max_per_staypoint_relaxed: Some(2),
            ..PolicyValues::default()
        };
        assert!(matches!(
            SelectionPolicy::new(values),
            Err(PolicyError::RelaxedCapTooStrict { .. })
        ));

        let values = PolicyValues {
            mmr_lambda: 1.2,
            ..PolicyValues::default()
        };
        assert!(SelectionPolicy::new(values).is_err());
    }

    #[test]
    fn test_day_cap() {
        let mut values = PolicyValues {
            max_per_day: Some(5),
            ..PolicyValues::default()
        };
        values.day_quotas.insert(date(1), 3);
        values.day_quotas.insert(date(2), 9);
        let policy = SelectionPolicy::new(values).unwrap();

        assert_eq!(policy.day_cap(date(1)), Some(3));
        assert_eq!(policy.day_cap(date(2)), Some(5));
        assert_eq!(policy.day_cap(date(3)), Some(5));
        assert_eq!(policy.largest_day_cap(), Some(5));
    }

    #[test]
    fn test_for_run_scales_with_days() {
        let provider = SelectionPolicyProvider::new(&SelectionConfig::default());
        let ctx = context(&[
            (1, DayRole::Transit, 5),
            (2, DayRole::Core, 40),
            (3, DayRole::Core, 40),
            (4, DayRole::Peripheral, 10),
        ]);

        let policy = provider
            .for_run("vacation", &ctx, FeatureAvailability::default())
            .unwrap();

        // 4 active days * 8 per day, within [12, 60]
        assert_eq!(policy.target_total(), 32);
        assert_eq!(policy.minimum_total(), 12);
        assert_eq!(policy.max_per_day(), Some(12));

        let quotas = policy.day_quotas();
        assert_eq!(quotas.len(), 4);
        assert!(quotas[&date(2)] > quotas[&date(1)]);
        assert!(quotas[&date(2)] > quotas[&date(4)]);
        assert!(quotas.values().all(|q| *q >= 1 && *q <= 12));
    }

    #[test]
    fn test_for_run_short_run_respects_minimum() {
        let provider = SelectionPolicyProvider::new(&SelectionConfig::default());
        let ctx = context(&[(1, DayRole::Core, 3)]);
        let policy = provider
            .for_run("vacation", &ctx, FeatureAvailability::default())
            .unwrap();
        assert_eq!(policy.target_total(), 12);
        assert_eq!(policy.max_per_day(), Some(12));
    }

    #[test]
    fn test_for_run_without_faces() {
        let provider = SelectionPolicyProvider::new(&SelectionConfig::default());
        let ctx = context(&[(1, DayRole::Core, 10)]);
        let policy = provider
            .for_run(
                "vacation",
                &ctx,
                FeatureAvailability {
                    face_detection: false,
                },
            )
            .unwrap();
        assert_eq!(policy.face_bonus(), 0.0);
        assert_eq!(policy.selfie_penalty(), 0.0);
        assert!(!policy.people().enabled);
    }

    #[test]
    fn test_unknown_profile() {
        let provider = SelectionPolicyProvider::new(&SelectionConfig::default());
        let err = provider
            .for_run("nope", &DayContext::default(), FeatureAvailability::default())
            .unwrap_err();
        assert_eq!(err, PolicyError::UnknownProfile("nope".to_string()));
    }
}
