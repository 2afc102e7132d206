//! Threshold relaxation applied when a pass selects fewer than the minimum.

use serde::Serialize;

use super::policy::SelectionPolicy;
use super::telemetry::SelectionTelemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelaxationRule {
    MinSpacing,
    PhashThreshold,
    MaxPerDay,
    MaxPerStaypoint,
}

impl RelaxationRule {
    pub const CASCADE: [RelaxationRule; 4] = [
        RelaxationRule::MinSpacing,
        RelaxationRule::PhashThreshold,
        RelaxationRule::MaxPerDay,
        RelaxationRule::MaxPerStaypoint,
    ];
}

/// A logged relaxation. `to: None` means unbounded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelaxationStep {
    pub rule: RelaxationRule,
    pub from: Option<f64>,
    pub to: Option<f64>,
}

/// Thresholds in force for one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub spacing: bool,
    pub adaptive_phash: bool,
    pub day_caps: bool,
    pub staypoint_cap: Option<usize>,
}

impl Thresholds {
    pub fn strict(policy: &SelectionPolicy) -> Self {
        Self {
            spacing: true,
            adaptive_phash: true,
            day_caps: true,
            staypoint_cap: policy.max_per_staypoint(),
        }
    }

    /// Loosen one rule. Returns the step when something actually changed.
    /// `last` is the telemetry of the previous pass.
    pub fn relax(
        &mut self,
        rule: RelaxationRule,
        policy: &SelectionPolicy,
        last: &SelectionTelemetry,
    ) -> Option<RelaxationStep> {
        match rule {
            RelaxationRule::MinSpacing => {
                if !self.spacing {
                    return None;
                }
                self.spacing = false;
                (last.max_spacing_seconds > 0).then(|| RelaxationStep {
                    rule,
                    from: Some(last.max_spacing_seconds as f64),
                    to: Some(0.0),
                })
            }
            RelaxationRule::PhashThreshold => {
                if !self.adaptive_phash {
                    return None;
                }
                self.adaptive_phash = false;
                let floor = policy.phash_min_hamming();
                (last.max_phash_threshold > floor).then(|| RelaxationStep {
                    rule,
                    from: Some(last.max_phash_threshold as f64),
                    to: Some(floor as f64),
                })
            }
            RelaxationRule::MaxPerDay => {
                if !self.day_caps {
                    return None;
                }
                self.day_caps = false;
                policy.largest_day_cap().map(|cap| RelaxationStep {
                    rule,
                    from: Some(cap as f64),
                    to: None,
                })
            }
            RelaxationRule::MaxPerStaypoint => {
                let strict = self.staypoint_cap?;
                let relaxed = policy.max_per_staypoint_relaxed();
                if relaxed == Some(strict) {
                    return None;
                }
                self.staypoint_cap = relaxed;
                Some(RelaxationStep {
                    rule,
                    from: Some(strict as f64),
                    to: relaxed.map(|cap| cap as f64),
                })
            }
        }
    }
}
