//! Candidate pool and pre-filters.

use chrono::{NaiveDate, Timelike};
use std::cmp::Ordering;

use super::policy::SelectionPolicy;
use super::telemetry::SelectionTelemetry;
use crate::days::{DaySummary, TimezoneResolver};
use crate::media::{MediaId, PerceptualHash, PersonId};

/// Share of the frame above which a single face counts as a selfie.
const SELFIE_FACE_RATIO: f64 = 0.25;

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: MediaId,
    pub score: f64,
    pub quality: f64,
    pub day: NaiveDate,
    pub timestamp: i64,
    /// Seconds since local midnight.
    pub local_seconds: i64,
    pub slot: u32,
    pub staypoint: Option<String>,
    pub hash: Option<PerceptualHash>,
    pub person_ids: Vec<PersonId>,
    pub face_count: u32,
    pub is_video: bool,
    /// Capture span of the candidate's day.
    pub day_duration: i64,
}

impl Candidate {
    /// Hamming distance, `None` unless both hashes are known.
    pub fn hash_distance(&self, other: &Candidate) -> Option<u32> {
        match (&self.hash, &other.hash) {
            (Some(a), Some(b)) => Some(a.distance(b)),
            _ => None,
        }
    }

    pub fn similarity(&self, other: &Candidate) -> f64 {
        match (&self.hash, &other.hash) {
            (Some(a), Some(b)) => a.similarity(b),
            _ => 0.0,
        }
    }

    /// Sorted, comma-joined person ids. Empty for shots without people.
    pub fn person_signature(&self) -> String {
        let mut ids = self.person_ids.clone();
        ids.sort_unstable();
        ids.dedup();
        ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",")
    }
}

/// Best score first, then earlier capture, then lower id.
pub fn priority_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(a.timestamp.cmp(&b.timestamp))
        .then(a.id.cmp(&b.id))
}

/// Candidates for every timed member of the given non-synthetic days.
pub fn build_candidates(
    days: &[&DaySummary],
    policy: &SelectionPolicy,
    resolver: &TimezoneResolver,
) -> Vec<Candidate> {
    let slot_seconds = policy.time_slot_seconds();
    let mut candidates = Vec::new();

    for day in days.iter().filter(|d| !d.is_synthetic) {
        let day_duration = day.time_span_seconds();

        for media in &day.members {
            let (Some(timestamp), Some(local)) = (media.timestamp(), resolver.local_datetime(media))
            else {
                continue;
            };
            let local_seconds = local.time().num_seconds_from_midnight() as i64;
            let quality = media.quality();

            let mut score = quality;
            if media.is_video {
                score += policy.video_bonus();
            }
            if media.face_count > 0 {
                score += policy.face_bonus();
            }
            let is_selfie = media.face_count == 1
                && media
                    .largest_face_ratio
                    .is_some_and(|r| r >= SELFIE_FACE_RATIO);
            if is_selfie {
                score -= policy.selfie_penalty();
            }

            candidates.push(Candidate {
                id: media.id,
                score,
                quality,
                day: day.date,
                timestamp,
                local_seconds,
                slot: (local_seconds / slot_seconds) as u32,
                staypoint: day.staypoint_index.key_for(media.id).map(str::to_string),
                hash: media.perceptual_hash(),
                person_ids: media.person_ids.clone(),
                face_count: media.face_count,
                is_video: media.is_video,
                day_duration,
            });
        }
    }

    candidates
}

pub fn apply_quality_floor(
    candidates: Vec<Candidate>,
    policy: &SelectionPolicy,
    telemetry: &mut SelectionTelemetry,
) -> Vec<Candidate> {
    let before = candidates.len();
    let kept: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| c.quality >= policy.quality_floor())
        .collect();
    telemetry.prefilter_quality_floor += before - kept.len();
    kept
}

/// Collapse chains of consecutive same-day captures to their best member.
pub fn collapse_bursts(
    mut candidates: Vec<Candidate>,
    policy: &SelectionPolicy,
    telemetry: &mut SelectionTelemetry,
) -> Vec<Candidate> {
    let window = policy.burst_window_seconds();
    if window <= 0 || candidates.len() < 2 {
        return candidates;
    }

    candidates.sort_by(|a, b| {
        a.day
            .cmp(&b.day)
            .then(a.timestamp.cmp(&b.timestamp))
            .then(a.id.cmp(&b.id))
    });

    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    let mut burst: Vec<Candidate> = Vec::new();

    for candidate in candidates {
        let joins = burst.last().is_some_and(|prev| {
            prev.day == candidate.day
                && candidate.timestamp - prev.timestamp <= window
                && prev
                    .hash_distance(&candidate)
                    .map_or(true, |d| d <= policy.burst_max_hamming())
        });
        if !joins {
            flush_burst(&mut burst, &mut kept, telemetry);
        }
        burst.push(candidate);
    }
    flush_burst(&mut burst, &mut kept, telemetry);

    kept
}

fn flush_burst(burst: &mut Vec<Candidate>, kept: &mut Vec<Candidate>, telemetry: &mut SelectionTelemetry) {
    if burst.is_empty() {
        return;
    }
    telemetry.burst_collapsed += burst.len() - 1;
    burst.sort_by(priority_order);
    if let Some(best) = burst.drain(..).next() {
        kept.push(best);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::policy::PolicyValues;

    fn candidate(id: i64, score: f64, timestamp: i64) -> Candidate {
        Candidate {
            id,
            score,
            quality: score,
            day: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
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

    fn policy() -> SelectionPolicy {
        SelectionPolicy::new(PolicyValues::default()).unwrap()
    }

    #[test]
    fn test_quality_floor() {
        let mut telemetry = SelectionTelemetry::default();
        let kept = apply_quality_floor(
            vec![candidate(1, 0.8, 0), candidate(2, 0.2, 10)],
            &policy(),
            &mut telemetry,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 1);
        assert_eq!(telemetry.prefilter_quality_floor, 1);
    }

    #[test]
    fn test_burst_keeps_best() {
        let mut telemetry = SelectionTelemetry::default();
        let kept = collapse_bursts(
            vec![
                candidate(1, 0.6, 1000),
                candidate(2, 0.7, 1015),
                candidate(3, 0.9, 1035),
                candidate(4, 0.5, 5000),
            ],
            &policy(),
            &mut telemetry,
        );
        let ids: Vec<i64> = kept.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(telemetry.burst_collapsed, 2);
    }

    #[test]
    fn test_burst_split_by_hash() {
        let mut a = candidate(1, 0.6, 1000);
        let mut b = candidate(2, 0.7, 1010);
        a.hash = PerceptualHash::parse("0000000000000000");
        b.hash = PerceptualHash::parse("ffffffffffffffff");

        let mut telemetry = SelectionTelemetry::default();
        let kept = collapse_bursts(vec![a, b], &policy(), &mut telemetry);
        assert_eq!(kept.len(), 2);
        assert_eq!(telemetry.burst_collapsed, 0);
    }

    #[test]
    fn test_person_signature() {
        let mut c = candidate(1, 0.5, 0);
        assert_eq!(c.person_signature(), "");
        c.person_ids = vec![7, 3, 7];
        assert_eq!(c.person_signature(), "3,7");
    }
}
