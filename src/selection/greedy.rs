//! Greedy core: MMR picks inside (day, slot) buckets under the hard caps.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::candidate::{priority_order, Candidate};
use super::stages::StageContext;
use super::telemetry::{MmrTraceEntry, RejectionReason, SelectionTelemetry};

pub fn greedy_select(
    candidates: Vec<Candidate>,
    ctx: &StageContext<'_>,
    telemetry: &mut SelectionTelemetry,
) -> Vec<Candidate> {
    let mut buckets: BTreeMap<(NaiveDate, u32), Vec<Candidate>> = BTreeMap::new();
    for candidate in candidates {
        buckets
            .entry((candidate.day, candidate.slot))
            .or_default()
            .push(candidate);
    }

    let target = ctx.policy.target_total();
    let mut accepted: Vec<Candidate> = Vec::new();

    for ((day, slot), mut remaining) in buckets {
        remaining.sort_by(priority_order);

        while !remaining.is_empty() {
            let (index, entry) = next_pick(&remaining, &accepted, ctx, day, slot);
            telemetry.mmr_trace.push(entry);
            let candidate = remaining.remove(index);

            let duplicates = near_duplicates_of(&candidate, &accepted, ctx);
            if let Some(&dup) = duplicates.first() {
                // Swapping out one frame must not leave the newcomer next to
                // another near-duplicate.
                if duplicates.len() == 1
                    && candidate.score > accepted[dup].score
                    && check_caps(&candidate, &accepted, Some(dup), ctx).is_ok()
                {
                    accepted[dup] = candidate;
                    telemetry.replacements += 1;
                } else {
                    telemetry.near_duplicate_blocked += 1;
                }
                continue;
            }

            if accepted.len() >= target {
                continue;
            }

            match check_caps(&candidate, &accepted, None, ctx) {
                Ok(()) => accepted.push(candidate),
                Err(reason) => telemetry.reject(reason),
            }
        }
    }

    accepted
}

/// Highest MMR score in the bucket; earlier priority wins ties.
fn next_pick(
    remaining: &[Candidate],
    accepted: &[Candidate],
    ctx: &StageContext<'_>,
    day: NaiveDate,
    slot: u32,
) -> (usize, MmrTraceEntry) {
    let lambda = ctx.policy.mmr_lambda();
    let mut best: Option<(usize, f64, f64)> = None;

    for (i, candidate) in remaining.iter().enumerate() {
        let redundancy = accepted
            .iter()
            .filter(|a| a.day == candidate.day)
            .map(|a| candidate.similarity(a))
            .fold(0.0, f64::max);
        let mmr = lambda * candidate.score - (1.0 - lambda) * redundancy;
        if best.map_or(true, |(_, top, _)| mmr > top) {
            best = Some((i, mmr, redundancy));
        }
    }

    let (index, mmr, redundancy) = best.unwrap_or((0, 0.0, 0.0));
    let picked = &remaining[index];
    (
        index,
        MmrTraceEntry {
            id: picked.id,
            day,
            slot,
            relevance: picked.score,
            redundancy,
            mmr,
        },
    )
}

/// Indices of accepted frames closer than the pHash floor.
pub(crate) fn near_duplicates_of(
    candidate: &Candidate,
    accepted: &[Candidate],
    ctx: &StageContext<'_>,
) -> Vec<usize> {
    let floor = ctx.policy.phash_min_hamming();
    accepted
        .iter()
        .enumerate()
        .filter(|(_, a)| {
            a.day == candidate.day && a.hash_distance(candidate).is_some_and(|d| d < floor)
        })
        .map(|(i, _)| i)
        .collect()
}

/// Spacing, day cap and staypoint cap against `accepted`, ignoring `skip`.
pub(crate) fn check_caps(
    candidate: &Candidate,
    accepted: &[Candidate],
    skip: Option<usize>,
    ctx: &StageContext<'_>,
) -> Result<(), RejectionReason> {
    let others: Vec<&Candidate> = accepted
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != skip)
        .map(|(_, a)| a)
        .collect();
    let same_day = others.iter().filter(|a| a.day == candidate.day).count();

    let spacing = ctx.spacing_for(candidate.day, candidate.day_duration);
    if others
        .iter()
        .any(|a| a.day == candidate.day && (a.timestamp - candidate.timestamp).abs() < spacing)
    {
        return Err(RejectionReason::GreedySpacing);
    }

    if let Some(cap) = ctx.day_cap(candidate.day) {
        if same_day >= cap {
            return Err(RejectionReason::GreedyDayCap);
        }
    }

    if let (Some(cap), Some(key)) = (ctx.staypoint_cap(), &candidate.staypoint) {
        if others.iter().filter(|a| a.staypoint.as_ref() == Some(key)).count() >= cap {
            return Err(RejectionReason::GreedyStaypointCap);
        }
    }

    Ok(())
}
