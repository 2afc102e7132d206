//! Contiguous away-day runs.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

use super::transport::TransportDayExtender;
use crate::config::VacationConfig;
use crate::days::DaySummary;

pub struct VacationRunDetector<'a> {
    config: &'a VacationConfig,
}

impl<'a> VacationRunDetector<'a> {
    pub fn new(config: &'a VacationConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, days: &BTreeMap<NaiveDate, DaySummary>) -> Vec<Vec<NaiveDate>> {
        let extender = TransportDayExtender::new(self.config);
        let runs: Vec<Vec<NaiveDate>> = away_runs(days)
            .iter()
            .map(|run| extender.extend(run, days))
            .collect();

        let merged = merge_runs(runs);
        debug!(runs = merged.len(), "Detected vacation runs");
        merged
    }
}

/// Calendar-consecutive away days.
fn away_runs(days: &BTreeMap<NaiveDate, DaySummary>) -> Vec<Vec<NaiveDate>> {
    let mut runs: Vec<Vec<NaiveDate>> = Vec::new();
    for date in days.iter().filter(|(_, d)| d.is_away).map(|(date, _)| *date) {
        match runs.last_mut() {
            Some(run) if run.last().and_then(|d| d.succ_opt()) == Some(date) => run.push(date),
            _ => runs.push(vec![date]),
        }
    }
    runs
}

/// Merge runs that overlap or touch.
fn merge_runs(mut runs: Vec<Vec<NaiveDate>>) -> Vec<Vec<NaiveDate>> {
    runs.retain(|r| !r.is_empty());
    runs.sort_by_key(|r| r[0]);

    let mut merged: Vec<Vec<NaiveDate>> = Vec::new();
    for run in runs {
        let touches = merged.last().is_some_and(|prev| {
            let prev_end = prev[prev.len() - 1];
            run[0] <= prev_end || prev_end.succ_opt() == Some(run[0])
        });
        match merged.last_mut() {
            Some(prev) if touches => {
                prev.extend(run);
                prev.sort();
                prev.dedup();
            }
            _ => merged.push(run),
        }
    }
    merged
}
