//! Per-day roles within a run.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::days::DaySummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DayRole {
    Core,
    Peripheral,
    Transit,
    Synthetic,
}

impl DayRole {
    pub fn weight(&self) -> f64 {
        match self {
            DayRole::Core => 1.0,
            DayRole::Peripheral => 0.6,
            DayRole::Transit => 0.35,
            DayRole::Synthetic => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DayRole::Core => "core",
            DayRole::Peripheral => "peripheral",
            DayRole::Transit => "transit",
            DayRole::Synthetic => "synthetic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DayContextEntry {
    pub role: DayRole,
    pub weight: f64,
    pub member_count: usize,
}

impl DayContextEntry {
    pub fn new(role: DayRole, member_count: usize) -> Self {
        Self {
            role,
            weight: role.weight(),
            member_count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DayContext {
    entries: BTreeMap<NaiveDate, DayContextEntry>,
}

impl DayContext {
    /// Assign roles to the run's days. Days missing from `days` are skipped.
    pub fn from_run(
        day_keys: &[NaiveDate],
        days: &BTreeMap<NaiveDate, DaySummary>,
    ) -> Self {
        let mut context = Self::default();
        for date in day_keys {
            let Some(day) = days.get(date) else {
                continue;
            };
            let role = if day.is_synthetic {
                DayRole::Synthetic
            } else if !day.is_away || day.in_transit {
                DayRole::Transit
            } else if day.is_core {
                DayRole::Core
            } else {
                DayRole::Peripheral
            };
            context.insert(*date, DayContextEntry::new(role, day.members.len()));
        }
        context
    }

    pub fn insert(&mut self, date: NaiveDate, entry: DayContextEntry) {
        self.entries.insert(date, entry);
    }

    pub fn get(&self, date: &NaiveDate) -> Option<&DayContextEntry> {
        self.entries.get(date)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &DayContextEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Days that carry members.
    pub fn active_days(&self) -> usize {
        self.entries.values().filter(|e| e.member_count > 0).count()
    }

    pub fn count(&self, role: DayRole) -> usize {
        self.entries.values().filter(|e| e.role == role).count()
    }
}
