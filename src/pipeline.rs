//! End-to-end driver: media → day summaries → runs → curated drafts.

use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::config::Config;
use crate::days::{build_day_summaries, DaySummary};
use crate::error::PipelineError;
use crate::home::{Home, HomeLocator};
use crate::media::Media;
use crate::monitor::{MonitoringSink, TracingMonitor};
use crate::selection::{FeatureAvailability, SelectionPolicyProvider};
use crate::vacation::{detect_vacation_runs, ClusterDraft, DayContext, VacationScoreCalculator};

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineUpdate {
    Started { media: usize },
    HomeResolved { latitude: f64, longitude: f64 },
    DaysSummarized { days: usize, away: usize },
    RunsDetected { runs: usize },
    RunScored {
        current: usize,
        total: usize,
        start: NaiveDate,
        end: NaiveDate,
        accepted: bool,
    },
    Completed { drafts: usize },
}

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub home: Home,
    pub days: BTreeMap<NaiveDate, DaySummary>,
    pub runs: Vec<Vec<NaiveDate>>,
    pub drafts: Vec<ClusterDraft>,
}

pub struct Pipeline {
    config: Config,
    monitor: Arc<dyn MonitoringSink>,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self::with_monitor(config, Arc::new(TracingMonitor))
    }

    pub fn with_monitor(config: Config, monitor: Arc<dyn MonitoringSink>) -> Self {
        Self { config, monitor }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run(
        &self,
        media: &[Media],
        progress_tx: Option<Sender<PipelineUpdate>>,
    ) -> Result<PipelineResult, PipelineError> {
        let progress = progress_tx.map(Mutex::new);
        let send = |update: PipelineUpdate| {
            if let Some(tx) = &progress {
                if let Ok(tx) = tx.lock() {
                    let _ = tx.send(update);
                }
            }
        };

        send(PipelineUpdate::Started { media: media.len() });

        let home = HomeLocator::new(self.config.home.clone())
            .determine_home(media)
            .ok_or(PipelineError::NoHome { media: media.len() })?;
        send(PipelineUpdate::HomeResolved {
            latitude: home.latitude,
            longitude: home.longitude,
        });

        let days = build_day_summaries(media, &home, &self.config.days);
        send(PipelineUpdate::DaysSummarized {
            days: days.len(),
            away: days.values().filter(|d| d.is_away).count(),
        });

        let runs = detect_vacation_runs(&days, &self.config.vacation);
        send(PipelineUpdate::RunsDetected { runs: runs.len() });

        let provider = SelectionPolicyProvider::new(&self.config.selection);
        let features = FeatureAvailability {
            face_detection: self.config.features.face_detection,
        };
        let calculator = VacationScoreCalculator::new(
            &self.config.vacation,
            &provider,
            features,
            self.monitor.as_ref(),
        );

        let total = runs.len();
        let done = AtomicUsize::new(0);
        let drafts: Vec<ClusterDraft> = runs
            .par_iter()
            .filter(|run| !run.is_empty())
            .filter_map(|run| {
                let context = DayContext::from_run(run, &days);
                let draft = calculator.build_draft(run, &days, &home, &context);

                send(PipelineUpdate::RunScored {
                    current: done.fetch_add(1, Ordering::SeqCst) + 1,
                    total,
                    start: run[0],
                    end: run[run.len() - 1],
                    accepted: draft.is_some(),
                });
                draft
            })
            .collect();

        info!(
            media = media.len(),
            days = days.len(),
            runs = runs.len(),
            drafts = drafts.len(),
            "Pipeline finished"
        );
        send(PipelineUpdate::Completed {
            drafts: drafts.len(),
        });

        Ok(PipelineResult {
            home,
            days,
            runs,
            drafts,
        })
    }
}
