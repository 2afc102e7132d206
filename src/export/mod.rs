use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::vacation::ClusterDraft;

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Json => "JSON",
            ExportFormat::Csv => "CSV",
        }
    }

    /// Guess the format from a file extension, defaulting to JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => ExportFormat::Csv,
            _ => ExportFormat::Json,
        }
    }
}

/// One row per draft in the CSV summary
#[derive(Debug, Serialize)]
pub struct DraftSummaryRow {
    pub algorithm: String,
    pub classification: String,
    pub start_date: String,
    pub end_date: String,
    pub score: f64,
    pub away_days: usize,
    pub members: usize,
    pub selected: usize,
    pub countries: String,
    pub max_distance_km: f64,
    pub centroid_latitude: Option<f64>,
    pub centroid_longitude: Option<f64>,
    pub relaxations: usize,
    pub selected_ids: String,
}

impl From<&ClusterDraft> for DraftSummaryRow {
    fn from(draft: &ClusterDraft) -> Self {
        let meta = &draft.params.meta;
        Self {
            algorithm: draft.algorithm.clone(),
            classification: meta.classification.clone(),
            start_date: meta.start_date.to_string(),
            end_date: meta.end_date.to_string(),
            score: draft.params.score,
            away_days: meta.metrics.away_days,
            members: draft.members.len(),
            selected: draft.selected_ids().len(),
            countries: meta
                .metrics
                .countries
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(";"),
            max_distance_km: (meta.metrics.max_distance_km * 10.0).round() / 10.0,
            centroid_latitude: draft.centroid.map(|c| c.latitude),
            centroid_longitude: draft.centroid.map(|c| c.longitude),
            relaxations: meta.run_metrics.relaxations_applied,
            selected_ids: draft
                .selected_ids()
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(";"),
        }
    }
}

/// Export drafts to a file
pub fn export_drafts(drafts: &[ClusterDraft], output_path: &Path, format: ExportFormat) -> Result<usize> {
    match format {
        ExportFormat::Json => export_json(drafts, output_path),
        ExportFormat::Csv => export_csv(drafts, output_path),
    }
    .with_context(|| {
        format!(
            "Failed to export {} drafts to {}",
            format.name(),
            output_path.display()
        )
    })?;

    Ok(drafts.len())
}

fn export_json(drafts: &[ClusterDraft], output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(drafts)?;
    let mut file = File::create(output_path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

fn export_csv(drafts: &[ClusterDraft], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;
    for draft in drafts {
        wtr.serialize(DraftSummaryRow::from(draft))?;
    }
    wtr.flush()?;
    Ok(())
}
