//! Vacation detection and curation over an enriched photo library.
//!
//! Media are grouped into local days, consecutive away days become runs, and
//! every qualifying run is scored into a [`vacation::ClusterDraft`] with a
//! curated member selection.

pub mod config;
pub mod days;
pub mod error;
pub mod export;
pub mod geo;
pub mod home;
pub mod logging;
pub mod media;
pub mod monitor;
pub mod pipeline;
pub mod selection;
pub mod vacation;

pub use config::Config;
pub use error::{PipelineError, PolicyError};
pub use media::{Media, MediaId, PersonId};
pub use pipeline::{Pipeline, PipelineResult, PipelineUpdate};
pub use vacation::ClusterDraft;
