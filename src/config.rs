use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::home::HomeCenter;
use crate::media::PersonId;
use crate::selection::SelectionProfile;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub home: HomeConfig,

    #[serde(default)]
    pub days: DayConfig,

    #[serde(default)]
    pub vacation: VacationConfig,

    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub features: FeatureConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Explicit home location. When latitude/longitude are unset the home is
/// inferred from the library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeConfig {
    #[serde(default)]
    pub latitude: Option<f64>,

    #[serde(default)]
    pub longitude: Option<f64>,

    #[serde(default = "default_home_radius_km")]
    pub radius_km: f64,

    /// ISO country code, e.g. `de`.
    #[serde(default)]
    pub country: Option<String>,

    #[serde(default)]
    pub timezone_offset_minutes: Option<i32>,

    /// Time-bounded home centers (moves, second homes).
    #[serde(default)]
    pub centers: Vec<HomeCenter>,

    /// Minimum distinct days a location needs before it is inferred as home.
    #[serde(default = "default_min_home_days")]
    pub min_home_days: usize,

    /// Local hours `[night_start_hour, 24) ∪ [0, night_end_hour)` count as
    /// night when inferring home.
    #[serde(default = "default_night_start_hour")]
    pub night_start_hour: u32,

    #[serde(default = "default_night_end_hour")]
    pub night_end_hour: u32,
}

fn default_home_radius_km() -> f64 {
    15.0
}

fn default_min_home_days() -> usize {
    3
}

fn default_night_start_hour() -> u32 {
    20
}

fn default_night_end_hour() -> u32 {
    7
}

impl Default for HomeConfig {
    fn default() -> Self {
        Self {
            latitude: None,
            longitude: None,
            radius_km: default_home_radius_km(),
            country: None,
            timezone_offset_minutes: None,
            centers: Vec::new(),
            min_home_days: default_min_home_days(),
            night_start_hour: default_night_start_hour(),
            night_end_hour: default_night_end_hour(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaypointConfig {
    #[serde(default = "default_staypoint_radius_km")]
    pub radius_km: f64,

    #[serde(default = "default_min_dwell_minutes")]
    pub min_dwell_minutes: i64,

    #[serde(default = "default_fallback_radius_km")]
    pub fallback_radius_km: f64,

    #[serde(default = "default_fallback_min_samples")]
    pub fallback_min_samples: usize,

    /// Never below `min_dwell_minutes`.
    #[serde(default = "default_fallback_min_dwell_minutes")]
    pub fallback_min_dwell_minutes: i64,
}

fn default_staypoint_radius_km() -> f64 {
    0.2
}

fn default_min_dwell_minutes() -> i64 {
    20
}

fn default_fallback_radius_km() -> f64 {
    0.35
}

fn default_fallback_min_samples() -> usize {
    3
}

fn default_fallback_min_dwell_minutes() -> i64 {
    15
}

impl Default for StaypointConfig {
    fn default() -> Self {
        Self {
            radius_km: default_staypoint_radius_km(),
            min_dwell_minutes: default_min_dwell_minutes(),
            fallback_radius_km: default_fallback_radius_km(),
            fallback_min_samples: default_fallback_min_samples(),
            fallback_min_dwell_minutes: default_fallback_min_dwell_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseLocationConfig {
    /// Local hour from which a fix counts as "evening/night".
    #[serde(default = "default_evening_hour")]
    pub evening_hour: u32,

    /// Local hour before which a fix counts as "early morning".
    #[serde(default = "default_morning_hour")]
    pub morning_hour: u32,

    /// Sleep-proxy pairs further apart than this are treated as travel.
    #[serde(default = "default_max_pair_distance_km")]
    pub max_pair_distance_km: f64,
}

fn default_evening_hour() -> u32 {
    20
}

fn default_morning_hour() -> u32 {
    10
}

fn default_max_pair_distance_km() -> f64 {
    75.0
}

impl Default for BaseLocationConfig {
    fn default() -> Self {
        Self {
            evening_hour: default_evening_hour(),
            morning_hour: default_morning_hour(),
            max_pair_distance_km: default_max_pair_distance_km(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayConfig {
    #[serde(default)]
    pub staypoint: StaypointConfig,

    #[serde(default)]
    pub base_location: BaseLocationConfig,

    /// GPS segments shorter than this are ignored for speed statistics.
    #[serde(default = "default_min_segment_seconds")]
    pub min_segment_seconds: i64,

    #[serde(default = "default_transit_speed_kmh")]
    pub transit_speed_kmh: f64,

    #[serde(default = "default_high_speed_kmh")]
    pub high_speed_kmh: f64,

    #[serde(default = "default_transit_ratio_threshold")]
    pub transit_ratio_threshold: f64,

    #[serde(default = "default_dominant_staypoints")]
    pub dominant_staypoints: usize,

    #[serde(default = "default_core_min_members")]
    pub core_min_members: usize,

    #[serde(default = "default_core_tourism_ratio")]
    pub core_tourism_ratio: f64,

    /// Longest photo-free stretch bridged with synthetic days.
    #[serde(default = "default_max_synthetic_gap_days")]
    pub max_synthetic_gap_days: i64,
}

fn default_min_segment_seconds() -> i64 {
    60
}

fn default_transit_speed_kmh() -> f64 {
    60.0
}

fn default_high_speed_kmh() -> f64 {
    120.0
}

fn default_transit_ratio_threshold() -> f64 {
    0.4
}

fn default_dominant_staypoints() -> usize {
    3
}

fn default_core_min_members() -> usize {
    4
}

fn default_core_tourism_ratio() -> f64 {
    0.2
}

fn default_max_synthetic_gap_days() -> i64 {
    2
}

impl Default for DayConfig {
    fn default() -> Self {
        Self {
            staypoint: StaypointConfig::default(),
            base_location: BaseLocationConfig::default(),
            min_segment_seconds: default_min_segment_seconds(),
            transit_speed_kmh: default_transit_speed_kmh(),
            high_speed_kmh: default_high_speed_kmh(),
            transit_ratio_threshold: default_transit_ratio_threshold(),
            dominant_staypoints: default_dominant_staypoints(),
            core_min_members: default_core_min_members(),
            core_tourism_ratio: default_core_tourism_ratio(),
            max_synthetic_gap_days: default_max_synthetic_gap_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VacationConfig {
    /// Algorithm name written into every draft.
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Selection profile used when none matches the run classification.
    #[serde(default = "default_profile")]
    pub profile: String,

    #[serde(default = "default_min_away_days")]
    pub min_away_days: usize,

    #[serde(default = "default_min_members")]
    pub min_members: usize,

    /// A day with at most this many members may be bridged as transit.
    #[serde(default = "default_lean_max_members")]
    pub lean_max_members: usize,

    #[serde(default = "default_transit_min_distance_km")]
    pub transit_min_distance_km: f64,

    /// Transit days admitted on each side of a run.
    #[serde(default = "default_max_transit_days")]
    pub max_transit_days: usize,

    #[serde(default = "default_waypoint_merge_km")]
    pub waypoint_merge_km: f64,

    /// Away days needed for a run to be classified as a vacation.
    #[serde(default = "default_vacation_min_days")]
    pub vacation_min_days: usize,
}

fn default_algorithm() -> String {
    "vacation".to_string()
}

fn default_profile() -> String {
    "vacation".to_string()
}

fn default_min_away_days() -> usize {
    2
}

fn default_min_members() -> usize {
    8
}

fn default_lean_max_members() -> usize {
    8
}

fn default_transit_min_distance_km() -> f64 {
    80.0
}

fn default_max_transit_days() -> usize {
    1
}

fn default_waypoint_merge_km() -> f64 {
    2.0
}

fn default_vacation_min_days() -> usize {
    5
}

impl Default for VacationConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            profile: default_profile(),
            min_away_days: default_min_away_days(),
            min_members: default_min_members(),
            lean_max_members: default_lean_max_members(),
            transit_min_distance_km: default_transit_min_distance_km(),
            max_transit_days: default_max_transit_days(),
            waypoint_merge_km: default_waypoint_merge_km(),
            vacation_min_days: default_vacation_min_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// People whose share may reach the important-person ceiling.
    #[serde(default)]
    pub important_person_ids: Vec<PersonId>,

    #[serde(default = "default_profiles")]
    pub profiles: BTreeMap<String, SelectionProfile>,
}

fn default_profiles() -> BTreeMap<String, SelectionProfile> {
    let mut profiles = BTreeMap::new();
    profiles.insert("default".to_string(), SelectionProfile::default());
    profiles.insert(
        "vacation".to_string(),
        SelectionProfile {
            target_total: 60,
            minimum_total: 12,
            per_day_target: 8.0,
            max_per_day: 12,
            ..SelectionProfile::default()
        },
    );
    profiles.insert(
        "short_trip".to_string(),
        SelectionProfile {
            target_total: 30,
            minimum_total: 6,
            per_day_target: 10.0,
            max_per_day: 14,
            ..SelectionProfile::default()
        },
    );
    profiles.insert(
        "weekend_getaway".to_string(),
        SelectionProfile {
            target_total: 24,
            minimum_total: 6,
            per_day_target: 10.0,
            max_per_day: 12,
            min_spacing_seconds: 600,
            ..SelectionProfile::default()
        },
    );
    profiles
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            important_person_ids: Vec::new(),
            profiles: default_profiles(),
        }
    }
}

/// Availability of upstream enrichment features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "default_face_detection")]
    pub face_detection: bool,
}

fn default_face_detection() -> bool {
    true
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            face_detection: default_face_detection(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level for the engine's own modules; dependencies stay at `warn`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Extra per-module directives, e.g. `memories::selection=trace`.
    #[serde(default)]
    pub directives: Vec<String>,

    /// Rolling log file directory when journald is not used.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default = "default_journald")]
    pub journald: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_journald() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directives: Vec::new(),
            log_dir: None,
            journald: default_journald(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Create default config
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("memories")
    }

    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("MEMORIES_CONFIG") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }
}
