//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Hardware acceleration mode for the transcode delegate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HwAccel {
    /// Software encode (libx264)
    #[default]
    None,
    /// NVIDIA hardware encode (h264_nvenc)
    Cuda,
}

impl std::fmt::Display for HwAccel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HwAccel::None => write!(f, "none"),
            HwAccel::Cuda => write!(f, "cuda"),
        }
    }
}

/// Output library locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PathsConfig {
    /// Folder receiving processed movies (one sub-folder per title)
    #[serde(default)]
    pub movies_folder: PathBuf,
    /// Folder receiving processed series (one sub-folder per series)
    #[serde(default)]
    pub series_folder: PathBuf,
    /// Folder receiving archived source recordings; when absent, sources
    /// are never archived
    #[serde(default)]
    pub backup_folder: Option<PathBuf>,
}

/// Folder-runner related configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessorConfig {
    /// Worker count for directory processing (0 = auto-detect from cores)
    #[serde(default)]
    pub nb_worker: u32,
    /// Extension of pending edit decision lists
    #[serde(default = "default_edl_ext")]
    pub edl_ext: String,
}

fn default_edl_ext() -> String {
    ".yml".to_string()
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            nb_worker: 0,
            edl_ext: default_edl_ext(),
        }
    }
}

/// Transcode-related configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscodeConfig {
    /// Hardware acceleration mode (default: software encode)
    #[serde(default)]
    pub hwaccel: HwAccel,
    /// Tolerance in seconds when comparing an output duration against the
    /// expected total segment duration (already-done check and
    /// post-transcode validation)
    #[serde(default = "default_duration_tolerance_secs")]
    pub duration_tolerance_secs: f64,
}

fn default_duration_tolerance_secs() -> f64 {
    1.0
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            hwaccel: HwAccel::default(),
            duration_tolerance_secs: default_duration_tolerance_secs(),
        }
    }
}

/// Segment detection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentDetectionConfig {
    /// Maximum gap in seconds between two detector hits merged into one segment
    #[serde(default = "default_min_gap")]
    pub min_gap: f64,
    /// Minimum duration in seconds below which a detected segment is
    /// considered noise by frame-accurate detectors
    #[serde(default = "default_min_duration")]
    pub min_duration: f64,
    /// Fraction of probe windows that must carry signal for a detector to
    /// commit to a full run
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    /// Number of short windows sampled across the file by the cheap pre-check
    #[serde(default = "default_probe_window_count")]
    pub probe_window_count: u32,
    /// Length in seconds of each probe window
    #[serde(default = "default_probe_window_secs")]
    pub probe_window_secs: f64,
    /// Directory holding per-channel logo templates; when absent the
    /// template-match detector is unavailable
    #[serde(default)]
    pub templates_path: Option<PathBuf>,
}

fn default_min_gap() -> f64 {
    0.1
}

fn default_min_duration() -> f64 {
    120.0
}

fn default_match_threshold() -> f64 {
    0.8
}

fn default_probe_window_count() -> u32 {
    5
}

fn default_probe_window_secs() -> f64 {
    10.0
}

impl Default for SegmentDetectionConfig {
    fn default() -> Self {
        Self {
            min_gap: default_min_gap(),
            min_duration: default_min_duration(),
            match_threshold: default_match_threshold(),
            probe_window_count: default_probe_window_count(),
            probe_window_secs: default_probe_window_secs(),
            templates_path: None,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
    #[serde(default)]
    pub transcode: TranscodeConfig,
    #[serde(default)]
    pub segment_detection: SegmentDetectionConfig,
}

impl Settings {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        Ok(settings)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - PIPELINE_NB_WORKER -> processor.nb_worker
    /// - PIPELINE_BACKUP_FOLDER -> paths.backup_folder
    /// - PIPELINE_HWACCEL -> transcode.hwaccel
    /// - PIPELINE_DURATION_TOLERANCE -> transcode.duration_tolerance_secs
    pub fn apply_env_overrides(&mut self) {
        // PIPELINE_NB_WORKER
        if let Ok(val) = env::var("PIPELINE_NB_WORKER") {
            if let Ok(workers) = val.parse::<u32>() {
                self.processor.nb_worker = workers;
            }
        }

        // PIPELINE_BACKUP_FOLDER
        if let Ok(val) = env::var("PIPELINE_BACKUP_FOLDER") {
            if val.is_empty() {
                self.paths.backup_folder = None;
            } else {
                self.paths.backup_folder = Some(PathBuf::from(val));
            }
        }

        // PIPELINE_HWACCEL
        if let Ok(val) = env::var("PIPELINE_HWACCEL") {
            match val.to_lowercase().as_str() {
                "none" => self.transcode.hwaccel = HwAccel::None,
                "cuda" => self.transcode.hwaccel = HwAccel::Cuda,
                _ => {} // Invalid value, keep existing
            }
        }

        // PIPELINE_DURATION_TOLERANCE
        if let Ok(val) = env::var("PIPELINE_DURATION_TOLERANCE") {
            if let Ok(tolerance) = val.parse::<f64>() {
                self.transcode.duration_tolerance_secs = tolerance;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut settings = Self::load_from_file(path)?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Effective worker count: the configured value, or the number of
    /// logical cores when left at 0
    pub fn effective_nb_worker(&self) -> usize {
        if self.processor.nb_worker > 0 {
            self.processor.nb_worker as usize
        } else {
            num_cpus::get()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't interfere with each other
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to clear all config-related env vars
    fn clear_env_vars() {
        env::remove_var("PIPELINE_NB_WORKER");
        env::remove_var("PIPELINE_BACKUP_FOLDER");
        env::remove_var("PIPELINE_HWACCEL");
        env::remove_var("PIPELINE_DURATION_TOLERANCE");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_parses_all_sections(
            nb_worker in 0u32..64,
            min_gap in 0.0f64..10.0,
            min_duration in 0.0f64..600.0,
            tolerance in 0.0f64..10.0,
            cuda in proptest::bool::ANY,
        ) {
            let toml_str = format!(
                r#"
[paths]
movies_folder = "/library/movies"
series_folder = "/library/series"
backup_folder = "/library/backup"

[processor]
nb_worker = {}

[transcode]
hwaccel = "{}"
duration_tolerance_secs = {}

[segment_detection]
min_gap = {}
min_duration = {}
"#,
                nb_worker,
                if cuda { "cuda" } else { "none" },
                tolerance,
                min_gap,
                min_duration,
            );

            let settings = Settings::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert_eq!(settings.paths.movies_folder, PathBuf::from("/library/movies"));
            prop_assert_eq!(settings.paths.series_folder, PathBuf::from("/library/series"));
            prop_assert_eq!(settings.paths.backup_folder, Some(PathBuf::from("/library/backup")));
            prop_assert_eq!(settings.processor.nb_worker, nb_worker);
            prop_assert_eq!(
                settings.transcode.hwaccel,
                if cuda { HwAccel::Cuda } else { HwAccel::None }
            );
            prop_assert!((settings.transcode.duration_tolerance_secs - tolerance).abs() < 1e-9);
            prop_assert!((settings.segment_detection.min_gap - min_gap).abs() < 1e-9);
            prop_assert!((settings.segment_detection.min_duration - min_duration).abs() < 1e-9);
        }

        #[test]
        fn prop_env_overrides_nb_worker(
            initial_workers in 0u32..16,
            override_workers in 1u32..64,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!(
                r#"
[processor]
nb_worker = {}
"#,
                initial_workers
            );

            let mut settings = Settings::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("PIPELINE_NB_WORKER", override_workers.to_string());
            settings.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(settings.processor.nb_worker, override_workers);
        }

        #[test]
        fn prop_env_overrides_duration_tolerance(
            initial_tolerance in 0.0f64..5.0,
            override_tolerance in 0.0f64..5.0,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!(
                r#"
[transcode]
duration_tolerance_secs = {}
"#,
                initial_tolerance
            );

            let mut settings = Settings::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("PIPELINE_DURATION_TOLERANCE", override_tolerance.to_string());
            settings.apply_env_overrides();
            clear_env_vars();

            prop_assert!((settings.transcode.duration_tolerance_secs - override_tolerance).abs() < 1e-9);
        }
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let settings = Settings::parse_toml("").expect("Empty TOML should parse");

        assert_eq!(settings.processor.nb_worker, 0);
        assert_eq!(settings.processor.edl_ext, ".yml");
        assert_eq!(settings.paths.backup_folder, None);
        assert_eq!(settings.transcode.hwaccel, HwAccel::None);
        assert!((settings.transcode.duration_tolerance_secs - 1.0).abs() < 1e-9);
        assert!((settings.segment_detection.min_gap - 0.1).abs() < 1e-9);
        assert!((settings.segment_detection.min_duration - 120.0).abs() < 1e-9);
        assert!((settings.segment_detection.match_threshold - 0.8).abs() < 1e-9);
        assert_eq!(settings.segment_detection.probe_window_count, 5);
        assert_eq!(settings.segment_detection.templates_path, None);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let toml_str = r#"
[paths]
movies_folder = "/pvr/movies"
series_folder = "/pvr/series"
"#;
        let settings = Settings::parse_toml(toml_str).expect("Partial TOML should parse");

        assert_eq!(settings.paths.movies_folder, PathBuf::from("/pvr/movies"));
        assert_eq!(settings.paths.backup_folder, None); // default
        assert_eq!(settings.processor.edl_ext, ".yml"); // default
        assert_eq!(settings.transcode.hwaccel, HwAccel::None); // default
    }

    #[test]
    fn test_env_overrides_hwaccel() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut settings = Settings::default();
        env::set_var("PIPELINE_HWACCEL", "cuda");
        settings.apply_env_overrides();
        clear_env_vars();

        assert_eq!(settings.transcode.hwaccel, HwAccel::Cuda);
    }

    #[test]
    fn test_env_overrides_backup_folder() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut settings = Settings::default();
        env::set_var("PIPELINE_BACKUP_FOLDER", "/mnt/archive");
        settings.apply_env_overrides();
        clear_env_vars();

        assert_eq!(
            settings.paths.backup_folder,
            Some(PathBuf::from("/mnt/archive"))
        );
    }

    #[test]
    fn test_effective_nb_worker_explicit() {
        let mut settings = Settings::default();
        settings.processor.nb_worker = 3;
        assert_eq!(settings.effective_nb_worker(), 3);
    }

    #[test]
    fn test_effective_nb_worker_auto() {
        let settings = Settings::default();
        assert!(settings.effective_nb_worker() >= 1);
    }
}
