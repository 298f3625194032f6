//! Configuration for the fishing controller and its collaborators
//!
//! Settings are stored as JSON under `config/autofish.json` in the data
//! directory. A missing or partial file falls back to the built-in
//! defaults, and the defaults are written back on first run so the knobs
//! are discoverable.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::path::get_data_dir;

/// State classifier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Folder (relative to the data dir) holding per-label template images
    pub templates_dir: String,
    /// Minimum classifier confidence in [0, 1]
    pub confidence_threshold: f32,
    /// Minimum gap between classifier polls, seconds
    pub detection_interval: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            templates_dir: "templates".to_string(),
            confidence_threshold: 0.5,
            detection_interval: 0.1,
        }
    }
}

/// Text recognition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract language string
    pub language: String,
    /// Minimum normalized text confidence in [0, 1]
    pub confidence_threshold: f32,
    /// Minimum gap between text polls, seconds
    pub detection_interval: f64,
    /// Crop region for the overlay text, as fractions of the frame
    pub crop_x: f32,
    pub crop_y: f32,
    pub crop_w: f32,
    pub crop_h: f32,
    /// Phrases that mean "pull right"
    pub pull_right_texts: Vec<String>,
    /// Phrases that mean "pull left"
    pub pull_left_texts: Vec<String>,
    /// Phrases that mean "catch succeeded"
    pub success_texts: Vec<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "chi_sim+eng".to_string(),
            confidence_threshold: 0.60,
            detection_interval: 0.2,
            crop_x: 0.30,
            crop_y: 0.40,
            crop_w: 0.40,
            crop_h: 0.20,
            pull_right_texts: vec!["向右拉".into(), "向右".into(), "右拉".into()],
            pull_left_texts: vec!["向左拉".into(), "向左".into(), "左拉".into()],
            success_texts: vec!["钓鱼成功".into(), "成功".into()],
        }
    }
}

/// Timing settings, seconds unless noted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// WAITING_INITIAL / WAITING_HOOK give up after this long
    pub initial_timeout: f64,
    /// FISH_HOOKED with no accepted label for this long triggers a retry cast
    pub state1_timeout: f64,
    /// Fast-click jitter bounds
    pub click_delay_min: f64,
    pub click_delay_max: f64,
    /// Pause length when stamina crosses the halfway mark
    pub state3_pause_time: f64,
    /// Wait before pressing the confirm key on success
    pub success_wait_time: f64,
    /// How long the primary button is held to cast the rod
    pub cast_hold_time: f64,
    /// How long a direction key is held
    pub key_press_time: f64,
    /// Settle pauses around the remedial retry cast
    pub retry_settle_before: f64,
    pub retry_settle_after: f64,
    /// Settle after a normal cast before detection resumes
    pub cast_settle_time: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            initial_timeout: 180.0,
            state1_timeout: 3.0,
            click_delay_min: 0.054,
            click_delay_max: 0.127,
            state3_pause_time: 1.0,
            success_wait_time: 1.5,
            cast_hold_time: 2.0,
            key_press_time: 1.0,
            retry_settle_before: 0.5,
            retry_settle_after: 1.0,
            cast_settle_time: 1.0,
        }
    }
}

/// Key bindings used by the actuator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    pub pull_left_key: String,
    pub pull_right_key: String,
    pub confirm_key: String,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            pull_left_key: "A".to_string(),
            pull_right_key: "D".to_string(),
            confirm_key: "F".to_string(),
        }
    }
}

/// Global hotkey chords
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    pub start_fishing: String,
    pub stop_fishing: String,
    pub emergency_stop: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            start_fishing: "ctrl+alt+s".to_string(),
            stop_fishing: "ctrl+alt+x".to_string(),
            emergency_stop: "ctrl+alt+q".to_string(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AutofishConfig {
    pub model: ModelConfig,
    pub ocr: OcrConfig,
    pub timing: TimingConfig,
    pub keys: KeysConfig,
    pub hotkey: HotkeyConfig,
}

/// Configuration file path
fn get_config_path() -> PathBuf {
    get_data_dir().join("config").join("autofish.json")
}

impl AutofishConfig {
    /// Load configuration from disk, falling back to defaults.
    /// Writes the defaults back when no file exists yet.
    pub fn load() -> Self {
        let config_path = get_config_path();

        if let Ok(content) = fs::read_to_string(&config_path) {
            match serde_json::from_str::<AutofishConfig>(&content) {
                Ok(config) => {
                    tracing::info!("[CONFIG] Loaded {:?}", config_path);
                    return config;
                }
                Err(e) => {
                    tracing::warn!("[CONFIG] Failed to parse {:?}: {}", config_path, e);
                }
            }
        }

        let config = Self::default();
        config.save();
        config
    }

    /// Save configuration to disk (best effort)
    pub fn save(&self) {
        let config_path = get_config_path();

        if let Some(parent) = config_path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        match serde_json::to_string_pretty(self) {
            Ok(content) => {
                if let Err(e) = fs::write(&config_path, content) {
                    tracing::warn!("[CONFIG] Failed to write {:?}: {}", config_path, e);
                }
            }
            Err(e) => tracing::warn!("[CONFIG] Failed to serialize config: {}", e),
        }
    }

    /// Absolute path of the template image folder
    pub fn templates_path(&self) -> PathBuf {
        get_data_dir().join(&self.model.templates_dir)
    }
}

impl TimingConfig {
    pub fn initial_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.initial_timeout)
    }

    pub fn state1_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.state1_timeout)
    }

    pub fn state3_pause(&self) -> Duration {
        Duration::from_secs_f64(self.state3_pause_time)
    }

    pub fn success_wait(&self) -> Duration {
        Duration::from_secs_f64(self.success_wait_time)
    }

    pub fn cast_hold(&self) -> Duration {
        Duration::from_secs_f64(self.cast_hold_time)
    }

    pub fn key_press(&self) -> Duration {
        Duration::from_secs_f64(self.key_press_time)
    }

    pub fn retry_settle_before(&self) -> Duration {
        Duration::from_secs_f64(self.retry_settle_before)
    }

    pub fn retry_settle_after(&self) -> Duration {
        Duration::from_secs_f64(self.retry_settle_after)
    }

    pub fn cast_settle(&self) -> Duration {
        Duration::from_secs_f64(self.cast_settle_time)
    }
}
