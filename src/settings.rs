use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Returns the path to the config file: `~/.config/voice-mixer/audio.json`
fn config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("voice-mixer");
    path.push("audio.json");
    path
}

/// Engine configuration.
///
/// Read as JSON from the platform config directory. Fields use
/// `#[serde(default)]` so a partial file only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // Channels
    pub max_sources: usize,
    pub fade_out_ms: u64,

    // Per-channel attenuation
    pub max_distance: f32,
    pub rolloff_factor: f32,
    pub reference_distance: f32,

    // Listener
    pub doppler_factor: f32,
    pub speed_of_sound: f32,

    // Mixer
    pub volume: f32,
    pub diagnostic_queue: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_sources: 256,
            fade_out_ms: 100,

            max_distance: 5000.0,
            rolloff_factor: 1.0,
            reference_distance: 500.0,

            doppler_factor: 0.1,
            speed_of_sound: 1000.0,

            volume: 1.0,
            diagnostic_queue: 64,
        }
    }
}

impl EngineConfig {
    /// Load the config from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    /// Load the config from `path`, falling back to defaults on any error.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    log::info!("Loaded audio config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse audio config ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::info!("No audio config found ({}), using defaults", e);
                Self::default()
            }
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
