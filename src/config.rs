// Configuration - Sequencer settings loaded from a RON file

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::synth::VoiceKind;
use crate::sequencer::timeline::{Tempo, TimeSignature};

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("RON error: {0}")]
    Serialize(#[from] ron::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// One pattern row and the voice that sounds it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackConfig {
    pub name: String,
    pub voice: VoiceKind,
}

impl TrackConfig {
    pub fn new(name: impl Into<String>, voice: VoiceKind) -> Self {
        Self {
            name: name.into(),
            voice,
        }
    }
}

/// Sequencer settings
///
/// Every field has a default, so a config file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Pattern length
    pub steps: usize,
    /// Ticks per beat (4 = sixteenth notes)
    pub steps_per_beat: u32,
    pub time_signature: TimeSignature,
    pub tempo_bpm: f64,
    /// Glide applied to live tempo changes
    pub tempo_ramp_ms: f64,
    /// Default capture length
    pub capture_bars: u32,
    /// Nominal output rate; an open device reports its own
    pub sample_rate: u32,
    pub block_size: usize,
    pub cursor_queue_capacity: usize,
    pub fault_queue_capacity: usize,
    /// Capacity of the output tap ring, in seconds of audio
    pub capture_buffer_seconds: f64,
    /// Where finished captures are written (current directory if unset)
    pub output_dir: Option<PathBuf>,
    pub tracks: Vec<TrackConfig>,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            steps: 16,
            steps_per_beat: 4,
            time_signature: TimeSignature::four_four(),
            tempo_bpm: 120.0,
            tempo_ramp_ms: 50.0,
            capture_bars: 8,
            sample_rate: 48000,
            block_size: 512,
            cursor_queue_capacity: 256,
            fault_queue_capacity: 64,
            capture_buffer_seconds: 4.0,
            output_dir: None,
            tracks: vec![
                TrackConfig::new("Kick", VoiceKind::Kick),
                TrackConfig::new("Hat", VoiceKind::Hat),
            ],
        }
    }
}

impl SequencerConfig {
    /// Default config location (`<config dir>/stepgrid/config.ron`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stepgrid").join("config.ron"))
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ron_str(&text)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, else the default location if it exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                log::debug!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(path, self.to_ron_string()?).map_err(io_error)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.steps == 0 {
            return invalid("steps must be > 0".into());
        }
        if self.steps_per_beat == 0 {
            return invalid("steps_per_beat must be > 0".into());
        }
        if self.time_signature.numerator == 0 || !self.time_signature.denominator.is_power_of_two()
        {
            return invalid(format!("bad time signature {}", self.time_signature));
        }
        if let Err(err) = Tempo::new(self.tempo_bpm) {
            return invalid(err.to_string());
        }
        if !self.tempo_ramp_ms.is_finite() || self.tempo_ramp_ms < 0.0 {
            return invalid(format!("tempo_ramp_ms must be >= 0, got {}", self.tempo_ramp_ms));
        }
        if self.capture_bars == 0 {
            return invalid("capture_bars must be > 0".into());
        }
        if self.sample_rate == 0 || self.block_size == 0 {
            return invalid("sample_rate and block_size must be > 0".into());
        }
        if self.cursor_queue_capacity == 0 || self.fault_queue_capacity == 0 {
            return invalid("queue capacities must be > 0".into());
        }
        if !(self.capture_buffer_seconds.is_finite() && self.capture_buffer_seconds > 0.0) {
            return invalid("capture_buffer_seconds must be > 0".into());
        }
        if self.tracks.is_empty() {
            return invalid("at least one track is required".into());
        }
        Ok(())
    }

    /// Validated initial tempo
    pub fn tempo(&self) -> Tempo {
        Tempo::new(self.tempo_bpm).unwrap_or_default()
    }

    /// Row scored as the hat line by the impact readout
    pub fn hat_track(&self) -> usize {
        self.tracks
            .iter()
            .position(|track| track.voice == VoiceKind::Hat)
            .unwrap_or(self.tracks.len())
    }
}
