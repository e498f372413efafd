// Timeline - Musical time on the audio frame clock
// Handles conversion between frames, seconds, beats, bars and step ticks

use std::fmt;

use super::error::{Result, SequencerError};

/// Slowest tempo accepted by the transport
pub const MIN_BPM: f64 = 20.0;
/// Fastest tempo accepted by the transport
pub const MAX_BPM: f64 = 999.0;

/// Position on the audio engine's own timeline, in frames
///
/// Distinct from wall-clock time: it only advances when the audio callback
/// renders, so ordering between events is exact to the sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AudioTime(u64);

impl AudioTime {
    pub const ZERO: AudioTime = AudioTime(0);

    pub fn from_frames(frames: u64) -> Self {
        Self(frames)
    }

    /// First frame at or after `seconds`
    pub fn from_seconds(seconds: f64, sample_rate: f64) -> Self {
        Self((seconds * sample_rate).ceil().max(0.0) as u64)
    }

    pub fn frames(self) -> u64 {
        self.0
    }

    pub fn seconds(self, sample_rate: f64) -> f64 {
        self.0 as f64 / sample_rate
    }

    pub fn add_frames(self, frames: u64) -> Self {
        Self(self.0.saturating_add(frames))
    }

    /// Frames elapsed since `earlier` (0 if `earlier` is later)
    pub fn frames_since(self, earlier: AudioTime) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for AudioTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Time signature (numerator/denominator)
/// Example: 4/4 time = TimeSignature { numerator: 4, denominator: 4 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,   // Beats per bar
    pub denominator: u8, // Note value (4 = quarter note, 8 = eighth note)
}

impl TimeSignature {
    /// Creates a new time signature
    pub fn new(numerator: u8, denominator: u8) -> Self {
        assert!(numerator > 0, "Time signature numerator must be > 0");
        assert!(
            denominator.is_power_of_two(),
            "Time signature denominator must be power of 2"
        );
        Self {
            numerator,
            denominator,
        }
    }

    /// Common 4/4 time signature
    pub fn four_four() -> Self {
        Self::new(4, 4)
    }

    /// Common 3/4 time signature (waltz)
    pub fn three_four() -> Self {
        Self::new(3, 4)
    }

    /// Number of beats per bar
    pub fn beats_per_bar(&self) -> f64 {
        self.numerator as f64
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Tempo in BPM (Beats Per Minute)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    /// Creates a new tempo
    /// BPM must be finite and in range [MIN_BPM, MAX_BPM]
    pub fn new(bpm: f64) -> Result<Self> {
        if bpm.is_finite() && (MIN_BPM..=MAX_BPM).contains(&bpm) {
            Ok(Self { bpm })
        } else {
            Err(SequencerError::InvalidTempo(bpm))
        }
    }

    /// Rebuild a tempo that was validated before being stored as raw bits
    pub(crate) fn from_validated(bpm: f64) -> Self {
        debug_assert!((MIN_BPM..=MAX_BPM).contains(&bpm));
        Self { bpm }
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Duration of one bar in seconds at given time signature
    pub fn bar_duration_seconds(&self, time_signature: &TimeSignature) -> f64 {
        self.beat_duration_seconds() * time_signature.beats_per_bar()
    }

    /// Duration of one step (beat / steps_per_beat) in frames
    pub fn step_duration_frames(&self, sample_rate: f64, steps_per_beat: u32) -> f64 {
        step_period_frames(self.bpm, sample_rate, steps_per_beat)
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self { bpm: 120.0 }
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Frames between two step ticks at `bpm`
#[inline]
pub(crate) fn step_period_frames(bpm: f64, sample_rate: f64, steps_per_beat: u32) -> f64 {
    sample_rate * 60.0 / (bpm * steps_per_beat as f64)
}
