// DSP utilities - Audio hygiene for the real-time callback

/// Flush denormals to zero
///
/// Denormal floats (very close to 0) can slow some CPUs down badly.
/// Threshold: 1e-15, far below 32-bit float noise.
#[inline]
pub fn flush_denormals_to_zero(x: f32) -> f32 {
    if x.abs() < 1e-15 { 0.0 } else { x }
}

/// Soft clipping with tanh
///
/// Keeps the summed tracks inside [-1, 1] without hard edges.
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    x.tanh()
}

/// Exponential decay envelope, restarted on every hit
#[derive(Debug, Clone, Copy)]
pub struct DecayEnvelope {
    level: f32,
    coefficient: f32,
}

impl DecayEnvelope {
    /// Level below which the envelope counts as finished (-80 dB)
    const SILENCE: f32 = 1e-4;

    /// `time_constant_ms` is the time to fall to ~37% of the peak
    pub fn new(time_constant_ms: f32, sample_rate: f32) -> Self {
        let samples = (time_constant_ms * 0.001 * sample_rate).max(1.0);
        Self {
            level: 0.0,
            coefficient: (-1.0 / samples).exp(),
        }
    }

    /// Restart at full level
    pub fn trigger(&mut self) {
        self.level = 1.0;
    }

    /// Current level, then decay by one sample
    #[inline]
    pub fn next_level(&mut self) -> f32 {
        let out = self.level;
        self.level = flush_denormals_to_zero(self.level * self.coefficient);
        out
    }

    pub fn is_silent(&self) -> bool {
        self.level < Self::SILENCE
    }
}
