// Drum voices - Minimal kick and hat tracks
// Generated on the fly, no sample files needed

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use super::dsp_utils::{DecayEnvelope, flush_denormals_to_zero};
use crate::config::TrackConfig;
use crate::sequencer::dispatcher::Track;
use crate::sequencer::error::TriggerError;
use crate::sequencer::timeline::AudioTime;

/// Sound a drum track makes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceKind {
    /// Pitch-swept sine
    Kick,
    /// Decaying high-passed noise
    Hat,
}

/// Hits waiting for their start frame
const MAX_PENDING: usize = 8;

/// A one-voice drum track
///
/// `trigger` only records the hit time; the sound starts at that exact frame
/// inside `render`. A new hit cuts the previous one off.
pub struct DrumTrack {
    name: String,
    voice: VoiceKind,
    sample_rate: f32,
    gain: f32,

    pending: [Option<AudioTime>; MAX_PENDING],
    sounding: bool,
    envelope: DecayEnvelope,
    age: u32,             // Samples since the current hit started
    phase: f32,           // Kick oscillator phase
    noise_state: u32,     // Xorshift state for the hat
    last_noise: f32,      // High-pass memory
}

impl DrumTrack {
    pub fn new(name: impl Into<String>, voice: VoiceKind, sample_rate: f32) -> Self {
        let (decay_ms, gain) = match voice {
            VoiceKind::Kick => (90.0, 0.9),
            VoiceKind::Hat => (12.0, 0.35),
        };

        Self {
            name: name.into(),
            voice,
            sample_rate,
            gain,
            pending: [None; MAX_PENDING],
            sounding: false,
            envelope: DecayEnvelope::new(decay_ms, sample_rate),
            age: 0,
            phase: 0.0,
            noise_state: 0x9E37_79B9,
            last_noise: 0.0,
        }
    }

    pub fn voice(&self) -> VoiceKind {
        self.voice
    }

    /// Number of hits not yet started
    pub fn pending_hits(&self) -> usize {
        self.pending.iter().filter(|slot| slot.is_some()).count()
    }

    fn start_hit(&mut self) {
        self.sounding = true;
        self.envelope.trigger();
        self.age = 0;
        self.phase = 0.0;
    }

    /// Start any pending hit due at or before `frame`
    #[inline]
    fn start_due_hits(&mut self, frame: AudioTime) {
        let mut due = false;
        for slot in self.pending.iter_mut() {
            if matches!(slot, Some(time) if *time <= frame) {
                *slot = None;
                due = true;
            }
        }
        if due {
            self.start_hit();
        }
    }

    #[inline]
    fn next_sample(&mut self) -> f32 {
        if !self.sounding {
            return 0.0;
        }

        let level = self.envelope.next_level();
        let raw = match self.voice {
            VoiceKind::Kick => {
                // 150 Hz falling to 50 Hz over ~30ms
                let t = self.age as f32 / self.sample_rate;
                let freq = 50.0 + 100.0 * (-t / 0.03).exp();
                let sample = self.phase.sin();
                self.phase += 2.0 * PI * freq / self.sample_rate;
                if self.phase > 2.0 * PI {
                    self.phase -= 2.0 * PI;
                }
                sample
            }
            VoiceKind::Hat => {
                let mut x = self.noise_state;
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                self.noise_state = x;
                let noise = (x as f32 / u32::MAX as f32) * 2.0 - 1.0;
                let high = noise - self.last_noise;
                self.last_noise = noise;
                high * 0.5
            }
        };

        self.age = self.age.saturating_add(1);
        if self.envelope.is_silent() {
            self.sounding = false;
        }

        flush_denormals_to_zero(raw * level * self.gain)
    }
}

/// One drum track per configured row
pub fn tracks_from_config(tracks: &[TrackConfig], sample_rate: u32) -> Vec<Box<dyn Track>> {
    tracks
        .iter()
        .map(|track| {
            Box::new(DrumTrack::new(track.name.clone(), track.voice, sample_rate as f32))
                as Box<dyn Track>
        })
        .collect()
}

impl Track for DrumTrack {
    fn name(&self) -> &str {
        &self.name
    }

    fn trigger(&mut self, time: AudioTime, _step: usize) -> Result<(), TriggerError> {
        match self.pending.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(time);
                Ok(())
            }
            None => Err(TriggerError::QueueFull),
        }
    }

    fn render(&mut self, block_start: AudioTime, out: &mut [f32]) {
        let has_pending = self.pending.iter().any(Option::is_some);
        if !has_pending && !self.sounding {
            return;
        }

        for (i, sample) in out.iter_mut().enumerate() {
            if has_pending {
                self.start_due_hits(block_start.add_frames(i as u64));
            }
            *sample += self.next_sample();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(track: &mut DrumTrack, start: u64, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        track.render(AudioTime::from_frames(start), &mut out);
        out
    }

    #[test]
    fn test_silent_without_hits() {
        let mut kick = DrumTrack::new("Kick", VoiceKind::Kick, 48000.0);
        assert!(render(&mut kick, 0, 512).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_hit_starts_at_trigger_frame() {
        for voice in [VoiceKind::Kick, VoiceKind::Hat] {
            let mut track = DrumTrack::new("drum", voice, 48000.0);
            track.trigger(AudioTime::from_frames(700), 0).unwrap();

            let first = render(&mut track, 0, 512);
            assert!(first.iter().all(|&s| s == 0.0));

            let second = render(&mut track, 512, 512);
            assert!(second[..188].iter().all(|&s| s == 0.0));
            assert!(second[188..].iter().any(|&s| s != 0.0));
            assert_eq!(track.pending_hits(), 0);
        }
    }

    #[test]
    fn test_late_hit_starts_immediately() {
        let mut hat = DrumTrack::new("Hat", VoiceKind::Hat, 48000.0);
        hat.trigger(AudioTime::from_frames(100), 0).unwrap();
        let out = render(&mut hat, 1024, 256);
        assert!(out[1..].iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_pending_queue_full() {
        let mut kick = DrumTrack::new("Kick", VoiceKind::Kick, 48000.0);
        for i in 0..MAX_PENDING {
            kick.trigger(AudioTime::from_frames(i as u64 * 6000), i).unwrap();
        }
        assert_eq!(
            kick.trigger(AudioTime::from_frames(100_000), 0),
            Err(TriggerError::QueueFull)
        );
    }

    #[test]
    fn test_output_stays_bounded_and_decays() {
        let mut kick = DrumTrack::new("Kick", VoiceKind::Kick, 48000.0);
        kick.trigger(AudioTime::ZERO, 0).unwrap();
        let out = render(&mut kick, 0, 48000);
        assert!(out.iter().all(|s| s.abs() <= 1.0));
        assert!(out[47000..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_tracks_from_config() {
        let config = crate::config::SequencerConfig::default();
        let tracks = tracks_from_config(&config.tracks, 48000);
        let names: Vec<&str> = tracks.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["Kick", "Hat"]);
    }

    #[test]
    fn test_voice_kind_serde() {
        let text = ron::to_string(&VoiceKind::Hat).unwrap();
        assert_eq!(text, "Hat");
        assert_eq!(ron::from_str::<VoiceKind>("Kick").unwrap(), VoiceKind::Kick);
    }
}
