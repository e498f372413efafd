// Sequencer errors - Failures surfaced to the caller of the transport core
//
// Trigger-path failures never leave the audio thread as errors: they are
// caught by the dispatcher and reported as `DispatchFault`s instead.

use std::fmt;

use thiserror::Error;

/// Errors returned synchronously to the UI side of the sequencer
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SequencerError {
    #[error("Grid index out of range: track {track}, step {step} (grid is {tracks} x {steps})")]
    InvalidIndex {
        track: usize,
        step: usize,
        tracks: usize,
        steps: usize,
    },

    #[error("Audio engine is locked: a user gesture must unlock it before playback")]
    EngineLocked,

    #[error("Capture not ready: {0}")]
    NotReady(NotReadyReason),

    #[error("A capture session is already recording")]
    AlreadyRecording,

    #[error("Capture length must be at least one bar")]
    EmptyCapture,

    #[error("Invalid tempo: {0} BPM")]
    InvalidTempo(f64),
}

/// Why a capture request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReadyReason {
    TransportStopped,
    SinkUnavailable,
}

impl fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotReadyReason::TransportStopped => write!(f, "transport is not running"),
            NotReadyReason::SinkUnavailable => write!(f, "no capture sink attached"),
        }
    }
}

/// Error a track may return from `trigger`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    #[error("Pending trigger queue is full")]
    QueueFull,
}

pub type Result<T> = std::result::Result<T, SequencerError>;
