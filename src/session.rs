// Session - Composition root of the UI side
// Owns the transport controller, pattern handle and capture recorder,
// and routes commands to explicit handlers.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::audio::export::CaptureArtifact;
use crate::capture::{CaptureError, CapturePlan, CaptureRecorder, CaptureSink, CaptureTap, RingCaptureSink, capture_channel};
use crate::config::SequencerConfig;
use crate::messaging::command::Command;
use crate::messaging::notification::{Notification, NotificationCategory};
use crate::sequencer::error::Result;
use crate::sequencer::{
    CursorFeed, FaultFeed, ImpactScore, PatternStore, SequencerParts, SequencerPlayer, StepEvent,
    Tempo, Track, TransportController, create_sequencer,
};

/// What a handled command did
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Unlocked,
    Toggled { track: usize, step: usize, active: bool },
    Started,
    Stopped,
    TempoChanged(Tempo),
    Recording(CapturePlan),
}

/// UI-side sequencer session
pub struct Session<S: CaptureSink> {
    config: SequencerConfig,
    pattern: Arc<PatternStore>,
    transport: TransportController,
    cursor: CursorFeed,
    faults: FaultFeed,
    recorder: CaptureRecorder<S>,
    finished: VecDeque<CaptureArtifact>,
    notifications: Vec<Notification>,
}

impl Session<RingCaptureSink> {
    /// Build a session plus the audio-thread pieces it talks to
    ///
    /// The player and the tap belong in the output callback.
    pub fn build(
        config: SequencerConfig,
        tracks: Vec<Box<dyn Track>>,
        sample_rate: u32,
    ) -> (Self, SequencerPlayer, CaptureTap) {
        let parts = create_sequencer(&config, tracks, sample_rate);
        let capacity = (config.capture_buffer_seconds * sample_rate as f64).ceil() as usize;
        let (tap, sink) = capture_channel(capacity, sample_rate);
        let (session, player) = Session::new(config, parts, Some(sink));
        (session, player, tap)
    }
}

impl<S: CaptureSink> Session<S> {
    /// Take over the UI halves of `parts`, returning the player
    pub fn new(config: SequencerConfig, parts: SequencerParts, sink: Option<S>) -> (Self, SequencerPlayer) {
        let SequencerParts {
            controller,
            player,
            cursor,
            faults,
            pattern,
        } = parts;

        let session = Self {
            recorder: CaptureRecorder::new(sink, config.time_signature),
            config,
            pattern,
            transport: controller,
            cursor,
            faults,
            finished: VecDeque::new(),
            notifications: Vec::new(),
        };
        (session, player)
    }

    /// Route one command to its handler
    pub fn handle(&mut self, command: Command) -> Result<Outcome> {
        log::debug!("Command: {}", command);
        match command {
            Command::Unlock => {
                self.unlock();
                Ok(Outcome::Unlocked)
            }
            Command::Toggle { track, step } => self.on_toggle(track, step),
            Command::Start => self.on_start(),
            Command::Stop => Ok(self.on_stop()),
            Command::SetTempo(bpm) => self.on_tempo_change(bpm),
            Command::Record { bars } => self.on_record(bars),
        }
    }

    /// One-time engine unlock on the first user gesture
    pub fn unlock(&mut self) {
        self.transport.unlock();
    }

    pub fn on_toggle(&mut self, track: usize, step: usize) -> Result<Outcome> {
        let active = self.pattern.toggle(track, step)?;
        Ok(Outcome::Toggled {
            track,
            step,
            active,
        })
    }

    pub fn on_start(&mut self) -> Result<Outcome> {
        if !self.transport.is_running() {
            self.transport.start()?;
            self.notify(Notification::info(
                NotificationCategory::Transport,
                format!("Playing at {}", self.transport.tempo()),
            ));
        }
        Ok(Outcome::Started)
    }

    /// Stop the transport; an active capture is closed with what it has
    pub fn on_stop(&mut self) -> Outcome {
        if let Some(result) = self.recorder.finalize() {
            self.notify(Notification::warning(
                NotificationCategory::Capture,
                "Transport stopped before the capture window ended",
            ));
            self.complete_capture(result);
        }
        if self.transport.is_running() {
            self.transport.stop();
            self.notify(Notification::info(NotificationCategory::Transport, "Stopped"));
        }
        Outcome::Stopped
    }

    /// New tempo for future ticks; a capture in progress keeps its length
    pub fn on_tempo_change(&mut self, bpm: f64) -> Result<Outcome> {
        let tempo = self.transport.set_tempo(bpm)?;
        if self.recorder.is_recording() {
            log::debug!("Tempo changed during capture; capture length unchanged");
        }
        Ok(Outcome::TempoChanged(tempo))
    }

    pub fn on_record(&mut self, bars: Option<u32>) -> Result<Outcome> {
        let bars = bars.unwrap_or(self.config.capture_bars);
        let plan = self.recorder.begin(&self.transport, bars)?;
        self.notify(Notification::info(
            NotificationCategory::Capture,
            format!("Recording {} bars ({:.1}s)", plan.bars, plan.seconds),
        ));
        Ok(Outcome::Recording(plan))
    }

    /// UI-thread housekeeping, called once per frame
    ///
    /// Delivers cursor events of the current run to `on_step`, drains track
    /// faults and advances the capture. Returns a finished capture, if any.
    pub fn poll<F>(&mut self, on_step: F) -> Option<CaptureArtifact>
    where
        F: FnMut(StepEvent),
    {
        self.cursor.poll(on_step);

        let mut faults = Vec::new();
        self.faults.drain(|fault| faults.push(fault));
        for fault in faults {
            self.notify(Notification::warning(
                NotificationCategory::Dispatch,
                fault.to_string(),
            ));
        }

        if let Some(result) = self.recorder.poll(self.transport.audio_time()) {
            self.complete_capture(result);
        }

        self.finished.pop_front()
    }

    fn complete_capture(&mut self, result: std::result::Result<CaptureArtifact, CaptureError>) {
        match result {
            Ok(artifact) => {
                let dropped = self.recorder.last_overruns();
                if dropped > 0 {
                    self.notify(Notification::warning(
                        NotificationCategory::Capture,
                        format!(
                            "Capture buffer overflowed: {} samples lost, the recording has a gap",
                            dropped
                        ),
                    ));
                }
                self.notify(Notification::info(
                    NotificationCategory::Capture,
                    format!("Capture complete ({:.2}s)", artifact.duration_seconds()),
                ));
                self.finished.push_back(artifact);
            }
            Err(err) => {
                self.notify(Notification::error(
                    NotificationCategory::Capture,
                    format!("Capture failed: {}", err),
                ));
            }
        }
    }

    /// Log `notification` and queue it for the UI
    pub fn notify(&mut self, notification: Notification) {
        notification.log();
        self.notifications.push(notification);
    }

    /// Notifications raised since the last call
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    pub fn impact(&self) -> ImpactScore {
        ImpactScore::from_pattern(&self.pattern, self.config.hat_track())
    }

    pub fn pattern(&self) -> &Arc<PatternStore> {
        &self.pattern
    }

    pub fn transport(&self) -> &TransportController {
        &self.transport
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Elapsed fraction of the active capture
    pub fn capture_progress(&self) -> Option<f64> {
        self.recorder
            .active()
            .map(|session| session.progress(self.transport.audio_time()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::notification::NotificationLevel;
    use crate::sequencer::SequencerError;
    use crate::sequencer::error::NotReadyReason;

    fn session() -> (Session<RingCaptureSink>, SequencerPlayer, CaptureTap) {
        Session::build(SequencerConfig::default(), Vec::new(), 48000)
    }

    #[test]
    fn test_command_flow() {
        let (mut session, _player, _tap) = session();

        assert_eq!(session.handle(Command::Start), Err(SequencerError::EngineLocked));
        assert_eq!(session.handle(Command::Unlock), Ok(Outcome::Unlocked));
        assert_eq!(
            session.handle(Command::Toggle { track: 0, step: 0 }),
            Ok(Outcome::Toggled { track: 0, step: 0, active: true })
        );
        assert_eq!(session.handle(Command::Start), Ok(Outcome::Started));
        assert!(matches!(
            session.handle(Command::SetTempo(90.0)),
            Ok(Outcome::TempoChanged(t)) if t.bpm() == 90.0
        ));
        assert_eq!(session.handle(Command::Stop), Ok(Outcome::Stopped));
        assert_eq!(session.transport().current_step(), 0);
    }

    #[test]
    fn test_invalid_commands_leave_state() {
        let (mut session, _player, _tap) = session();
        assert!(matches!(
            session.handle(Command::Toggle { track: 9, step: 0 }),
            Err(SequencerError::InvalidIndex { .. })
        ));
        assert_eq!(
            session.handle(Command::SetTempo(-1.0)),
            Err(SequencerError::InvalidTempo(-1.0))
        );
        assert_eq!(
            session.handle(Command::Record { bars: None }),
            Err(SequencerError::NotReady(NotReadyReason::TransportStopped))
        );
        assert_eq!(session.pattern().active_count(), 0);
        assert_eq!(session.transport().tempo().bpm(), 120.0);
    }

    #[test]
    fn test_record_uses_config_bars() {
        let (mut session, _player, _tap) = session();
        session.handle(Command::Unlock).unwrap();
        session.handle(Command::Start).unwrap();

        match session.handle(Command::Record { bars: None }) {
            Ok(Outcome::Recording(plan)) => {
                assert_eq!(plan.bars, 8);
                assert_eq!(plan.seconds, 16.0);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(
            session.handle(Command::Record { bars: Some(2) }),
            Err(SequencerError::AlreadyRecording)
        );
        assert_eq!(session.capture_progress(), Some(0.0));
    }

    #[test]
    fn test_stop_closes_capture() {
        let (mut session, mut player, mut tap) = session();
        session.handle(Command::Unlock).unwrap();
        session.handle(Command::Start).unwrap();
        session.handle(Command::Record { bars: Some(1) }).unwrap();

        let block_start = player.process_block(512);
        let mut out = vec![0.0; 512];
        player.render(block_start, &mut out);
        tap.write(&out);

        session.handle(Command::Stop).unwrap();
        assert!(!session.is_recording());
        let artifact = session.poll(|_| {}).unwrap();
        assert_eq!(artifact.frames(), 512);

        let notes = session.take_notifications();
        assert!(notes.iter().any(|n| n.message.contains("Capture complete")));
        assert!(session.take_notifications().is_empty());
    }

    #[test]
    fn test_zero_bar_record_rejected() {
        let (mut session, mut player, _tap) = session();
        session.unlock();
        session.handle(Command::Start).unwrap();

        assert_eq!(
            session.handle(Command::Record { bars: Some(0) }),
            Err(SequencerError::EmptyCapture)
        );
        assert!(!session.is_recording());

        player.process_block(512);
        assert!(session.poll(|_| {}).is_none());
    }

    #[test]
    fn test_transport_notifications() {
        let (mut session, _player, _tap) = session();
        session.unlock();
        session.handle(Command::Start).unwrap();
        session.handle(Command::Start).unwrap();
        session.handle(Command::Stop).unwrap();
        session.handle(Command::Stop).unwrap();

        let notes = session.take_notifications();
        assert_eq!(notes.len(), 2);
        assert!(notes.iter().all(|n| n.category == NotificationCategory::Transport));
        assert_eq!(notes[0].message, "Playing at 120.0 BPM");
        assert_eq!(notes[1].message, "Stopped");
    }

    #[test]
    fn test_notify_queues_for_ui() {
        let (mut session, _player, _tap) = session();
        session.notify(Notification::error(NotificationCategory::Audio, "stream error"));

        let notes = session.take_notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Error);
        assert_eq!(notes[0].to_string(), "[audio] stream error");
    }

    #[test]
    fn test_impact_tracks_pattern() {
        let (mut session, _player, _tap) = session();
        let before = session.impact();
        session.handle(Command::Toggle { track: 1, step: 1 }).unwrap();
        let after = session.impact();
        assert!(after.platform_friendliness > before.platform_friendliness);
    }
}
