// Capture Session - Records N bars of output from a running transport
//
// The window is fixed in audio time when the session begins. Later tempo
// changes do not stretch or shrink it.

use super::{CaptureError, CaptureSink};
use crate::audio::export::CaptureArtifact;
use crate::sequencer::error::{NotReadyReason, Result, SequencerError};
use crate::sequencer::timeline::{AudioTime, Tempo, TimeSignature};
use crate::sequencer::transport::TransportController;

/// Extra time allowed past the deadline for the last block to reach the sink
const DRAIN_GRACE_SECONDS: f64 = 0.25;

/// Length of a capture, computed once at begin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapturePlan {
    pub bars: u32,
    pub tempo: Tempo,
    pub time_signature: TimeSignature,
    pub seconds: f64,
    pub frames: u64,
}

impl CapturePlan {
    /// `seconds = bars * beats_per_bar * 60 / bpm`, frames rounded up
    pub fn new(bars: u32, tempo: Tempo, time_signature: TimeSignature, sample_rate: u32) -> Self {
        let seconds = bars as f64 * tempo.bar_duration_seconds(&time_signature);
        Self {
            bars,
            tempo,
            time_signature,
            seconds,
            frames: AudioTime::from_seconds(seconds, sample_rate as f64).frames(),
        }
    }
}

/// An active recording window
#[derive(Debug)]
pub struct CaptureSession {
    plan: CapturePlan,
    started_at: AudioTime,
    deadline: AudioTime,
    chunks: Vec<Vec<f32>>,
    collected: u64,
}

impl CaptureSession {
    fn new(plan: CapturePlan, started_at: AudioTime) -> Self {
        Self {
            plan,
            started_at,
            deadline: started_at.add_frames(plan.frames),
            chunks: Vec::new(),
            collected: 0,
        }
    }

    fn push_chunk(&mut self, chunk: &[f32]) {
        // Audio past the window is never needed
        let room = self.plan.frames.saturating_sub(self.collected) as usize;
        let take = chunk.len().min(room);
        if take > 0 {
            self.chunks.push(chunk[..take].to_vec());
            self.collected += take as u64;
        }
    }

    /// Concatenate the chunks into one linear buffer
    fn assemble(self) -> Vec<f32> {
        let mut samples = Vec::with_capacity(self.collected as usize);
        for chunk in self.chunks {
            samples.extend_from_slice(&chunk);
        }
        samples
    }

    pub fn plan(&self) -> &CapturePlan {
        &self.plan
    }

    pub fn started_at(&self) -> AudioTime {
        self.started_at
    }

    pub fn deadline(&self) -> AudioTime {
        self.deadline
    }

    /// Frames collected so far
    pub fn collected(&self) -> u64 {
        self.collected
    }

    /// Fraction of the window elapsed at `now`, in [0, 1]
    pub fn progress(&self, now: AudioTime) -> f64 {
        if self.plan.frames == 0 {
            return 1.0;
        }
        (now.frames_since(self.started_at) as f64 / self.plan.frames as f64).min(1.0)
    }
}

/// Owns the capture sink and at most one active session
pub struct CaptureRecorder<S: CaptureSink> {
    sink: Option<S>,
    active: Option<CaptureSession>,
    time_signature: TimeSignature,
    last_overruns: u64,
}

impl<S: CaptureSink> CaptureRecorder<S> {
    pub fn new(sink: Option<S>, time_signature: TimeSignature) -> Self {
        Self {
            sink,
            active: None,
            time_signature,
            last_overruns: 0,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&CaptureSession> {
        self.active.as_ref()
    }

    /// Samples the sink dropped during the last finalized capture
    ///
    /// Non-zero means the artifact has a gap: audio after the gap was
    /// spliced on, so it spans more than the planned bars.
    pub fn last_overruns(&self) -> u64 {
        self.last_overruns
    }

    /// Start capturing `bars` bars from the transport's current audio time
    ///
    /// Fails without side effects if a session is already recording, `bars`
    /// is zero, the transport is stopped, or no sink is attached.
    pub fn begin(&mut self, transport: &TransportController, bars: u32) -> Result<CapturePlan> {
        if self.active.is_some() {
            return Err(SequencerError::AlreadyRecording);
        }
        if bars == 0 {
            return Err(SequencerError::EmptyCapture);
        }
        if !transport.is_running() {
            return Err(SequencerError::NotReady(NotReadyReason::TransportStopped));
        }
        let Some(sink) = self.sink.as_mut() else {
            return Err(SequencerError::NotReady(NotReadyReason::SinkUnavailable));
        };

        let plan = CapturePlan::new(
            bars,
            transport.tempo(),
            self.time_signature,
            sink.sample_rate(),
        );

        if let Err(err) = sink.start_capture() {
            log::warn!("Capture sink refused to start: {}", err);
            return Err(SequencerError::NotReady(NotReadyReason::SinkUnavailable));
        }

        let session = CaptureSession::new(plan, transport.audio_time());
        log::info!(
            "Capturing {} bars at {} ({:.2}s, until {})",
            plan.bars,
            plan.tempo,
            plan.seconds,
            session.deadline()
        );
        self.active = Some(session);
        Ok(plan)
    }

    /// Collect pending audio and finalize once the deadline has passed
    ///
    /// Returns `None` while recording (or idle) and the finished artifact
    /// exactly once.
    pub fn poll(&mut self, now: AudioTime) -> Option<std::result::Result<CaptureArtifact, CaptureError>> {
        let (session, sink) = match (self.active.as_mut(), self.sink.as_mut()) {
            (Some(session), Some(sink)) => (session, sink),
            _ => return None,
        };

        sink.drain_chunks(&mut |chunk: &[f32]| session.push_chunk(chunk));

        if now < session.deadline {
            return None;
        }

        let complete = session.collected >= session.plan.frames;
        let grace = AudioTime::from_seconds(DRAIN_GRACE_SECONDS, sink.sample_rate() as f64);
        if complete || now >= session.deadline.add_frames(grace.frames()) {
            self.finalize()
        } else {
            None
        }
    }

    /// End the active session now and assemble whatever was collected
    ///
    /// Completes at most once per session; later calls return `None`.
    pub fn finalize(&mut self) -> Option<std::result::Result<CaptureArtifact, CaptureError>> {
        let mut session = self.active.take()?;
        let sample_rate = match self.sink.as_mut() {
            Some(sink) => {
                sink.stop_capture();
                sink.drain_chunks(&mut |chunk: &[f32]| session.push_chunk(chunk));
                self.last_overruns = sink.overruns();
                sink.sample_rate()
            }
            None => return Some(Err(CaptureError::Sink("capture sink was removed".into()))),
        };

        if self.last_overruns > 0 {
            log::warn!(
                "Capture sink dropped {} samples; the capture has a gap",
                self.last_overruns
            );
        }

        if session.collected < session.plan.frames {
            log::warn!(
                "Capture ended short: {} of {} frames",
                session.collected,
                session.plan.frames
            );
        }

        let samples = session.assemble();
        Some(CaptureArtifact::encode_wav(&samples, sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::transport::SharedTransport;

    /// Sink that produces a ramp of samples on demand
    #[derive(Default)]
    struct FakeSink {
        capturing: bool,
        queued: Vec<f32>,
        starts: u32,
        dropped: u64,
    }

    impl FakeSink {
        fn feed(&mut self, frames: usize) {
            if self.capturing {
                self.queued.extend(std::iter::repeat(0.25).take(frames));
            }
        }
    }

    impl CaptureSink for FakeSink {
        fn start_capture(&mut self) -> std::result::Result<(), CaptureError> {
            self.capturing = true;
            self.starts += 1;
            Ok(())
        }

        fn stop_capture(&mut self) {
            self.capturing = false;
        }

        fn drain_chunks(&mut self, deliver: &mut dyn FnMut(&[f32])) {
            if !self.queued.is_empty() {
                deliver(&self.queued);
                self.queued.clear();
            }
        }

        fn sample_rate(&self) -> u32 {
            48000
        }

        fn overruns(&self) -> u64 {
            self.dropped
        }
    }

    fn running_transport() -> TransportController {
        let mut transport = TransportController::new(SharedTransport::new(Tempo::default()));
        transport.unlock();
        transport.start().unwrap();
        transport
    }

    #[test]
    fn test_plan_duration() {
        let plan = CapturePlan::new(8, Tempo::default(), TimeSignature::four_four(), 48000);
        assert_eq!(plan.seconds, 16.0);
        assert_eq!(plan.frames, 768_000);

        let waltz = CapturePlan::new(2, Tempo::default(), TimeSignature::three_four(), 44100);
        assert_eq!(waltz.seconds, 3.0);
        assert_eq!(waltz.frames, 132_300);
    }

    #[test]
    fn test_begin_preconditions() {
        let stopped = TransportController::new(SharedTransport::new(Tempo::default()));
        let mut recorder = CaptureRecorder::new(Some(FakeSink::default()), TimeSignature::four_four());
        assert_eq!(
            recorder.begin(&stopped, 8),
            Err(SequencerError::NotReady(NotReadyReason::TransportStopped))
        );

        let running = running_transport();
        let mut no_sink: CaptureRecorder<FakeSink> = CaptureRecorder::new(None, TimeSignature::four_four());
        assert_eq!(
            no_sink.begin(&running, 8),
            Err(SequencerError::NotReady(NotReadyReason::SinkUnavailable))
        );
        assert!(!no_sink.is_recording());
        assert!(!recorder.is_recording());
    }

    #[test]
    fn test_second_begin_rejected() {
        let transport = running_transport();
        let mut recorder = CaptureRecorder::new(Some(FakeSink::default()), TimeSignature::four_four());

        let plan = recorder.begin(&transport, 1).unwrap();
        assert_eq!(recorder.begin(&transport, 4), Err(SequencerError::AlreadyRecording));
        assert_eq!(recorder.active().unwrap().plan(), &plan);
    }

    #[test]
    fn test_poll_finalizes_at_deadline_once() {
        let transport = running_transport();
        let mut recorder = CaptureRecorder::new(Some(FakeSink::default()), TimeSignature::four_four());
        let plan = recorder.begin(&transport, 1).unwrap();
        assert_eq!(plan.frames, 96_000);

        recorder.sink.as_mut().unwrap().feed(50_000);
        assert!(recorder.poll(AudioTime::from_frames(50_000)).is_none());
        assert_eq!(recorder.active().unwrap().collected(), 50_000);

        recorder.sink.as_mut().unwrap().feed(50_000);
        assert!(recorder.poll(AudioTime::from_frames(95_999)).is_none());

        let artifact = recorder.poll(AudioTime::from_frames(96_000)).unwrap().unwrap();
        assert_eq!(artifact.frames(), 96_000);
        assert!(!recorder.is_recording());
        assert!(recorder.poll(AudioTime::from_frames(200_000)).is_none());
        assert!(recorder.finalize().is_none());
    }

    #[test]
    fn test_poll_waits_for_last_block() {
        let transport = running_transport();
        let mut recorder = CaptureRecorder::new(Some(FakeSink::default()), TimeSignature::four_four());
        recorder.begin(&transport, 1).unwrap();

        recorder.sink.as_mut().unwrap().feed(95_000);
        assert!(recorder.poll(AudioTime::from_frames(96_000)).is_none());

        // Past the grace window the capture closes short
        let artifact = recorder.poll(AudioTime::from_frames(96_000 + 12_000)).unwrap().unwrap();
        assert_eq!(artifact.frames(), 95_000);
    }

    #[test]
    fn test_finalize_early() {
        let transport = running_transport();
        let mut recorder = CaptureRecorder::new(Some(FakeSink::default()), TimeSignature::four_four());
        recorder.begin(&transport, 8).unwrap();
        recorder.sink.as_mut().unwrap().feed(1000);

        let artifact = recorder.finalize().unwrap().unwrap();
        assert_eq!(artifact.frames(), 1000);
        assert!(!recorder.sink.as_ref().unwrap().capturing);

        // A new session can start afterwards
        recorder.begin(&transport, 8).unwrap();
        assert_eq!(recorder.sink.as_ref().unwrap().starts, 2);
    }

    #[test]
    fn test_zero_bars_rejected() {
        let transport = running_transport();
        let mut recorder = CaptureRecorder::new(Some(FakeSink::default()), TimeSignature::four_four());

        assert_eq!(recorder.begin(&transport, 0), Err(SequencerError::EmptyCapture));
        assert!(!recorder.is_recording());
        assert_eq!(recorder.sink.as_ref().unwrap().starts, 0);
        assert!(recorder.poll(AudioTime::from_frames(1)).is_none());
    }

    #[test]
    fn test_overruns_reported_at_finalize() {
        let transport = running_transport();
        let mut recorder = CaptureRecorder::new(Some(FakeSink::default()), TimeSignature::four_four());
        recorder.begin(&transport, 1).unwrap();

        let sink = recorder.sink.as_mut().unwrap();
        sink.feed(96_000);
        sink.dropped = 5440;

        let artifact = recorder.poll(AudioTime::from_frames(96_000)).unwrap().unwrap();
        assert_eq!(artifact.frames(), 96_000);
        assert_eq!(recorder.last_overruns(), 5440);
    }
}
