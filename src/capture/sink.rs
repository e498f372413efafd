// Capture sink - Moves the mixed output from the audio thread to the recorder

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ringbuf::traits::{Consumer, Producer};

use super::CaptureError;
use crate::messaging::channels::{SampleConsumer, SampleProducer, create_sample_channel};

/// Destination a capture session pulls audio from
pub trait CaptureSink: Send {
    /// Begin collecting audio
    fn start_capture(&mut self) -> Result<(), CaptureError>;

    /// Stop collecting; already buffered audio stays drainable
    fn stop_capture(&mut self);

    /// Hand every buffered chunk to `deliver`, oldest first
    fn drain_chunks(&mut self, deliver: &mut dyn FnMut(&[f32]));

    /// Rate of the delivered mono samples
    fn sample_rate(&self) -> u32;

    /// Samples lost since `start_capture` because the sink could not keep up
    fn overruns(&self) -> u64 {
        0
    }
}

/// Audio-thread end: copies each output block into the ring while capturing
pub struct CaptureTap {
    tx: SampleProducer,
    capturing: Arc<AtomicBool>,
    overruns: Arc<AtomicU64>,
}

impl CaptureTap {
    /// Push one block of mono output (no-op when not capturing)
    #[inline]
    pub fn write(&mut self, samples: &[f32]) {
        if !self.capturing.load(Ordering::Acquire) {
            return;
        }
        let pushed = self.tx.push_slice(samples);
        if pushed < samples.len() {
            self.overruns
                .fetch_add((samples.len() - pushed) as u64, Ordering::Relaxed);
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Relaxed)
    }
}

/// UI-thread end of the output tap
pub struct RingCaptureSink {
    rx: SampleConsumer,
    capturing: Arc<AtomicBool>,
    overruns: Arc<AtomicU64>,
    sample_rate: u32,
    scratch: Vec<f32>,
}

impl CaptureSink for RingCaptureSink {
    fn start_capture(&mut self) -> Result<(), CaptureError> {
        // Drop anything left over from an earlier capture
        self.rx.clear();
        self.overruns.store(0, Ordering::Relaxed);
        self.capturing.store(true, Ordering::Release);
        Ok(())
    }

    fn stop_capture(&mut self) {
        self.capturing.store(false, Ordering::Release);
    }

    fn drain_chunks(&mut self, deliver: &mut dyn FnMut(&[f32])) {
        loop {
            let n = self.rx.pop_slice(&mut self.scratch);
            if n == 0 {
                break;
            }
            deliver(&self.scratch[..n]);
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }
}

/// Create a connected tap/sink pair
pub fn capture_channel(capacity: usize, sample_rate: u32) -> (CaptureTap, RingCaptureSink) {
    let (tx, rx) = create_sample_channel(capacity.max(1));
    let capturing = Arc::new(AtomicBool::new(false));
    let overruns = Arc::new(AtomicU64::new(0));

    let tap = CaptureTap {
        tx,
        capturing: Arc::clone(&capturing),
        overruns: Arc::clone(&overruns),
    };
    let sink = RingCaptureSink {
        rx,
        capturing,
        overruns,
        sample_rate,
        scratch: vec![0.0; 4096],
    };
    (tap, sink)
}
