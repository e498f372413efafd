// Communication channels lock-free
// Audio thread -> UI thread: cursor events, dispatch faults, captured audio

use crate::sequencer::dispatcher::{DispatchFault, StepEvent};
use ringbuf::{HeapRb, traits::Split};

pub type CursorProducer = ringbuf::HeapProd<StepEvent>;
pub type CursorConsumer = ringbuf::HeapCons<StepEvent>;

pub fn create_cursor_channel(capacity: usize) -> (CursorProducer, CursorConsumer) {
    let rb = HeapRb::<StepEvent>::new(capacity);
    rb.split()
}

pub type FaultProducer = ringbuf::HeapProd<DispatchFault>;
pub type FaultConsumer = ringbuf::HeapCons<DispatchFault>;

pub fn create_fault_channel(capacity: usize) -> (FaultProducer, FaultConsumer) {
    let rb = HeapRb::<DispatchFault>::new(capacity);
    rb.split()
}

pub type SampleProducer = ringbuf::HeapProd<f32>;
pub type SampleConsumer = ringbuf::HeapCons<f32>;

/// Mono sample stream from the output tap to the capture sink
pub fn create_sample_channel(capacity: usize) -> (SampleProducer, SampleConsumer) {
    let rb = HeapRb::<f32>::new(capacity);
    rb.split()
}
