// Cursor Feed - UI-side end of the visual cursor queue

use std::sync::Arc;

use ringbuf::traits::Consumer;

use super::dispatcher::StepEvent;
use super::transport::SharedTransport;
use crate::messaging::channels::CursorConsumer;

/// Delivers step events of the current run to the visual cursor
///
/// Events posted by a run that has since been stopped are discarded, so the
/// cursor never jumps after the transport returned to step 0.
pub struct CursorFeed {
    rx: CursorConsumer,
    shared: Arc<SharedTransport>,
    last: Option<StepEvent>,
}

impl CursorFeed {
    pub fn new(rx: CursorConsumer, shared: Arc<SharedTransport>) -> Self {
        Self {
            rx,
            shared,
            last: None,
        }
    }

    /// Drain pending events, handing current-run ones to `on_step`
    /// Returns how many were delivered
    pub fn poll<F>(&mut self, mut on_step: F) -> usize
    where
        F: FnMut(StepEvent),
    {
        let running = self.shared.is_running();
        let epoch = self.shared.epoch();
        let mut delivered = 0;

        while let Some(event) = self.rx.try_pop() {
            if running && event.epoch == epoch {
                self.last = Some(event);
                on_step(event);
                delivered += 1;
            }
        }

        if !running {
            self.last = None;
        }
        delivered
    }

    /// Most recent event delivered during the current run
    pub fn last(&self) -> Option<StepEvent> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::channels::create_cursor_channel;
    use crate::sequencer::timeline::{AudioTime, Tempo};
    use crate::sequencer::transport::TransportController;
    use ringbuf::traits::Producer;

    fn event(step: usize, epoch: u32) -> StepEvent {
        StepEvent {
            step,
            time: AudioTime::from_frames(step as u64 * 6000),
            epoch,
        }
    }

    #[test]
    fn test_delivers_current_run() {
        let mut transport = TransportController::new(SharedTransport::new(Tempo::default()));
        transport.unlock();
        transport.start().unwrap();

        let (mut tx, rx) = create_cursor_channel(8);
        let mut feed = CursorFeed::new(rx, transport.shared());
        let epoch = transport.shared().epoch();
        tx.try_push(event(0, epoch)).unwrap();
        tx.try_push(event(1, epoch)).unwrap();

        let mut steps = Vec::new();
        assert_eq!(feed.poll(|e| steps.push(e.step)), 2);
        assert_eq!(steps, vec![0, 1]);
        assert_eq!(feed.last().map(|e| e.step), Some(1));
    }

    #[test]
    fn test_discards_events_after_stop() {
        let mut transport = TransportController::new(SharedTransport::new(Tempo::default()));
        transport.unlock();
        transport.start().unwrap();

        let (mut tx, rx) = create_cursor_channel(8);
        let mut feed = CursorFeed::new(rx, transport.shared());
        let epoch = transport.shared().epoch();
        tx.try_push(event(5, epoch)).unwrap();

        transport.stop();
        assert_eq!(feed.poll(|_| panic!("stale cursor event delivered")), 0);

        // A new run ignores leftovers from the old one
        transport.start().unwrap();
        tx.try_push(event(6, epoch)).unwrap();
        assert_eq!(feed.poll(|_| panic!("stale cursor event delivered")), 0);
        assert!(feed.last().is_none());
    }
}
