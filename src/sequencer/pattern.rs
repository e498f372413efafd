// Pattern Store - Boolean step grid shared by the UI and audio threads
//
// One writer (UI toggles) and one reader (the dispatcher on the audio
// thread). Every cell is its own atomic, so no lock is ever taken.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::error::{Result, SequencerError};

/// Grid of track x step cells
///
/// Dimensions are fixed at construction; only individual cells change.
#[derive(Debug)]
pub struct PatternStore {
    cells: Box<[AtomicBool]>,
    tracks: usize,
    steps: usize,
}

impl PatternStore {
    /// Create an empty grid
    pub fn new(tracks: usize, steps: usize) -> Self {
        assert!(tracks > 0, "Pattern must have at least one track");
        assert!(steps > 0, "Pattern must have at least one step");

        let cells = (0..tracks * steps).map(|_| AtomicBool::new(false)).collect();

        Self {
            cells,
            tracks,
            steps,
        }
    }

    /// Create an empty grid behind an `Arc`, ready to hand to the dispatcher
    pub fn shared(tracks: usize, steps: usize) -> Arc<Self> {
        Arc::new(Self::new(tracks, steps))
    }

    pub fn tracks(&self) -> usize {
        self.tracks
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    fn index(&self, track: usize, step: usize) -> Result<usize> {
        if track < self.tracks && step < self.steps {
            Ok(track * self.steps + step)
        } else {
            Err(SequencerError::InvalidIndex {
                track,
                step,
                tracks: self.tracks,
                steps: self.steps,
            })
        }
    }

    /// Read one cell
    pub fn get(&self, track: usize, step: usize) -> Result<bool> {
        let index = self.index(track, step)?;
        Ok(self.cells[index].load(Ordering::Relaxed))
    }

    /// Flip one cell and return its new value
    pub fn toggle(&self, track: usize, step: usize) -> Result<bool> {
        let index = self.index(track, step)?;
        let previous = self.cells[index].fetch_xor(true, Ordering::Relaxed);
        Ok(!previous)
    }

    /// Write one cell
    pub fn set(&self, track: usize, step: usize, value: bool) -> Result<()> {
        let index = self.index(track, step)?;
        self.cells[index].store(value, Ordering::Relaxed);
        Ok(())
    }

    /// Audio-thread read: the dispatcher only asks for in-range cells
    #[inline]
    pub(crate) fn is_active(&self, track: usize, step: usize) -> bool {
        debug_assert!(track < self.tracks && step < self.steps);
        track < self.tracks
            && step < self.steps
            && self.cells[track * self.steps + step].load(Ordering::Relaxed)
    }

    /// Snapshot of one track's row
    pub fn row(&self, track: usize) -> Result<Vec<bool>> {
        self.index(track, 0)?;
        let start = track * self.steps;
        Ok(self.cells[start..start + self.steps]
            .iter()
            .map(|cell| cell.load(Ordering::Relaxed))
            .collect())
    }

    /// Turn every cell off
    pub fn clear(&self) {
        for cell in self.cells.iter() {
            cell.store(false, Ordering::Relaxed);
        }
    }

    /// Number of active cells
    pub fn active_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|cell| cell.load(Ordering::Relaxed))
            .count()
    }

    /// Fraction of active cells in [0, 1]
    pub fn density(&self) -> f64 {
        self.active_count() as f64 / self.cells.len() as f64
    }
}
