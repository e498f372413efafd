// Audio Export - Captured audio encoded as a WAV byte stream

use std::fs::{self, OpenOptions};
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use hound::{WavSpec, WavWriter};

use crate::capture::CaptureError;

/// Bit depth of exported captures
const BIT_DEPTH: u16 = 16;

/// Finished capture: a complete mono WAV file in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureArtifact {
    bytes: Vec<u8>,
    frames: u64,
    sample_rate: u32,
}

impl CaptureArtifact {
    /// Encode mono samples as 16-bit PCM WAV
    pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Self, CaptureError> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: BIT_DEPTH,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
        {
            let mut writer = WavWriter::new(&mut cursor, spec)?;
            let scale = i16::MAX as f32;
            for &sample in samples {
                writer.write_sample((sample.clamp(-1.0, 1.0) * scale) as i16)?;
            }
            writer.finalize()?;
        }

        Ok(Self {
            bytes: cursor.into_inner(),
            frames: samples.len() as u64,
            sample_rate,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    /// `remix-YYYYmmdd-HHMMSS.wav`
    pub fn suggested_file_name(at: DateTime<Local>) -> String {
        Self::numbered_file_name(at, 0)
    }

    /// `remix-YYYYmmdd-HHMMSS-N.wav` for N > 0
    fn numbered_file_name(at: DateTime<Local>, n: u32) -> String {
        let stamp = at.format("%Y%m%d-%H%M%S");
        if n == 0 {
            format!("remix-{}.wav", stamp)
        } else {
            format!("remix-{}-{}.wav", stamp, n)
        }
    }

    /// Write the WAV into `dir` under a timestamped name
    pub fn save(&self, dir: &Path) -> Result<PathBuf, CaptureError> {
        self.save_at(dir, Local::now())
    }

    /// Write the WAV into `dir` named after `at`
    ///
    /// Never replaces an existing file: captures finishing within the same
    /// second get a numeric suffix.
    pub fn save_at(&self, dir: &Path, at: DateTime<Local>) -> Result<PathBuf, CaptureError> {
        fs::create_dir_all(dir)?;

        let mut n = 0;
        let (path, mut file) = loop {
            let path = dir.join(Self::numbered_file_name(at, n));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e.into()),
            }
        };
        file.write_all(&self.bytes)?;

        log::info!(
            "Saved {:.2}s capture to {}",
            self.duration_seconds(),
            path.display()
        );
        Ok(path)
    }
}
