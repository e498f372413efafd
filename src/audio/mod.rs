// Audio module - CPAL backend, drum voices and capture export

pub mod dsp_utils;
pub mod engine;
pub mod export;
pub mod synth;
