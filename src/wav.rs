use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader, WavSpec};

/// Sample rate whisper.cpp expects.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Load WAV audio from a file and return normalized samples.
pub fn get_samples_from_wav_path(path: &Path) -> Result<(Vec<f32>, WavSpec)> {
    let file = File::open(path)
        .with_context(|| format!("failed to open audio file '{}'", path.display()))?;
    get_samples_from_wav_reader(BufReader::new(file))
}

/// Load WAV audio from a reader and return normalized audio samples.
///
/// What we return:
/// - A `Vec<f32>` containing mono audio samples normalized to `[-1.0, 1.0]`
/// - The associated `WavSpec` so callers still have access to metadata
///
/// Format requirements:
/// - Mono (1 channel)
/// - 16 kHz
/// - 16-bit integer PCM
pub fn get_samples_from_wav_reader<R: Read>(reader: R) -> Result<(Vec<f32>, WavSpec)> {
    let mut reader = WavReader::new(reader).context("failed to read WAV data")?;
    let spec = reader.spec();

    if spec.channels != 1 {
        anyhow::bail!(
            "expected mono WAV (1 channel), got {} channels",
            spec.channels
        );
    }

    if spec.sample_rate != TARGET_SAMPLE_RATE {
        anyhow::bail!(
            "expected {} Hz sample rate, got {} Hz",
            TARGET_SAMPLE_RATE,
            spec.sample_rate
        );
    }

    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        anyhow::bail!(
            "expected 16-bit integer PCM, got {}-bit {:?}",
            spec.bits_per_sample,
            spec.sample_format
        );
    }

    let mut samples = Vec::with_capacity(reader.len() as usize);
    for sample in reader.samples::<i16>() {
        let pcm = sample.context("failed to read WAV sample")?;
        samples.push(pcm as f32 / i16::MAX as f32);
    }

    Ok((samples, spec))
}
