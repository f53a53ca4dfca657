use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;
use whisper_rs::WhisperContext;

use crate::engine::{Engine, Payload};
use crate::error::EngineError;
use crate::opts::TranscribeOpts;
use crate::wav::{get_samples_from_wav_path, get_samples_from_wav_reader};

mod ctx;
mod logging;
mod segments;
mod token;

pub use segments::{Recognition, Segment};
pub use token::Token;

/// Built-in engine powered by `whisper-rs` / `whisper.cpp`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhisperEngine;

/// A loaded whisper.cpp model.
pub struct WhisperModel {
    ctx: WhisperContext,
    path: PathBuf,
}

impl WhisperModel {
    /// Model file picked from the model directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WhisperEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Engine for WhisperEngine {
    type Model = WhisperModel;

    fn load(&self, dir: &Path) -> std::result::Result<WhisperModel, EngineError> {
        let path = find_model_file(dir)?;
        debug!(path = %path.display(), "loading whisper model");

        let ctx = ctx::get_context(&path)?;
        Ok(WhisperModel { ctx, path })
    }

    fn release(&self, model: &WhisperModel) {
        debug!(path = %model.path.display(), "releasing whisper context");
    }

    fn transcribe_file(
        &self,
        path: &Path,
        model: &WhisperModel,
        opts: &TranscribeOpts,
    ) -> std::result::Result<Payload, EngineError> {
        let (samples, _spec) = get_samples_from_wav_path(path)?;
        recognize_payload(model, opts, &samples)
    }

    fn transcribe_buffer(
        &self,
        bytes: &[u8],
        model: &WhisperModel,
        opts: &TranscribeOpts,
    ) -> std::result::Result<Payload, EngineError> {
        let (samples, _spec) = get_samples_from_wav_reader(Cursor::new(bytes))?;
        recognize_payload(model, opts, &samples)
    }

    fn set_log_level(&self, level: i32) {
        logging::set_whisper_log_level(level);
        logging::init_whisper_logging();
    }
}

fn recognize_payload(
    model: &WhisperModel,
    opts: &TranscribeOpts,
    samples: &[f32],
) -> std::result::Result<Payload, EngineError> {
    let recognition = segments::recognize(&model.ctx, opts, samples)?;
    match serde_json::to_value(recognition)? {
        Value::Object(payload) => Ok(payload),
        other => Err(EngineError::msg(format!(
            "recognition did not serialize to an object: {other}"
        ))),
    }
}

/// Pick the whisper.cpp model inside `dir`: the first `*.bin` file by name.
fn find_model_file(dir: &Path) -> Result<PathBuf> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("failed to read '{}'", dir.display()))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "bin") {
            candidates.push(path);
        }
    }

    candidates.sort();
    candidates
        .into_iter()
        .next()
        .with_context(|| format!("no *.bin model file found in '{}'", dir.display()))
}
