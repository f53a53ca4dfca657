use std::path::Path;

use anyhow::{Context, Result};
use whisper_rs::{WhisperContext, WhisperContextParameters};

use super::logging::init_whisper_logging;

/// Load a Whisper model file and return an initialized `WhisperContext`.
pub fn get_context(model_path: &Path) -> Result<WhisperContext> {
    init_whisper_logging();

    let model_path = model_path
        .to_str()
        .with_context(|| format!("model path is not valid UTF-8: {}", model_path.display()))?;

    let ctx_params = WhisperContextParameters::default();
    let ctx = WhisperContext::new_with_params(model_path, ctx_params)
        .with_context(|| format!("failed to load model from path: {model_path}"))?;

    Ok(ctx)
}
