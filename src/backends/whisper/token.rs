use anyhow::{Context, Result};
use serde::Serialize;
use whisper_rs::WhisperSegment;

/// A single token of a recognized segment.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Token {
    /// Start time in seconds (whisper returns centiseconds).
    pub start: f32,
    /// End time in seconds (whisper returns centiseconds).
    pub end: f32,
    pub text: String,
    /// Probability assigned to this token.
    pub probability: f32,
}

pub(super) fn centiseconds_to_seconds(value: i64) -> f32 {
    if value < 0 { 0.0 } else { value as f32 / 100.0 }
}

pub(super) fn tokens_from_segment(segment: &WhisperSegment) -> Result<Vec<Token>> {
    let token_count = segment.n_tokens();
    let token_count_usize = usize::try_from(token_count)
        .with_context(|| format!("segment reported negative token count: {token_count}"))?;
    let mut tokens = Vec::with_capacity(token_count_usize);

    for token_idx in 0..token_count_usize {
        let token = segment
            .get_token(token_idx as i32)
            .context("failed to get token from segment")?;

        let data = token.token_data();
        let text = token
            .to_str()
            .with_context(|| format!("failed to get token text at index {token_idx}"))?
            .to_owned();

        // Control tokens (`[_BEG_]`, `[_TT_50]`) carry no transcript text.
        if text.starts_with("[_") && text.ends_with("_]") {
            continue;
        }

        tokens.push(Token {
            // whisper uses -1 for unknown; clamp to 0 so consumers don't see -0.01s
            start: centiseconds_to_seconds(data.t0),
            end: centiseconds_to_seconds(data.t1),
            text,
            probability: data.p,
        });
    }

    Ok(tokens)
}
