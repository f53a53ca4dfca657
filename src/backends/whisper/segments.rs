use anyhow::{Context, Result};
use serde::Serialize;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperSegment, WhisperState};

use crate::opts::TranscribeOpts;

use super::token::{Token, centiseconds_to_seconds, tokens_from_segment};

/// Vosk-style placeholder for out-of-grammar speech; meaningless as a prompt.
const UNKNOWN_PHRASE: &str = "[unk]";

/// Result payload of one whisper pass.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Recognition {
    /// All segment texts joined.
    pub text: String,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Segment {
    pub start: f32,
    pub end: f32,
    pub text: String,
    pub tokens: Vec<Token>,
}

pub(super) fn recognize(
    ctx: &WhisperContext,
    opts: &TranscribeOpts,
    samples: &[f32],
) -> Result<Recognition> {
    let prompt = opts.grammar.as_deref().and_then(grammar_prompt);
    let state = run_whisper_full(ctx, prompt.as_deref(), samples)?;

    let mut segments = Vec::new();
    for whisper_segment in state.as_iter() {
        segments.push(to_segment(whisper_segment)?);
    }

    let text = segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    Ok(Recognition { text, segments })
}

/// Whisper has no phrase-list grammar; the phrases become the initial prompt instead, which
/// biases decoding towards them.
pub(super) fn grammar_prompt(phrases: &[String]) -> Option<String> {
    let phrases: Vec<&str> = phrases
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty() && *p != UNKNOWN_PHRASE)
        .collect();

    (!phrases.is_empty()).then(|| phrases.join(", "))
}

fn to_segment(segment: WhisperSegment) -> Result<Segment> {
    let text = segment
        .to_str()
        .context("failed to get segment text")?
        .to_owned();

    let tokens = tokens_from_segment(&segment)?;

    Ok(Segment {
        start: centiseconds_to_seconds(segment.start_timestamp()),
        end: centiseconds_to_seconds(segment.end_timestamp()),
        text,
        tokens,
    })
}

fn build_full_params(prompt: Option<&str>) -> FullParams<'static, 'static> {
    let mut params = FullParams::new(SamplingStrategy::BeamSearch {
        beam_size: 5,
        patience: 1.0,
    });

    params.set_n_threads(num_cpus::get() as i32);
    params.set_translate(false);
    params.set_language(None);
    params.set_no_context(true);
    params.set_single_segment(false);

    params.set_print_progress(false);
    params.set_print_special(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);

    params.set_token_timestamps(true);

    if let Some(prompt) = prompt {
        params.set_initial_prompt(prompt);
    }

    params
}

fn run_whisper_full(
    ctx: &WhisperContext,
    prompt: Option<&str>,
    samples: &[f32],
) -> Result<WhisperState> {
    let params = build_full_params(prompt);

    // A fresh state per call keeps concurrent requests on one context independent.
    let mut state = ctx
        .create_state()
        .context("failed to create whisper state")?;

    state
        .full(params, samples)
        .context("failed to run whisper full()")?;

    Ok(state)
}
