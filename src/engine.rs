use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};

use crate::error::EngineError;
use crate::opts::TranscribeOpts;

/// Engine-defined result structure. It is spread into the success envelope as-is.
pub type Payload = Map<String, Value>;

/// Pluggable speech-recognition engine.
///
/// The server treats the engine as opaque: it hands over an audio source, the shared model and
/// optional grammar, and relays whatever payload or error comes back.
///
/// One model handle is shared by every in-flight request, so implementations must tolerate
/// concurrent `transcribe_*` calls against the same `Model`.
pub trait Engine: Send + Sync + 'static {
    /// Loaded model handle.
    type Model: Send + Sync + 'static;

    /// Load a model from a directory.
    fn load(&self, dir: &Path) -> Result<Self::Model, EngineError>;

    /// Release engine-side resources held by `model`.
    ///
    /// Called at most once per model. Memory is reclaimed when the last handle drops.
    fn release(&self, _model: &Self::Model) {}

    /// Recognize a file reachable by the server process.
    fn transcribe_file(
        &self,
        path: &Path,
        model: &Self::Model,
        opts: &TranscribeOpts,
    ) -> Result<Payload, EngineError>;

    /// Recognize an in-memory audio buffer.
    fn transcribe_buffer(
        &self,
        bytes: &[u8],
        model: &Self::Model,
        opts: &TranscribeOpts,
    ) -> Result<Payload, EngineError>;

    /// Adjust engine-internal log verbosity.
    fn set_log_level(&self, _level: i32) {}
}

/// Where the audio for a request comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// A path resolvable by the server process.
    File(PathBuf),

    /// Raw bytes accumulated from a request body.
    Buffer(Vec<u8>),
}

/// A finished recognition pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    pub result: Payload,
    pub latency_ms: u64,
}

/// Run one recognition pass on the blocking pool and time it.
///
/// Recognition is CPU-bound, so it must not run on the thread that drives request I/O.
pub async fn transcribe<E: Engine>(
    engine: Arc<E>,
    model: Arc<E::Model>,
    source: AudioSource,
    opts: TranscribeOpts,
) -> Result<Transcription, EngineError> {
    let joined = tokio::task::spawn_blocking(move || {
        let _engine_call = EngineCall::enter();
        let started = Instant::now();
        let result = match &source {
            AudioSource::File(path) => engine.transcribe_file(path, &model, &opts),
            AudioSource::Buffer(bytes) => engine.transcribe_buffer(bytes, &model, &opts),
        }?;

        Ok(Transcription {
            result,
            latency_ms: elapsed_millis(started),
        })
    })
    .await;

    match joined {
        Ok(res) => res,
        Err(err) => Err(EngineError::msg(format!("engine task failed: {err}"))),
    }
}

thread_local! {
    static IN_ENGINE_CALL: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is inside an engine call started by [`transcribe`].
///
/// A panic there unwinds into that request as an engine error instead of taking the process down.
pub fn in_engine_call() -> bool {
    IN_ENGINE_CALL.with(Cell::get)
}

/// Marks the blocking-pool thread for the duration of one engine call.
struct EngineCall;

impl EngineCall {
    fn enter() -> Self {
        IN_ENGINE_CALL.with(|flag| flag.set(true));
        Self
    }
}

impl Drop for EngineCall {
    fn drop(&mut self) {
        IN_ENGINE_CALL.with(|flag| flag.set(false));
    }
}

pub(crate) fn elapsed_millis(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
