//! Model lifecycle: one model per process, loaded before the listener starts and released once
//! at shutdown.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, info};

use crate::engine::{Engine, elapsed_millis};
use crate::error::{EngineError, Error, Result};

/// Owns the engine and the single loaded model.
///
/// Requests borrow the model through [`ModelManager::handle`]; they never mutate it.
pub struct ModelManager<E: Engine> {
    engine: Arc<E>,
    name: String,
    load_latency_ms: u64,
    handle: Mutex<Option<Arc<E::Model>>>,
}

impl<E: Engine> ModelManager<E> {
    /// Load the model in `dir`.
    ///
    /// There is no retry: a server without a model must not start listening.
    pub fn load(engine: E, dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::ModelDirectory(dir.to_path_buf()));
        }

        let name = model_name_from_dir(dir);
        debug!(model = %name, dir = %dir.display(), "loading model");

        let started = Instant::now();
        let model = engine.load(dir)?;
        let load_latency_ms = elapsed_millis(started);

        info!(model = %name, latency_ms = load_latency_ms, "model loaded");

        Ok(Self {
            engine: Arc::new(engine),
            name,
            load_latency_ms,
            handle: Mutex::new(Some(Arc::new(model))),
        })
    }

    /// Name clients must use in the `model` query parameter.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time the engine took to load the model.
    pub fn load_latency_ms(&self) -> u64 {
        self.load_latency_ms
    }

    pub fn engine(&self) -> Arc<E> {
        self.engine.clone()
    }

    /// Shared handle to the loaded model, or an engine error once it has been released.
    pub fn handle(&self) -> std::result::Result<Arc<E::Model>, EngineError> {
        self.slot()
            .clone()
            .ok_or_else(|| EngineError::msg(format!("model '{}' has been released", self.name)))
    }

    pub fn is_loaded(&self) -> bool {
        self.slot().is_some()
    }

    /// Release the model. Returns `false` if it was already released.
    ///
    /// Safe to call from a panic hook: a poisoned lock is recovered rather than propagated.
    pub fn release(&self) -> bool {
        let Some(model) = self.slot().take() else {
            return false;
        };

        self.engine.release(&model);
        info!(model = %self.name, "model released");
        true
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<E::Model>>> {
        self.handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Model name exposed to clients: the final segment of the model directory.
pub fn model_name_from_dir(dir: &Path) -> String {
    match dir.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => dir.display().to_string(),
    }
}
