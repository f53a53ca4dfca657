//! `transcript-server`: HTTP front-end for an offline speech-to-text engine.
//!
//! Clients either point at an audio file the server can read (`GET /transcript?speech=...`) or
//! send raw audio as the request body (`POST /transcript`), and get a JSON envelope back.
//!
//! This crate provides:
//! - One model per process, loaded before listening and released at shutdown
//! - Request validation, model-name enforcement and body accumulation
//! - A pluggable [`Engine`] seam, with a whisper.cpp engine behind the `whisper` feature
//! - Success and error envelopes with correlation ids

pub mod engine;
pub mod error;
pub mod model;
pub mod opts;
pub mod server;
pub mod shutdown;

#[cfg(feature = "whisper")]
pub mod backends;
#[cfg(feature = "whisper")]
pub mod wav;

#[cfg(feature = "logging")]
pub mod logging;

pub use engine::{AudioSource, Engine, Payload, Transcription};
pub use error::{EngineError, Error, Result};
pub use model::ModelManager;
pub use opts::{DebugSetting, ServerOpts, TranscribeOpts};
pub use server::ServerContext;
pub use shutdown::{ShutdownCoordinator, ShutdownReason};

#[cfg(feature = "whisper")]
pub use backends::whisper::WhisperEngine;
