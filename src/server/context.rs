use prometheus::{IntGauge, Registry};

use crate::engine::Engine;
use crate::model::ModelManager;
use crate::opts::ServerOpts;

const IN_FLIGHT_GAUGE: &str = "transcript_in_flight_transcriptions";

/// Process-wide state shared by every handler.
///
/// Built once at startup and handed to the router behind an `Arc`.
pub struct ServerContext<E: Engine> {
    models: ModelManager<E>,
    opts: ServerOpts,
    registry: Registry,
    in_flight: IntGauge,
}

impl<E: Engine> ServerContext<E> {
    pub fn new(models: ModelManager<E>, opts: ServerOpts) -> crate::error::Result<Self> {
        let in_flight = IntGauge::new(
            IN_FLIGHT_GAUGE,
            "Current number of transcription requests being handled.",
        )?;

        let registry = Registry::new();
        registry.register(Box::new(in_flight.clone()))?;

        Ok(Self {
            models,
            opts,
            registry,
            in_flight,
        })
    }

    pub fn models(&self) -> &ModelManager<E> {
        &self.models
    }

    pub fn opts(&self) -> &ServerOpts {
        &self.opts
    }

    /// Registry holding this server's gauges, for embedders that export them.
    pub fn metrics(&self) -> &Registry {
        &self.registry
    }

    /// Number of transcription requests currently being handled.
    ///
    /// Diagnostic only; nothing is throttled on it.
    pub fn active_transcriptions(&self) -> usize {
        usize::try_from(self.in_flight.get()).unwrap_or_default()
    }

    /// Count a request as active until the returned guard drops.
    pub(crate) fn begin_transcription(&self) -> ActiveTranscription<'_> {
        self.in_flight.inc();
        ActiveTranscription {
            gauge: &self.in_flight,
            active: self.active_transcriptions(),
        }
    }
}

/// Decrements the in-flight gauge on drop, whatever path the request takes.
pub(crate) struct ActiveTranscription<'a> {
    gauge: &'a IntGauge,
    active: usize,
}

impl ActiveTranscription<'_> {
    /// Gauge value observed right after this request was admitted.
    pub(crate) fn active_at_start(&self) -> usize {
        self.active
    }
}

impl Drop for ActiveTranscription<'_> {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}
