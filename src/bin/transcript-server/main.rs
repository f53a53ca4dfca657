use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing::{error, info};

use transcript_server::opts::DEFAULT_MAX_BODY_BYTES;
use transcript_server::shutdown::{SHUTDOWN_EXIT_CODE, install_panic_hook, wait_for_signal};
use transcript_server::{
    DebugSetting, Engine, ModelManager, ServerContext, ServerOpts, ShutdownCoordinator,
    ShutdownReason, WhisperEngine, server,
};

/// Exit code when required startup configuration is missing or unusable.
const STARTUP_FAILURE_EXIT_CODE: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "transcript-server")]
#[command(about = "HTTP server for offline speech-to-text")]
struct Params {
    /// Directory holding the model. Its final path segment is the model name clients may ask for.
    #[arg(short = 'm', long = "model", env = "TRANSCRIPT_MODEL")]
    model_dir: Option<PathBuf>,

    /// Host interface to bind to.
    #[arg(long = "host", env = "TRANSCRIPT_HOST", default_value = "0.0.0.0")]
    host: String,

    /// TCP port to listen on.
    #[arg(short = 'p', long = "port", env = "TRANSCRIPT_PORT", default_value_t = 3000)]
    port: u16,

    /// Maximum POST body size (bytes). 0 accepts bodies of any size.
    #[arg(long = "max-bytes", env = "TRANSCRIPT_MAX_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_bytes: usize,

    /// Verbose logs. With a LEVEL, engine logs are enabled at that level too.
    #[arg(
        short = 'd',
        long = "debug",
        value_name = "LEVEL",
        allow_negative_numbers = true
    )]
    debug: Option<Option<i32>>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let params = Params::parse();

    let Some(model_dir) = params.model_dir.clone() else {
        eprintln!("{}", Params::command().render_help());
        std::process::exit(STARTUP_FAILURE_EXIT_CODE);
    };

    let debug = DebugSetting::from_flag(params.debug);
    transcript_server::logging::init(debug);

    let (addr, ctx) = match startup(&params, model_dir, debug) {
        Ok(started) => started,
        Err(err) => {
            error!(error = ?err, "transcript-server failed to start");
            std::process::exit(STARTUP_FAILURE_EXIT_CODE);
        }
    };

    let coordinator = Arc::new(ShutdownCoordinator::new(ctx.clone()));
    install_panic_hook(coordinator.clone());

    let reason = tokio::select! {
        res = server::serve(addr, ctx) => match res {
            Ok(()) => ShutdownReason::Fatal("listener stopped".to_owned()),
            Err(err) => ShutdownReason::Fatal(format!("server error: {err}")),
        },
        reason = wait_for_signal() => reason,
    };

    coordinator.shutdown(&reason);
    std::process::exit(SHUTDOWN_EXIT_CODE);
}

fn startup(
    params: &Params,
    model_dir: PathBuf,
    debug: DebugSetting,
) -> Result<(SocketAddr, Arc<ServerContext<WhisperEngine>>)> {
    let addr: SocketAddr = format!("{}:{}", params.host, params.port)
        .parse()
        .context("invalid host/port bind address")?;

    let engine = WhisperEngine::new();
    if let Some(level) = debug.engine_level() {
        engine.set_log_level(level);
    }

    let models = ModelManager::load(engine, &model_dir)
        .with_context(|| format!("failed to load model from '{}'", model_dir.display()))?;

    let opts = ServerOpts {
        max_body_bytes: ServerOpts::body_limit_from(params.max_bytes),
        debug,
    };
    info!(
        model = models.name(),
        load_latency_ms = models.load_latency_ms(),
        max_body_bytes = ?opts.max_body_bytes,
        ?debug,
        "server configured"
    );

    let ctx = ServerContext::new(models, opts)?;
    Ok((addr, Arc::new(ctx)))
}
