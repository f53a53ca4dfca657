use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Map, Value};

use transcript_server::engine::{self, AudioSource};
use transcript_server::{DebugSetting, Engine, ModelManager, TranscribeOpts, WhisperEngine};

#[derive(Parser, Debug)]
#[command(name = "transcript-cli")]
#[command(about = "Transcribe a single WAV file and print the JSON result")]
struct Params {
    /// Directory holding the model.
    #[arg(short = 'm', long = "model")]
    model_dir: PathBuf,

    /// Mono 16 kHz 16-bit WAV file.
    #[arg(short = 'a', long = "audio")]
    audio_path: PathBuf,

    /// JSON array of allowed phrases.
    #[arg(short = 'g', long = "grammar")]
    grammar: Option<String>,

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
async fn main() -> Result<()> {
    let params = Params::parse();
    let debug = DebugSetting::from_flag(params.debug);
    transcript_server::logging::init(debug);

    let engine = WhisperEngine::new();
    if let Some(level) = debug.engine_level() {
        engine.set_log_level(level);
    }

    let models = ModelManager::load(engine, &params.model_dir)
        .with_context(|| format!("failed to load model from '{}'", params.model_dir.display()))?;

    let res = run(&models, &params).await;
    models.release();
    let transcription = res?;

    let mut out = Map::new();
    out.insert("latency".into(), Value::from(transcription.latency_ms));
    out.extend(transcription.result);

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    serde_json::to_writer_pretty(&mut writer, &Value::Object(out))?;
    writeln!(writer)?;
    Ok(())
}

async fn run(
    models: &ModelManager<WhisperEngine>,
    params: &Params,
) -> Result<transcript_server::Transcription> {
    let opts = TranscribeOpts::from_grammar_json(params.grammar.as_deref())?;
    let model = models.handle()?;
    let source = AudioSource::File(params.audio_path.clone());

    let transcription = engine::transcribe(models.engine(), model, source, opts)
        .await
        .with_context(|| format!("failed to transcribe '{}'", params.audio_path.display()))?;
    Ok(transcription)
}
