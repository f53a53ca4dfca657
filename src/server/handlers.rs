use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Uri};
use axum::response::Response;
use futures_util::StreamExt;
use tracing::debug;

use crate::engine::{self, AudioSource, Engine, Transcription};
use crate::error::{Error, Result};
use crate::opts::TranscribeOpts;
use crate::server::TRANSCRIPT_PATH;
use crate::server::body::accumulate;
use crate::server::context::ServerContext;
use crate::server::params::{CorrelationId, TranscriptQuery};
use crate::server::response::respond;

/// Entry point for every request on the transcript path: dispatch on method.
pub(crate) async fn transcript<E: Engine>(
    State(ctx): State<Arc<ServerContext<E>>>,
    method: Method,
    uri: Uri,
    body: Body,
) -> Response {
    let arrival = CorrelationId::arrival();

    let query = match TranscriptQuery::from_uri(&uri) {
        Ok(query) => query,
        Err(err) => return respond(&arrival, Err(err)),
    };
    let id = query.correlation_id(arrival);

    let outcome = match method {
        Method::GET => handle_get(&ctx, &id, query).await,
        Method::POST => handle_post(&ctx, &id, query, body).await,
        other => Err(Error::validation(format!("method {other} is not supported"))),
    };

    respond(&id, outcome)
}

/// Fallback for every path the exact route misses. Paths under the transcript prefix
/// (`/transcript/`, `/transcript/x`, `/transcripts`) are still served; anything else is 405.
pub(crate) async fn by_prefix<E: Engine>(
    state: State<Arc<ServerContext<E>>>,
    method: Method,
    uri: Uri,
    body: Body,
) -> Response {
    if uri.path().starts_with(TRANSCRIPT_PATH) {
        return transcript(state, method, uri, body).await;
    }

    let id = CorrelationId::arrival();
    respond(
        &id,
        Err(Error::validation(format!(
            "{method} {} is not supported",
            uri.path()
        ))),
    )
}

async fn handle_get<E: Engine>(
    ctx: &ServerContext<E>,
    id: &CorrelationId,
    query: TranscriptQuery,
) -> Result<Transcription> {
    let Some(speech) = query.speech() else {
        return Err(Error::validation("missing required parameter 'speech'"));
    };
    check_model(ctx, query.model())?;

    let source = AudioSource::File(PathBuf::from(speech));
    run_engine(ctx, id, source, query.grammar()).await
}

async fn handle_post<E: Engine>(
    ctx: &ServerContext<E>,
    id: &CorrelationId,
    query: TranscriptQuery,
    body: Body,
) -> Result<Transcription> {
    // Reject before buffering anything that would be thrown away.
    check_model(ctx, query.model())?;

    let stream = body.into_data_stream().boxed();
    let bytes = accumulate(stream, ctx.opts().max_body_bytes).await?;

    run_engine(ctx, id, AudioSource::Buffer(bytes), query.grammar()).await
}

fn check_model<E: Engine>(ctx: &ServerContext<E>, requested: Option<&str>) -> Result<()> {
    let loaded = ctx.models().name();
    match requested {
        Some(requested) if requested != loaded => Err(Error::ModelMismatch {
            requested: requested.to_owned(),
            loaded: loaded.to_owned(),
        }),
        _ => Ok(()),
    }
}

async fn run_engine<E: Engine>(
    ctx: &ServerContext<E>,
    id: &CorrelationId,
    source: AudioSource,
    grammar: Option<&str>,
) -> Result<Transcription> {
    let guard = ctx.begin_transcription();
    debug!(id = %id, active = guard.active_at_start(), "transcription started");

    let opts = TranscribeOpts::from_grammar_json(grammar)?;
    let model = ctx.models().handle()?;
    let res = engine::transcribe(ctx.models().engine(), model, source, opts).await;

    drop(guard);
    debug!(id = %id, active = ctx.active_transcriptions(), "transcription finished");
    Ok(res?)
}
