//! HTTP surface: every path starting with `/transcript` accepts GET (file reference) and POST
//! (raw audio body). Every response, including errors, is a JSON envelope.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, header};
use axum::routing::any;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};

use crate::engine::Engine;

pub mod body;
pub mod context;
mod handlers;
pub mod params;
pub mod response;

pub use context::ServerContext;

/// Path prefix served by this process.
pub const TRANSCRIPT_PATH: &str = "/transcript";

/// Build the router around a shared server context.
pub fn router<E: Engine>(ctx: Arc<ServerContext<E>>) -> Router {
    Router::new()
        .route(TRANSCRIPT_PATH, any(handlers::transcript::<E>))
        .fallback(handlers::by_prefix::<E>)
        .with_state(ctx)
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}

/// Bind `addr` and serve until the listener fails.
///
/// Returns only on error; shutdown is driven from outside by dropping this future.
pub async fn serve<E: Engine>(addr: SocketAddr, ctx: Arc<ServerContext<E>>) -> std::io::Result<()> {
    let model = ctx.models().name().to_owned();
    let app = router(ctx);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, %model, "listening");
    axum::serve(listener, app).await
}
