use std::fmt::Display;

use axum::body::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::debug;

use crate::error::{EngineError, Error, Result};

/// Drain a request body into one contiguous buffer.
///
/// Chunks are appended in arrival order; the task yields between chunks so other requests keep
/// moving. With `limit` set, accumulation stops as soon as the total would exceed it.
pub async fn accumulate<S, E>(mut body: S, limit: Option<usize>) -> Result<Vec<u8>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: Display,
{
    let mut buf = Vec::<u8>::new();
    let mut chunks = 0usize;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|err| {
            Error::Engine(EngineError::msg(format!("failed to read request body: {err}")))
        })?;

        if let Some(limit) = limit {
            if buf.len() + chunk.len() > limit {
                return Err(Error::PayloadTooLarge { limit });
            }
        }

        buf.extend_from_slice(&chunk);
        chunks += 1;
    }

    debug!(bytes = buf.len(), chunks, "request body accumulated");
    Ok(buf)
}
