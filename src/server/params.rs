use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::Query;
use axum::http::Uri;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Query parameters accepted on `/transcript`.
///
/// Empty values are treated as absent.
#[derive(Debug, Default, Deserialize)]
pub struct TranscriptQuery {
    #[serde(default)]
    speech: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    grammar: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

impl TranscriptQuery {
    pub fn from_uri(uri: &Uri) -> Result<Self> {
        let Query(query) = Query::<Self>::try_from_uri(uri)
            .map_err(|err| Error::validation(format!("invalid query string: {err}")))?;
        Ok(query)
    }

    /// Audio file path (GET only).
    pub fn speech(&self) -> Option<&str> {
        non_empty(&self.speech)
    }

    pub fn model(&self) -> Option<&str> {
        non_empty(&self.model)
    }

    /// Raw, still JSON-encoded grammar.
    pub fn grammar(&self) -> Option<&str> {
        non_empty(&self.grammar)
    }

    /// The client's id if it sent one, otherwise `arrival`.
    pub fn correlation_id(&self, arrival: CorrelationId) -> CorrelationId {
        match non_empty(&self.id) {
            Some(id) => CorrelationId::Client(id.to_owned()),
            None => arrival,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Per-request token used to correlate log lines with responses.
///
/// Not unique: two requests arriving in the same millisecond share a default id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CorrelationId {
    /// Echoed verbatim from the `id` query parameter.
    Client(String),

    /// Milliseconds since the Unix epoch at which handling started.
    Arrival(u64),
}

impl CorrelationId {
    pub fn arrival() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        Self::Arrival(millis)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client(id) => f.write_str(id),
            Self::Arrival(millis) => write!(f, "{millis}"),
        }
    }
}
