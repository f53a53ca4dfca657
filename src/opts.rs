use crate::error::EngineError;

/// Default cap on an accumulated POST body (100 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

/// Options that shape how the server admits requests.
///
/// This struct represents *library-level configuration*, not CLI flags directly. The binary maps
/// user input into this type so tests and other frontends can construct it programmatically.
#[derive(Debug, Clone)]
pub struct ServerOpts {
    /// Upper bound on the bytes accumulated from a POST body.
    ///
    /// `None` accumulates without bound; that is an explicit choice, never the default.
    pub max_body_bytes: Option<usize>,

    /// Log verbosity resolved once at startup.
    pub debug: DebugSetting,
}

impl Default for ServerOpts {
    fn default() -> Self {
        Self {
            max_body_bytes: Some(DEFAULT_MAX_BODY_BYTES),
            debug: DebugSetting::Disabled,
        }
    }
}

impl ServerOpts {
    /// Map a CLI-style byte count onto a limit, treating `0` as "unbounded".
    pub fn body_limit_from(max_bytes: usize) -> Option<usize> {
        (max_bytes > 0).then_some(max_bytes)
    }
}

/// Log verbosity, resolved once from the `--debug [LEVEL]` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugSetting {
    /// Flag absent: quiet.
    #[default]
    Disabled,

    /// Flag present without a value: verbose internal logs only.
    Verbose,

    /// Flag present with a level: verbose internal logs plus engine logs at that level.
    EngineLevel(i32),
}

impl DebugSetting {
    /// Resolve the tri-state flag as produced by an optional-value CLI argument.
    pub fn from_flag(flag: Option<Option<i32>>) -> Self {
        match flag {
            None => Self::Disabled,
            Some(None) => Self::Verbose,
            Some(Some(level)) => Self::EngineLevel(level),
        }
    }

    pub fn is_verbose(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Engine log level to apply before loading, if any.
    pub fn engine_level(&self) -> Option<i32> {
        match self {
            Self::EngineLevel(level) => Some(*level),
            _ => None,
        }
    }

    /// Default `tracing` directive for this setting.
    pub fn default_directive(&self) -> &'static str {
        if self.is_verbose() { "debug" } else { "info" }
    }
}

/// Per-call options handed to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscribeOpts {
    /// Ordered list of allowed phrases constraining recognition.
    pub grammar: Option<Vec<String>>,
}

impl TranscribeOpts {
    /// Build options from the raw `grammar` query value.
    ///
    /// A value that is not a JSON array of strings is reported as an engine failure: from the
    /// caller's side it is indistinguishable from the engine rejecting the grammar.
    pub fn from_grammar_json(raw: Option<&str>) -> Result<Self, EngineError> {
        let grammar = match raw {
            Some(raw) => Some(
                serde_json::from_str::<Vec<String>>(raw)
                    .map_err(|err| EngineError::msg(format!("invalid grammar: {err}")))?,
            ),
            None => None,
        };
        Ok(Self { grammar })
    }
}
