use crate::audit::AuditTrail;
use std::fmt;
use thiserror::Error;

/// Construction-time misconfiguration. Never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("config error: {0}")]
pub struct ConfigError(pub String);

/// A model answered with text that does not decode into the expected shape.
#[derive(Debug, Clone, Error)]
#[error("malformed {what} from model: {reason}")]
pub struct MalformedResponse {
    pub what: &'static str,
    pub reason: String,
    pub raw: String,
}

/// An external call outlived the configured per-call timeout.
#[derive(Debug, Clone, Error)]
#[error("{call} call timed out after {after:?}")]
pub struct CallTimeout {
    pub call: &'static str,
    pub after: std::time::Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ExactMatch,
    Embed,
    Retrieve,
    Generate,
    Repair,
    Execute,
    Narrate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::ExactMatch => "exact_match",
            Stage::Embed => "embed",
            Stage::Retrieve => "retrieve",
            Stage::Generate => "generate",
            Stage::Repair => "repair",
            Stage::Execute => "execute",
            Stage::Narrate => "narrate",
        };
        f.write_str(s)
    }
}

/// Fatal failure of one pipeline stage.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    /// Draft that was current when the stage failed, if any existed yet.
    pub last_sql: Option<String>,
    #[source]
    pub source: anyhow::Error,
}

impl StageError {
    pub fn new(stage: Stage, source: anyhow::Error) -> Self {
        Self {
            stage,
            last_sql: None,
            source,
        }
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.last_sql = Some(sql.into());
        self
    }
}

/// What a caller gets back when a run cannot finish: the failure plus
/// everything the audit trail recorded up to that point.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PipelineFailure {
    #[source]
    pub error: StageError,
    pub audit: AuditTrail,
}

impl PipelineFailure {
    pub fn is_config_error(&self) -> bool {
        try_map_error(&self.error.source).is_some()
    }
}

/// Finds a [`ConfigError`] anywhere in the chain.
pub fn try_map_error(e: &anyhow::Error) -> Option<&ConfigError> {
    e.chain().find_map(|c| c.downcast_ref::<ConfigError>())
}

/// Finds a [`MalformedResponse`] anywhere in the chain.
pub fn malformed_response(e: &anyhow::Error) -> Option<&MalformedResponse> {
    e.chain().find_map(|c| c.downcast_ref::<MalformedResponse>())
}
