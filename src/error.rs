use thiserror::Error;

/// Fatal initialisation failure. Delivered at most once by the init
/// pipeline; the session displays it and transitions straight to Closing.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to load foreign schema names: {source}")]
    SchemaNames {
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to resolve connections: {source}")]
    Connections {
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to load schema metadata: {source}")]
    Metadata {
        #[source]
        source: anyhow::Error,
    },
    #[error("initialisation aborted before a result was delivered")]
    Aborted,
}

/// Non-fatal: the accumulated input could not be resolved into an
/// executable statement. Shown to the user; the input buffer is cleared
/// and the read loop continues.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ResolutionError {
    pub message: String,
}

impl ResolutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Non-fatal statement failure. `Cancelled` is a user-initiated abort and
/// is displayed differently from a genuine backend error.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("query was cancelled")]
    Cancelled,
    #[error("{message}")]
    Backend { message: String },
}

impl ExecutionError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Non-fatal directive failure, either rejected arguments or a failure
/// while the directive handler ran.
#[derive(Debug, Clone, Error)]
pub enum DirectiveError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Execution(String),
}
