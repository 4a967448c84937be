use std::path::PathBuf;
use std::time::Duration;

use parley_core::agent::VectorStoreStatus;
use parley_core::errors::ServiceError;
use parley_core::ids::{RunId, VectorStoreId};
use parley_core::run::{LastError, RunStatus};

/// Why a single agent turn did not produce a reply.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("message text is empty")]
    EmptyInput,

    #[error("conversation has no participants")]
    NoParticipants,

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    /// The service ran the agent and marked the run `failed`. The payload is
    /// exactly what the service reported.
    #[error("run {run_id} failed: {}", describe(.last_error))]
    RunFailed {
        run_id: RunId,
        last_error: Option<LastError>,
    },

    #[error("run {run_id} ended with status {status}: {}", describe(.last_error))]
    RunEnded {
        run_id: RunId,
        status: RunStatus,
        last_error: Option<LastError>,
    },

    #[error("run {run_id} requested client-side tool outputs; the run was cancelled")]
    RequiresAction { run_id: RunId },

    #[error("turn cancelled")]
    Cancelled,

    #[error("run timeout after {0:?}")]
    Timeout(Duration),
}

fn describe(last_error: &Option<LastError>) -> String {
    last_error
        .as_ref()
        .map_or_else(|| "no error details".to_string(), ToString::to_string)
}

/// Failures of session-level operations (resource setup, one-shot queries).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Turn(#[from] TurnError),

    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("vector store {store} ended in status {status:?}")]
    VectorStore {
        store: VectorStoreId,
        status: VectorStoreStatus,
    },

    #[error("session operation cancelled")]
    Cancelled,
}

/// Failures of a routed chat exchange.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("message text is empty")]
    EmptyInput,

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("model returned an empty reply")]
    EmptyReply,

    #[error("chat cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_failed_display_is_verbatim() {
        let err = TurnError::RunFailed {
            run_id: RunId::from_raw("run_1"),
            last_error: Some(LastError {
                code: "server_error".into(),
                message: "Sorry, something went wrong.".into(),
            }),
        };
        assert_eq!(
            err.to_string(),
            "run run_1 failed: server_error: Sorry, something went wrong."
        );
    }

    #[test]
    fn run_failed_without_details() {
        let err = TurnError::RunFailed { run_id: RunId::from_raw("run_2"), last_error: None };
        assert_eq!(err.to_string(), "run run_2 failed: no error details");
    }

    #[test]
    fn session_error_wraps_turn_transparently() {
        let err = SessionError::from(TurnError::EmptyInput);
        assert_eq!(err.to_string(), "message text is empty");
    }
}
