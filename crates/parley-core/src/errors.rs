use std::time::Duration;

/// Failures talking to the hosted agent service.
///
/// These describe the transport and HTTP layer only. A run that the service
/// executed and marked `failed` is not a `ServiceError`; it comes back as a
/// normal [`Run`](crate::run::Run) with `last_error` set.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),
}

impl ServiceError {
    /// Short classification string for log fields.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "authentication",
            Self::NotFound(_) => "not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited { .. } => "rate_limited",
            Self::Server { .. } => "server_error",
            Self::Network(_) => "network_error",
            Self::Decode(_) => "decode_error",
            Self::StreamInterrupted(_) => "stream_interrupted",
        }
    }

    /// Classify an HTTP status code into the matching variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Authentication(body),
            404 => Self::NotFound(body),
            400 | 409 | 422 => Self::InvalidRequest(body),
            429 => Self::RateLimited { retry_after: None },
            _ => Self::Server { status, body },
        }
    }
}
