use http::StatusCode;

/// Failures of one chat relay call.
///
/// `Validation`, `ModelNotFound` and `Configuration` are raised before any
/// upstream traffic. Everything else happens once the downstream stream is
/// committed and reaches the client only as a terminal `error` event. A
/// single malformed upstream line is not an error at all; see
/// [`crate::reframe::LineOutcome::Skip`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    Validation(String),
    #[error("Model not found or inactive")]
    ModelNotFound,
    #[error("{0}")]
    Configuration(String),
    #[error("Invalid API key")]
    UpstreamAuth,
    #[error("Rate limit exceeded")]
    UpstreamRateLimited,
    #[error("AI service temporarily unavailable")]
    UpstreamUnavailable { status: Option<u16>, detail: String },
    #[error("No response from AI model")]
    EmptyResponse,
    #[error("Stream processing error")]
    StreamAborted(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl RelayError {
    pub fn validation(message: impl Into<String>) -> Self {
        RelayError::Validation(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        RelayError::Configuration(message.into())
    }

    /// Maps a non-success upstream status. Single attempt, no retry.
    pub fn from_upstream_status(status: u16, detail: impl Into<String>) -> Self {
        match status {
            401 => RelayError::UpstreamAuth,
            429 => RelayError::UpstreamRateLimited,
            _ => RelayError::UpstreamUnavailable {
                status: Some(status),
                detail: detail.into(),
            },
        }
    }

    /// Raised before the downstream stream is opened.
    pub fn is_pre_flight(&self) -> bool {
        matches!(
            self,
            RelayError::Validation(_)
                | RelayError::ModelNotFound
                | RelayError::Configuration(_)
                | RelayError::Storage(_)
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::ModelNotFound => StatusCode::NOT_FOUND,
            RelayError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::UpstreamAuth => StatusCode::UNAUTHORIZED,
            RelayError::UpstreamRateLimited => StatusCode::TOO_MANY_REQUESTS,
            RelayError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::EmptyResponse => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::StreamAborted(_) => StatusCode::BAD_GATEWAY,
            RelayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<chatwire_storage::StorageError> for RelayError {
    fn from(value: chatwire_storage::StorageError) -> Self {
        RelayError::Storage(value.to_string())
    }
}
