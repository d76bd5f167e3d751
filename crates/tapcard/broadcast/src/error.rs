use nexum_tapcard::{Classify, ErrorClass};

/// Result type for broadcast operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for broadcasting a signed transaction
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed before a response arrived
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Endpoint did not answer in time
    #[error("Endpoint {endpoint} timed out after {elapsed_ms} ms")]
    Timeout {
        /// Endpoint that timed out
        endpoint: String,
        /// Per-attempt timeout
        elapsed_ms: u64,
    },

    /// Endpoint answered with a server error status
    #[error("Endpoint {endpoint} answered HTTP {status}")]
    Status {
        /// Endpoint that answered
        endpoint: String,
        /// HTTP status code
        status: u16,
    },

    /// Response carried neither a transaction id nor an error
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Response body is not JSON
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Node is up but cannot serve submissions right now
    #[error("Node unavailable: {0}")]
    Unavailable(String),

    /// Node accepted the request and rejected the transaction
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// Retry budget ran out
    #[error("Broadcast failed after {attempts} attempts: {message}")]
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Message of the last error observed
        message: String,
    },

    /// Coordinator has no endpoint to send to
    #[error("No broadcast endpoints configured")]
    NoEndpoints,

    /// Endpoint URL could not be parsed
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Whether another endpoint may accept the same transaction
    ///
    /// A rejection is chain semantic: every node would answer the same.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_)
                | Self::Timeout { .. }
                | Self::Status { .. }
                | Self::Malformed(_)
                | Self::Json(_)
                | Self::Unavailable(_)
        )
    }

    /// Recovery class of this error
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Rejected(_) => ErrorClass::BroadcastRejected,
            Self::NoEndpoints | Self::Url(_) => ErrorClass::InvalidRequest,
            Self::Http(_)
            | Self::Timeout { .. }
            | Self::Status { .. }
            | Self::Malformed(_)
            | Self::Json(_)
            | Self::Unavailable(_)
            | Self::Exhausted { .. } => ErrorClass::Transport,
        }
    }
}

impl Classify for Error {
    fn class(&self) -> ErrorClass {
        Self::class(self)
    }
}
