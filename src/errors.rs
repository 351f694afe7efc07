use thiserror::Error;

/// Payment-notice client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The base URL passed in `ClientOptions` could not be parsed.
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// The request could not be built (bad path, unserializable body).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Failed to reach the backend. No connectivity, DNS, TLS and similar.
    #[error("Failed to send a request to the backend: {0}")]
    Network(String),

    /// The backend did not answer before the configured timeout.
    #[error("Request to the backend timed out.")]
    Timeout,

    /// The body did not match either the bare or the `{success, data}` shape.
    #[error("Failed to decode backend response: {0}")]
    MalformedResponse(String),

    /// The backend wrapped its answer in an envelope with `success: false`.
    #[error("Backend reported failure: {0}")]
    EnvelopeFailure(String),

    /// The backend answered with a non-2xx status.
    /// A 401 here means the single refresh attempt did not help.
    #[error("Backend returned {status}: {message}")]
    Api { status: u16, message: String },

    /// No credential pair is stored for this session.
    #[error("Not logged in.")]
    NotLoggedIn,

    /// The secure store failed to read or persist a value.
    #[error("Secure storage error: {0}")]
    Storage(String),

    /// The wallet checkout page could not be opened.
    #[error("Failed to open the checkout page: {0}")]
    BrowserLaunch(String),
}

impl ClientError {
    /// Status code for `Api` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the error came from the transport rather than the backend.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
