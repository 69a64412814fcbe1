use thiserror::Error;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

const NETWORK_FALLBACK: &str = "Unable to reach the server. Check your connection and retry.";
const CREDENTIALS_FALLBACK: &str = "Incorrect email or password";

#[derive(Debug, Error)]
pub enum ClientError {
    /// The credential login was refused.
    #[error("invalid credentials: {}", .0.as_deref().unwrap_or(CREDENTIALS_FALLBACK))]
    InvalidCredentials(Option<String>),
    /// The backend rejected the session token.
    #[error("session rejected by server")]
    Unauthorized,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("request failed with status {status}: {}", .detail.as_deref().unwrap_or("no detail"))]
    Api { status: u16, detail: Option<String> },
    #[error("malformed server response: {0}")]
    Decode(String),
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("client storage failure: {0:#}")]
    Storage(#[source] anyhow::Error),
}

impl ClientError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }

    /// Text fit for showing to the user: the server's own detail when it sent
    /// one, a generic line otherwise.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::InvalidCredentials(detail) => detail
                .clone()
                .unwrap_or_else(|| CREDENTIALS_FALLBACK.to_string()),
            Self::Unauthorized => "Your session has expired. Please sign in again.".to_string(),
            Self::Transport(_) => NETWORK_FALLBACK.to_string(),
            Self::Api {
                detail: Some(detail),
                ..
            } => detail.clone(),
            Self::Precondition(message) => message.clone(),
            Self::Api { detail: None, .. } | Self::Decode(_) | Self::Storage(_) => {
                fallback.to_string()
            }
        }
    }

    /// Whether repeating the same operation can succeed without any other
    /// user action first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Decode(_) | Self::Storage(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidCredentials(_) | Self::Unauthorized | Self::Precondition(_) => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}
