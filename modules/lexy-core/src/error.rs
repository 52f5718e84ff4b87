use thiserror::Error;

/// Transport-level failures talking to the `/api/*` routes.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Sign-in required")]
    SignInRequired,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Parse(err.to_string())
        } else {
            BackendError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A precondition that stops a paid action before any network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateDenial {
    #[error("No credits remaining. Upgrade to continue.")]
    OutOfCredits,

    #[error("Please sign in to use this feature.")]
    SignInRequired,
}

/// An event the current state machine state does not accept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} while {state}")]
pub struct TransitionError {
    pub state: &'static str,
    pub action: &'static str,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Denied(#[from] GateDenial),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Message is empty")]
    EmptyMessage,
}
