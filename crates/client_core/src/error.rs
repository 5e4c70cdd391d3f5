use thiserror::Error;

/// Failure of a single API call, split by where it went wrong.
#[derive(Debug, Error)]
pub enum ApiFailure {
    #[error("not authenticated: no bearer token is available")]
    NotAuthenticated,
    #[error("request rejected with status {status}: {}", detail.as_deref().unwrap_or("no detail provided"))]
    Status { status: u16, detail: Option<String> },
    #[error("transport failure: {0}")]
    Transport(reqwest::Error),
    #[error("malformed response payload: {0}")]
    Decode(String),
}

impl ApiFailure {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Human-readable detail the server attached to a rejection, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

/// Coarse classification used by the binaries to decide how to present a
/// failure and whether the user has to sign in again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Auth,
    Transport,
    Validation,
    Server,
    Unknown,
}

impl ErrorCategory {
    pub fn of(error: &anyhow::Error) -> Self {
        if let Some(failure) = error.downcast_ref::<ApiFailure>() {
            return Self::of_failure(failure);
        }
        Self::of_message(&format!("{error:#}"))
    }

    pub fn of_failure(failure: &ApiFailure) -> Self {
        match failure {
            ApiFailure::NotAuthenticated => Self::Auth,
            ApiFailure::Status { status, .. } => match *status {
                401 | 403 => Self::Auth,
                400 | 404 | 409 | 422 => Self::Validation,
                status if status >= 500 => Self::Server,
                _ => Self::Unknown,
            },
            ApiFailure::Transport(_) => Self::Transport,
            ApiFailure::Decode(_) => Self::Server,
        }
    }

    fn of_message(message: &str) -> Self {
        let lowered = message.to_lowercase();
        if lowered.contains("not logged in") || lowered.contains("unauthorized") {
            Self::Auth
        } else if lowered.contains("connect")
            || lowered.contains("timed out")
            || lowered.contains("transport")
        {
            Self::Transport
        } else if lowered.contains("invalid") || lowered.contains("must not be empty") {
            Self::Validation
        } else {
            Self::Unknown
        }
    }

    pub fn requires_reauth(self) -> bool {
        matches!(self, Self::Auth)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Auth => "authentication",
            Self::Transport => "transport",
            Self::Validation => "validation",
            Self::Server => "server",
            Self::Unknown => "unexpected",
        }
    }
}
