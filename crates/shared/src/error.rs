use serde::{Deserialize, Serialize};

/// Error body used by the remote API: `{"detail": "..."}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorBody {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
        }
    }

    pub fn detail_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.detail.as_deref().unwrap_or(fallback)
    }
}
