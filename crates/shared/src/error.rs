use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body returned by the backend on failure, e.g. `{"detail": "quota exceeded"}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorDetail {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
        }
    }

    /// The detail text, if present and not blank.
    pub fn message(&self) -> Option<&str> {
        self.detail
            .as_deref()
            .map(str::trim)
            .filter(|detail| !detail.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported aspect ratio '{0}' (expected one of 1:1, 16:9, 9:16, 4:3, 3:4)")]
pub struct ParseAspectRatioError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown model '{0}'")]
pub struct ParseModelIdError(pub String);
