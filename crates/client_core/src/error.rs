use thiserror::Error;

/// Shown whenever a failed generation carries no usable detail from the backend.
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to generate image. Please try again.";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Transport(String),
    #[error("backend returned HTTP {status}")]
    Status { status: u16, detail: Option<String> },
    #[error("backend reported an unsuccessful generation")]
    Rejected { detail: Option<String> },
    #[error("backend response did not include an image")]
    MissingImage { detail: Option<String> },
    #[error("malformed backend response: {0}")]
    Malformed(String),
}

impl GenerationError {
    pub fn detail(&self) -> Option<&str> {
        match self {
            GenerationError::Status { detail, .. }
            | GenerationError::Rejected { detail }
            | GenerationError::MissingImage { detail } => detail
                .as_deref()
                .map(str::trim)
                .filter(|detail| !detail.is_empty()),
            _ => None,
        }
    }

    /// Text for the error surface: the backend's detail when it sent one.
    pub fn user_message(&self) -> String {
        self.detail()
            .map(str::to_string)
            .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DataUriError {
    #[error("image reference is neither a data URI nor a URL")]
    UnsupportedReference,
    #[error("data URI is missing the ',' separator")]
    MissingPayload,
    #[error("data URI payload is not base64 encoded")]
    NotBase64,
    #[error("data URI payload failed to decode: {0}")]
    Decode(String),
    #[error("data URI payload is empty")]
    Empty,
}

#[derive(Debug, Error)]
pub enum ShareError {
    /// The user dismissed the share sheet.
    #[error("share cancelled")]
    Cancelled,
    #[error("sharing is not supported here")]
    Unsupported,
    #[error("share failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_prefers_backend_detail() {
        let err = GenerationError::Status {
            status: 500,
            detail: Some("quota exceeded".to_string()),
        };
        assert_eq!(err.user_message(), "quota exceeded");
    }

    #[test]
    fn user_message_falls_back_for_blank_or_missing_detail() {
        let blank = GenerationError::Rejected {
            detail: Some("   ".to_string()),
        };
        assert_eq!(blank.user_message(), GENERIC_FAILURE_MESSAGE);

        let transport = GenerationError::Transport("connection refused".to_string());
        assert_eq!(transport.user_message(), GENERIC_FAILURE_MESSAGE);
    }
}
