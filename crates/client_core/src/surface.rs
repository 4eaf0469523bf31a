//! Notices, the result image, the fullscreen viewer, and download/share.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use shared::domain::{AttachmentId, NoticeId};

use crate::{
    error::{DataUriError, ShareError},
    transport::GeneratedImage,
};

pub const EMPTY_PROMPT_MESSAGE: &str = "Please enter a prompt describing the image you want.";
pub const SHARE_UNSUPPORTED_MESSAGE: &str =
    "Sharing is not supported on this device. Please use the download button instead.";
pub const SHARE_FAILED_MESSAGE: &str = "Failed to share image.";
pub const DOWNLOAD_FAILED_MESSAGE: &str = "Failed to download image.";
pub const BACKEND_UNCONFIGURED_MESSAGE: &str =
    "API key not configured. Please set GOOGLE_API_KEY on the server.";

pub fn capacity_message(max: usize) -> String {
    format!("Maximum {max} images allowed. Extra files were not added.")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceTimings {
    /// Wait before scrolling a fresh result into view, so layout can settle.
    pub result_scroll_delay: Duration,
    pub share_notice_timeout: Duration,
}

impl Default for SurfaceTimings {
    fn default() -> Self {
        Self {
            result_scroll_delay: Duration::from_millis(150),
            share_notice_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Validation,
    Capacity,
    Generation,
    Configuration,
    ShareUnsupported,
    ShareFailed,
    DownloadFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: NoticeId,
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollTarget {
    Error,
    Result,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Inline { mime_type: String, bytes: Vec<u8> },
    /// Fetched when the bytes are needed. Relative paths resolve against the server.
    Remote { url: String },
    /// Shown as-is; there is no way to turn it into a file.
    Opaque {
        reference: String,
        reason: DataUriError,
    },
}

impl ImageSource {
    /// Classifies a backend image reference. Anything that cannot be decoded
    /// or fetched is kept verbatim as [`ImageSource::Opaque`].
    pub fn from_reference(reference: &str) -> Self {
        parse_image_reference(reference).unwrap_or_else(|reason| ImageSource::Opaque {
            reference: reference.trim().to_string(),
            reason,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultImage {
    pub source: ImageSource,
    pub message: Option<String>,
    pub model_used: Option<String>,
}

impl ResultImage {
    pub fn mime_type(&self) -> &str {
        match &self.source {
            ImageSource::Inline { mime_type, .. } => mime_type.as_str(),
            ImageSource::Remote { url } => mime_guess::from_path(url)
                .first_raw()
                .filter(|mime| mime.starts_with("image/"))
                .unwrap_or("image/png"),
            ImageSource::Opaque { reference, .. } => reference
                .strip_prefix("data:")
                .and_then(|rest| rest.split([';', ',']).next())
                .filter(|mime| mime.starts_with("image/"))
                .unwrap_or("image/png"),
        }
    }
}

impl From<GeneratedImage> for ResultImage {
    fn from(generated: GeneratedImage) -> Self {
        Self {
            source: ImageSource::from_reference(&generated.image),
            message: generated.message,
            model_used: generated.model_used,
        }
    }
}

pub fn parse_image_reference(reference: &str) -> Result<ImageSource, DataUriError> {
    let trimmed = reference.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let absolute = lowered.starts_with("http://") || lowered.starts_with("https://");
    if absolute || trimmed.starts_with('/') {
        return Ok(ImageSource::Remote {
            url: trimmed.to_string(),
        });
    }
    if !lowered.starts_with("data:") {
        return Err(DataUriError::UnsupportedReference);
    }

    let (header, payload) = trimmed["data:".len()..]
        .split_once(',')
        .ok_or(DataUriError::MissingPayload)?;
    let mut params = header.split(';');
    let mime_type = params
        .next()
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .unwrap_or("image/png")
        .to_ascii_lowercase();
    if !params.any(|param| param.trim().eq_ignore_ascii_case("base64")) {
        return Err(DataUriError::NotBase64);
    }
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|err| DataUriError::Decode(err.to_string()))?;
    if bytes.is_empty() {
        return Err(DataUriError::Empty);
    }
    Ok(ImageSource::Inline { mime_type, bytes })
}

/// What the fullscreen viewer is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerImage {
    Result,
    Attachment(AttachmentId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerKey {
    Escape,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerInput {
    CloseButton,
    /// Click on the backdrop around the image.
    Outside,
    /// Click on the image itself.
    Image,
    Key(ViewerKey),
}

impl ViewerInput {
    pub fn closes_viewer(self) -> bool {
        matches!(
            self,
            ViewerInput::CloseButton | ViewerInput::Outside | ViewerInput::Key(ViewerKey::Escape)
        )
    }
}

/// An image offered to the user as a file, for download or sharing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub async fn save_into(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create download dir '{}'", dir.display()))?;
        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, &self.bytes)
            .await
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        Ok(path)
    }
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        _ => "png",
    }
}

pub fn download_file_name(mime_type: &str, now: DateTime<Utc>) -> String {
    format!(
        "monkee-{}.{}",
        now.timestamp_millis(),
        extension_for_mime(mime_type)
    )
}

/// A platform share capability.
#[async_trait]
pub trait ShareTarget: Send + Sync {
    /// Whether this target can accept `file` as an attachment.
    fn can_share(&self, file: &ImageFile) -> bool;
    async fn share(&self, file: ImageFile) -> Result<(), ShareError>;
}

/// Stand-in for platforms with no share capability at all.
pub struct UnsupportedShare;

#[async_trait]
impl ShareTarget for UnsupportedShare {
    fn can_share(&self, _file: &ImageFile) -> bool {
        false
    }

    async fn share(&self, _file: ImageFile) -> Result<(), ShareError> {
        Err(ShareError::Unsupported)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOutcome {
    Shared,
    Cancelled,
    Unsupported,
    Failed,
    NothingToShare,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parses_base64_data_uri() {
        let source = parse_image_reference("data:image/png;base64,AQID").expect("parse");
        assert_eq!(
            source,
            ImageSource::Inline {
                mime_type: "image/png".to_string(),
                bytes: vec![1, 2, 3],
            }
        );
    }

    #[test]
    fn keeps_remote_references() {
        let source = parse_image_reference(" https://cdn.example/out.webp ").expect("parse");
        assert_eq!(
            source,
            ImageSource::Remote {
                url: "https://cdn.example/out.webp".to_string()
            }
        );
    }

    #[test]
    fn keeps_server_relative_paths_as_remote() {
        assert_eq!(
            parse_image_reference("/static/out.png"),
            Ok(ImageSource::Remote {
                url: "/static/out.png".to_string()
            })
        );
    }

    #[test]
    fn undecodable_references_stay_opaque() {
        let blob = ImageSource::from_reference("blob:http://localhost/1234");
        assert_eq!(
            blob,
            ImageSource::Opaque {
                reference: "blob:http://localhost/1234".to_string(),
                reason: DataUriError::UnsupportedReference,
            }
        );

        let svg = ResultImage::from(GeneratedImage {
            image: "data:image/svg+xml,%3Csvg%2F%3E".to_string(),
            message: None,
            model_used: None,
        });
        assert!(matches!(
            svg.source,
            ImageSource::Opaque {
                reason: DataUriError::NotBase64,
                ..
            }
        ));
        assert_eq!(svg.mime_type(), "image/svg+xml");
    }

    #[test]
    fn rejects_malformed_references() {
        assert_eq!(
            parse_image_reference("AQID"),
            Err(DataUriError::UnsupportedReference)
        );
        assert_eq!(
            parse_image_reference("data:image/png;base64"),
            Err(DataUriError::MissingPayload)
        );
        assert_eq!(
            parse_image_reference("data:image/svg+xml,<svg/>"),
            Err(DataUriError::NotBase64)
        );
        assert!(matches!(
            parse_image_reference("data:image/png;base64,@@@"),
            Err(DataUriError::Decode(_))
        ));
        assert_eq!(
            parse_image_reference("data:image/png;base64,"),
            Err(DataUriError::Empty)
        );
    }

    #[test]
    fn download_name_uses_timestamp_and_mime_extension() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(download_file_name("image/png", now), "monkee-1700000000123.png");
        assert_eq!(download_file_name("image/jpeg", now), "monkee-1700000000123.jpg");
        assert_eq!(
            download_file_name("application/octet-stream", now),
            "monkee-1700000000123.png"
        );
    }

    #[test]
    fn viewer_closes_only_on_dismiss_inputs() {
        assert!(ViewerInput::CloseButton.closes_viewer());
        assert!(ViewerInput::Outside.closes_viewer());
        assert!(ViewerInput::Key(ViewerKey::Escape).closes_viewer());
        assert!(!ViewerInput::Image.closes_viewer());
        assert!(!ViewerInput::Key(ViewerKey::Other).closes_viewer());
    }

    #[test]
    fn remote_result_mime_is_guessed_from_url() {
        let result = ResultImage {
            source: ImageSource::Remote {
                url: "https://cdn.example/out.jpg".to_string(),
            },
            message: None,
            model_used: None,
        };
        assert_eq!(result.mime_type(), "image/jpeg");
    }

    #[tokio::test]
    async fn save_into_writes_file_under_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = ImageFile {
            file_name: "monkee-1.png".to_string(),
            mime_type: "image/png".to_string(),
            bytes: vec![9, 9],
        };
        let path = file.save_into(&dir.path().join("nested")).await.expect("save");
        assert_eq!(tokio::fs::read(&path).await.expect("read"), vec![9, 9]);
    }
}
