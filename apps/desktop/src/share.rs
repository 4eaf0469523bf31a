use std::{
    borrow::Cow,
    sync::{Arc, Mutex},
};

use arboard::{Clipboard, ImageData};
use async_trait::async_trait;
use client_core::{ImageFile, ShareError, ShareTarget, UnsupportedShare};
use tracing::debug;

/// Shares a result by placing its pixels on the system clipboard.
///
/// The clipboard handle lives as long as the share target; on X11 and
/// Wayland the copied image is only served while its owner is alive.
pub struct ClipboardShare {
    clipboard: Arc<Mutex<Clipboard>>,
}

impl ClipboardShare {
    /// Falls back to [`UnsupportedShare`] when no clipboard can be opened,
    /// e.g. on a headless session.
    pub fn detect() -> Arc<dyn ShareTarget> {
        match Clipboard::new() {
            Ok(clipboard) => Arc::new(ClipboardShare {
                clipboard: Arc::new(Mutex::new(clipboard)),
            }),
            Err(err) => {
                debug!(error = %err, "clipboard unavailable; sharing disabled");
                Arc::new(UnsupportedShare)
            }
        }
    }
}

#[async_trait]
impl ShareTarget for ClipboardShare {
    fn can_share(&self, file: &ImageFile) -> bool {
        is_image(file)
    }

    async fn share(&self, file: ImageFile) -> Result<(), ShareError> {
        let clipboard = Arc::clone(&self.clipboard);
        tokio::task::spawn_blocking(move || {
            let pixels = clipboard_pixels(&file)?;
            let mut clipboard = clipboard
                .lock()
                .map_err(|_| "clipboard handle poisoned".to_string())?;
            clipboard.set_image(pixels).map_err(|err| err.to_string())
        })
        .await
        .map_err(|err| ShareError::Failed(err.to_string()))?
        .map_err(ShareError::Failed)
    }
}

fn is_image(file: &ImageFile) -> bool {
    file.mime_type.starts_with("image/")
}

/// Decodes `file` into the RGBA layout the clipboard expects.
fn clipboard_pixels(file: &ImageFile) -> Result<ImageData<'static>, String> {
    let rgba = image::load_from_memory(&file.bytes)
        .map_err(|err| format!("cannot decode {}: {err}", file.file_name))?
        .into_rgba8();
    Ok(ImageData {
        width: rgba.width() as usize,
        height: rgba.height() as usize,
        bytes: Cow::Owned(rgba.into_raw()),
    })
}
