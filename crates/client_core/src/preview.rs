//! Preview grid derived from the attachment collection.

use std::sync::Arc;

use image::GenericImageView;
use shared::domain::AttachmentId;

use crate::attachments::Attachment;

/// Longest edge of a decoded preview thumbnail, in pixels.
pub const THUMBNAIL_MAX_DIMENSION: u32 = 240;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    pub rgba: Arc<[u8]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailState {
    Pending,
    Ready(Thumbnail),
    Failed(String),
}

/// The two controls on a preview tile. Each activates exactly one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileControl {
    Remove,
    Enlarge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewTile {
    pub index: usize,
    pub attachment_id: AttachmentId,
    pub file_name: String,
    pub thumbnail: ThumbnailState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviewGrid {
    pub tiles: Vec<PreviewTile>,
}

impl PreviewGrid {
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

pub fn render(attachments: &[Attachment]) -> PreviewGrid {
    PreviewGrid {
        tiles: attachments
            .iter()
            .map(|attachment| PreviewTile {
                index: attachment.index,
                attachment_id: attachment.id,
                file_name: attachment.file_name.clone(),
                thumbnail: attachment.thumbnail.clone(),
            })
            .collect(),
    }
}

/// Decodes `bytes` and downsizes to fit [`THUMBNAIL_MAX_DIMENSION`]. CPU bound;
/// run it on the blocking pool.
pub fn decode_thumbnail(bytes: &[u8]) -> Result<Thumbnail, String> {
    let decoded = image::load_from_memory(bytes).map_err(|err| err.to_string())?;
    let (orig_w, orig_h) = decoded.dimensions();
    let resized = if orig_w.max(orig_h) > THUMBNAIL_MAX_DIMENSION {
        decoded.thumbnail(THUMBNAIL_MAX_DIMENSION, THUMBNAIL_MAX_DIMENSION)
    } else {
        decoded
    };
    let rgba = resized.to_rgba8();
    Ok(Thumbnail {
        width: rgba.width(),
        height: rgba.height(),
        rgba: Arc::from(rgba.into_raw()),
    })
}
