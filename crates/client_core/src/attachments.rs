//! Bounded, ordered collection of reference images for the next generation.

use std::{path::Path, sync::Arc};

use shared::domain::{AttachmentId, MAX_ATTACHMENTS};

use crate::{preview::ThumbnailState, transport::ImagePart};

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// Where a batch of candidate files came from. Drag-drop batches may contain
/// arbitrary files and are filtered down to images; picker batches are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSource {
    Picker,
    DragDrop,
}

#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl CandidateFile {
    /// Builds a candidate, guessing the MIME type from the file name.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_guess::from_path(&file_name)
            .first_raw()
            .map(str::to_string);
        Self {
            file_name,
            mime_type,
            bytes,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub async fn read(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("image")
            .to_string();
        Ok(Self::new(file_name, bytes))
    }

    pub fn is_image(&self) -> bool {
        self.mime_type
            .as_deref()
            .map(|mime| mime.to_ascii_lowercase().starts_with("image/"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub id: AttachmentId,
    /// Position in the collection; always equal to the slot it occupies.
    pub index: usize,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Arc<[u8]>,
    pub thumbnail: ThumbnailState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOutcome {
    pub accepted: Vec<AttachmentId>,
    /// Non-image files removed from a drag-drop batch.
    pub filtered: usize,
    /// Images dropped because the collection was full.
    pub dropped: usize,
}

impl AddOutcome {
    pub fn capacity_exceeded(&self) -> bool {
        self.dropped > 0
    }
}

#[derive(Debug)]
pub struct AttachmentManager {
    items: Vec<Attachment>,
    capacity: usize,
    next_id: u64,
}

impl Default for AttachmentManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AttachmentManager {
    pub fn new() -> Self {
        Self::with_capacity(MAX_ATTACHMENTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            next_id: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.items.len())
    }

    pub fn items(&self) -> &[Attachment] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&Attachment> {
        self.items.get(index)
    }

    pub fn find(&self, id: AttachmentId) -> Option<&Attachment> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Appends as many files as fit, in input order. Never fails.
    pub fn add(
        &mut self,
        files: impl IntoIterator<Item = CandidateFile>,
        source: FileSource,
    ) -> AddOutcome {
        let mut outcome = AddOutcome::default();

        for file in files {
            if source == FileSource::DragDrop && !file.is_image() {
                outcome.filtered += 1;
                continue;
            }
            if self.remaining() == 0 {
                outcome.dropped += 1;
                continue;
            }

            let id = AttachmentId(self.next_id);
            self.next_id += 1;
            self.items.push(Attachment {
                id,
                index: self.items.len(),
                file_name: file.file_name,
                mime_type: file
                    .mime_type
                    .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string()),
                bytes: Arc::from(file.bytes),
                thumbnail: ThumbnailState::Pending,
            });
            outcome.accepted.push(id);
        }

        outcome
    }

    /// Removes the attachment at `index` and re-indexes everything after it.
    /// Out-of-range indices are ignored.
    pub fn remove(&mut self, index: usize) -> Option<Attachment> {
        if index >= self.items.len() {
            return None;
        }
        let removed = self.items.remove(index);
        self.reindex();
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Records a finished thumbnail decode. Returns the attachment's current
    /// index, or `None` when it was removed while decoding.
    pub fn set_thumbnail(&mut self, id: AttachmentId, thumbnail: ThumbnailState) -> Option<usize> {
        let item = self.items.iter_mut().find(|item| item.id == id)?;
        item.thumbnail = thumbnail;
        Some(item.index)
    }

    /// Request parts for every attachment, in collection order.
    pub fn image_parts(&self) -> Vec<ImagePart> {
        self.items
            .iter()
            .map(|item| ImagePart {
                file_name: item.file_name.clone(),
                mime_type: item.mime_type.clone(),
                bytes: item.bytes.to_vec(),
            })
            .collect()
    }

    fn reindex(&mut self) {
        for (index, item) in self.items.iter_mut().enumerate() {
            item.index = index;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(name: &str) -> CandidateFile {
        CandidateFile::new(name, vec![1, 2, 3])
    }

    fn assert_contiguous(manager: &AttachmentManager) {
        for (slot, item) in manager.items().iter().enumerate() {
            assert_eq!(item.index, slot, "index gap at slot {slot}");
        }
    }

    #[test]
    fn guesses_mime_type_from_file_name() {
        assert_eq!(png("cat.png").mime_type.as_deref(), Some("image/png"));
        assert!(png("cat.JPG").is_image());
        assert!(!CandidateFile::new("notes.txt", Vec::new()).is_image());
        assert!(!CandidateFile::new("no-extension", Vec::new()).is_image());
    }

    #[test]
    fn add_never_exceeds_capacity() {
        let mut manager = AttachmentManager::new();
        let outcome = manager.add((0..15).map(|i| png(&format!("{i}.png"))), FileSource::Picker);

        assert_eq!(manager.len(), MAX_ATTACHMENTS);
        assert_eq!(outcome.accepted.len(), MAX_ATTACHMENTS);
        assert_eq!(outcome.dropped, 1);
        assert!(outcome.capacity_exceeded());

        let again = manager.add([png("late.png")], FileSource::Picker);
        assert!(again.accepted.is_empty());
        assert_eq!(again.dropped, 1);
        assert_eq!(manager.len(), MAX_ATTACHMENTS);
    }

    #[test]
    fn add_keeps_input_order_and_fills_remaining_slots() {
        let mut manager = AttachmentManager::with_capacity(3);
        manager.add([png("a.png")], FileSource::Picker);
        let outcome = manager.add(
            [png("b.png"), png("c.png"), png("d.png")],
            FileSource::Picker,
        );

        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(outcome.dropped, 1);
        let names: Vec<_> = manager.items().iter().map(|i| i.file_name.as_str()).collect();
        assert_eq!(names, ["a.png", "b.png", "c.png"]);
        assert_contiguous(&manager);
    }

    #[test]
    fn drag_drop_filters_non_images_but_picker_does_not() {
        let mut manager = AttachmentManager::new();
        let dropped = manager.add(
            [
                png("a.png"),
                CandidateFile::new("readme.md", b"hi".to_vec()),
                CandidateFile::new("blob", Vec::new()).with_mime_type("image/webp"),
            ],
            FileSource::DragDrop,
        );
        assert_eq!(dropped.accepted.len(), 2);
        assert_eq!(dropped.filtered, 1);
        assert!(!dropped.capacity_exceeded());

        let picked = manager.add(
            [CandidateFile::new("scan.heic", vec![0])],
            FileSource::Picker,
        );
        assert_eq!(picked.accepted.len(), 1);
        assert_eq!(manager.len(), 3);
    }

    #[test]
    fn filtered_files_do_not_count_against_capacity() {
        let mut manager = AttachmentManager::with_capacity(1);
        let outcome = manager.add(
            [CandidateFile::new("a.txt", Vec::new()), png("b.png")],
            FileSource::DragDrop,
        );
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.dropped, 0);
    }

    #[test]
    fn remove_reindexes_contiguously_in_original_order() {
        let mut manager = AttachmentManager::new();
        manager.add(
            ["a", "b", "c", "d", "e"].map(|n| png(&format!("{n}.png"))),
            FileSource::Picker,
        );

        let removed = manager.remove(1).expect("removed");
        assert_eq!(removed.file_name, "b.png");
        manager.remove(0).expect("removed");
        assert_contiguous(&manager);

        let names: Vec<_> = manager.items().iter().map(|i| i.file_name.as_str()).collect();
        assert_eq!(names, ["c.png", "d.png", "e.png"]);
    }

    #[test]
    fn remove_out_of_range_is_a_no_op() {
        let mut manager = AttachmentManager::new();
        manager.add([png("a.png")], FileSource::Picker);
        assert!(manager.remove(1).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn ids_are_never_reused_after_removal() {
        let mut manager = AttachmentManager::new();
        let first = manager.add([png("a.png")], FileSource::Picker).accepted[0];
        manager.remove(0);
        let second = manager.add([png("a.png")], FileSource::Picker).accepted[0];
        assert_ne!(first, second);
    }

    #[test]
    fn thumbnail_for_removed_attachment_is_ignored() {
        let mut manager = AttachmentManager::new();
        let outcome = manager.add([png("a.png"), png("b.png")], FileSource::Picker);
        manager.remove(0);

        assert_eq!(
            manager.set_thumbnail(outcome.accepted[0], ThumbnailState::Failed("x".into())),
            None
        );
        assert_eq!(
            manager.set_thumbnail(outcome.accepted[1], ThumbnailState::Failed("x".into())),
            Some(0)
        );
    }

    #[test]
    fn image_parts_preserve_order_and_bytes() {
        let mut manager = AttachmentManager::new();
        manager.add(
            [
                CandidateFile::new("a.png", vec![1]),
                CandidateFile::new("b.jpg", vec![2, 2]),
            ],
            FileSource::Picker,
        );
        let parts = manager.image_parts();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].bytes, vec![1]);
        assert_eq!(parts[1].file_name, "b.jpg");
        assert_eq!(parts[1].mime_type, "image/jpeg");
    }
}
