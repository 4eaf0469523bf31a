use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use shared::domain::{AspectRatio, AttachmentId, ModelId, NoticeId};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub mod attachments;
pub mod error;
pub mod generation;
pub mod preview;
pub mod surface;
pub mod transport;

pub use attachments::{AddOutcome, Attachment, AttachmentManager, CandidateFile, FileSource};
pub use error::{GenerationError, ShareError, GENERIC_FAILURE_MESSAGE};
pub use generation::{GenerateOutcome, GenerationState, TriggerControl};
pub use preview::{PreviewGrid, PreviewTile, Thumbnail, ThumbnailState, TileControl};
pub use surface::{
    ImageFile, ImageSource, Notice, NoticeKind, ResultImage, ScrollTarget, ShareOutcome,
    ShareTarget, SurfaceTimings, UnsupportedShare, ViewerImage, ViewerInput, ViewerKey,
};
pub use transport::{GeneratedImage, GenerationBackend, GenerationRequest, HttpBackend, ImagePart};

use surface::{
    capacity_message, download_file_name, BACKEND_UNCONFIGURED_MESSAGE, DOWNLOAD_FAILED_MESSAGE,
    EMPTY_PROMPT_MESSAGE, SHARE_FAILED_MESSAGE, SHARE_UNSUPPORTED_MESSAGE,
};

#[derive(Debug, Clone)]
pub enum SessionEvent {
    PreviewsChanged,
    ThumbnailReady {
        attachment_id: AttachmentId,
        index: usize,
    },
    ThumbnailFailed {
        attachment_id: AttachmentId,
        reason: String,
    },
    PromptChanged {
        length: usize,
    },
    TriggerChanged(TriggerControl),
    GenerationStarted,
    GenerationSucceeded(Arc<ResultImage>),
    GenerationFailed(String),
    NoticeShown(Notice),
    NoticeCleared(NoticeId),
    ScrollIntoView(ScrollTarget),
    ViewerOpened(ViewerImage),
    ViewerClosed,
    FocusPrompt,
    Reset,
}

/// Point-in-time view of everything a surface renders.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub prompt: String,
    pub prompt_length: usize,
    pub aspect_ratio: AspectRatio,
    pub model: Option<ModelId>,
    pub previews: PreviewGrid,
    pub generation: GenerationState,
    pub trigger: TriggerControl,
    pub error: Option<Notice>,
    /// The displayed result; `None` while hidden.
    pub result: Option<Arc<ResultImage>>,
    pub viewer: Option<ViewerImage>,
    pub backend_configured: Option<bool>,
}

impl SessionSnapshot {
    pub fn attachment_count(&self) -> usize {
        self.previews.len()
    }
}

/// Controller for one generation session: attachments, prompt, the single
/// generation slot, and the surface state derived from them.
pub struct Session {
    backend: Arc<dyn GenerationBackend>,
    timings: SurfaceTimings,
    inner: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

struct SessionState {
    attachments: AttachmentManager,
    prompt: String,
    aspect_ratio: AspectRatio,
    model: Option<ModelId>,
    generation: GenerationState,
    result: Option<Arc<ResultImage>>,
    result_visible: bool,
    error: Option<Notice>,
    viewer: Option<ViewerImage>,
    backend_configured: Option<bool>,
    next_notice_id: u64,
    /// Bumped by every reset so late completions can tell they are stale.
    epoch: u64,
}

impl SessionState {
    fn new() -> Self {
        Self {
            attachments: AttachmentManager::new(),
            prompt: String::new(),
            aspect_ratio: AspectRatio::default(),
            model: None,
            generation: GenerationState::Idle,
            result: None,
            result_visible: false,
            error: None,
            viewer: None,
            backend_configured: None,
            next_notice_id: 0,
            epoch: 0,
        }
    }

    fn trigger(&self) -> TriggerControl {
        TriggerControl::evaluate(&self.prompt, &self.generation)
    }

    fn visible_result(&self) -> Option<Arc<ResultImage>> {
        if self.result_visible {
            self.result.clone()
        } else {
            None
        }
    }
}

/// Clears a stranded `InFlight` if a `generate` future is dropped before it
/// records its outcome.
struct InFlightGuard {
    session: Arc<Session>,
    armed: bool,
}

impl InFlightGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let session = Arc::clone(&self.session);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                session.abandon_generation().await;
            });
        }
    }
}

impl Session {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Arc<Self> {
        Self::with_timings(backend, SurfaceTimings::default())
    }

    pub fn with_timings(
        backend: Arc<dyn GenerationBackend>,
        timings: SurfaceTimings,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            backend,
            timings,
            inner: Mutex::new(SessionState::new()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.lock().await;
        SessionSnapshot {
            prompt: state.prompt.clone(),
            prompt_length: state.prompt.chars().count(),
            aspect_ratio: state.aspect_ratio,
            model: state.model,
            previews: preview::render(state.attachments.items()),
            generation: state.generation.clone(),
            trigger: state.trigger(),
            error: state.error.clone(),
            result: state.visible_result(),
            viewer: state.viewer,
            backend_configured: state.backend_configured,
        }
    }

    pub async fn trigger(&self) -> TriggerControl {
        self.inner.lock().await.trigger()
    }

    pub async fn preview_grid(&self) -> PreviewGrid {
        let state = self.inner.lock().await;
        preview::render(state.attachments.items())
    }

    /// Asks the backend whether it can serve generations. Surfaces a
    /// configuration notice when it cannot.
    pub async fn check_health(&self) -> Result<bool> {
        let health = self
            .backend
            .health()
            .await
            .context("backend health check failed")?;
        let mut state = self.inner.lock().await;
        state.backend_configured = Some(health.api_configured);
        info!(
            status = %health.status,
            api_configured = health.api_configured,
            "backend health checked"
        );
        if !health.api_configured {
            self.show_notice(
                &mut state,
                NoticeKind::Configuration,
                BACKEND_UNCONFIGURED_MESSAGE,
            );
        }
        Ok(health.api_configured)
    }

    pub async fn set_prompt(&self, prompt: impl Into<String>) {
        let mut state = self.inner.lock().await;
        state.prompt = prompt.into();
        self.clear_error(&mut state);
        self.emit(SessionEvent::PromptChanged {
            length: state.prompt.chars().count(),
        });
        self.emit_trigger(&state);
    }

    pub async fn set_aspect_ratio(&self, aspect_ratio: AspectRatio) {
        let mut state = self.inner.lock().await;
        state.aspect_ratio = aspect_ratio;
        debug!(%aspect_ratio, "aspect ratio selected");
    }

    pub async fn set_model(&self, model: Option<ModelId>) {
        let mut state = self.inner.lock().await;
        state.model = model;
        debug!(model = ?model, "model selected");
    }

    /// Accepts as many files as fit and starts a thumbnail decode for each.
    pub async fn add_files(
        self: &Arc<Self>,
        files: Vec<CandidateFile>,
        source: FileSource,
    ) -> AddOutcome {
        let (outcome, decodes) = {
            let mut state = self.inner.lock().await;
            let outcome = state.attachments.add(files, source);
            if outcome.capacity_exceeded() {
                let max = state.attachments.capacity();
                self.show_notice(&mut state, NoticeKind::Capacity, capacity_message(max));
            }
            let decodes: Vec<(AttachmentId, Arc<[u8]>)> = outcome
                .accepted
                .iter()
                .filter_map(|id| state.attachments.find(*id))
                .map(|attachment| (attachment.id, Arc::clone(&attachment.bytes)))
                .collect();
            info!(
                accepted = outcome.accepted.len(),
                filtered = outcome.filtered,
                dropped = outcome.dropped,
                total = state.attachments.len(),
                "attachments added"
            );
            if !outcome.accepted.is_empty() {
                self.emit(SessionEvent::PreviewsChanged);
            }
            (outcome, decodes)
        };

        for (attachment_id, bytes) in decodes {
            self.spawn_thumbnail_decode(attachment_id, bytes);
        }
        outcome
    }

    /// Removes the attachment at `index`; out-of-range indices are ignored.
    pub async fn remove_attachment(&self, index: usize) -> bool {
        let mut state = self.inner.lock().await;
        let Some(removed) = state.attachments.remove(index) else {
            debug!(index, "ignoring remove for out-of-range attachment");
            return false;
        };
        if state.viewer == Some(ViewerImage::Attachment(removed.id)) {
            state.viewer = None;
            self.emit(SessionEvent::ViewerClosed);
        }
        info!(
            index,
            file_name = %removed.file_name,
            remaining = state.attachments.len(),
            "attachment removed"
        );
        self.emit(SessionEvent::PreviewsChanged);
        true
    }

    pub async fn clear_attachments(&self) {
        let mut state = self.inner.lock().await;
        if state.attachments.is_empty() {
            return;
        }
        state.attachments.clear();
        if matches!(state.viewer, Some(ViewerImage::Attachment(_))) {
            state.viewer = None;
            self.emit(SessionEvent::ViewerClosed);
        }
        self.emit(SessionEvent::PreviewsChanged);
    }

    /// Activates one control on the preview tile at `index`.
    pub async fn activate_tile(&self, index: usize, control: TileControl) -> bool {
        match control {
            TileControl::Remove => self.remove_attachment(index).await,
            TileControl::Enlarge => {
                let attachment_id = {
                    let state = self.inner.lock().await;
                    state.attachments.get(index).map(|attachment| attachment.id)
                };
                match attachment_id {
                    Some(id) => self.open_viewer(ViewerImage::Attachment(id)).await,
                    None => false,
                }
            }
        }
    }

    pub async fn open_viewer(&self, image: ViewerImage) -> bool {
        let mut state = self.inner.lock().await;
        let available = match image {
            ViewerImage::Result => state.result_visible && state.result.is_some(),
            ViewerImage::Attachment(id) => state.attachments.find(id).is_some(),
        };
        if !available {
            return false;
        }
        state.viewer = Some(image);
        self.emit(SessionEvent::ViewerOpened(image));
        true
    }

    /// Feeds a pointer/key input to the fullscreen viewer. Returns whether it closed.
    pub async fn viewer_input(&self, input: ViewerInput) -> bool {
        let mut state = self.inner.lock().await;
        if state.viewer.is_none() || !input.closes_viewer() {
            return false;
        }
        state.viewer = None;
        self.emit(SessionEvent::ViewerClosed);
        true
    }

    /// Bytes of the image currently open in the viewer.
    pub async fn viewer_file(&self) -> Result<Option<ImageFile>> {
        let viewer = self.inner.lock().await.viewer;
        match viewer {
            None => Ok(None),
            Some(ViewerImage::Result) => self.result_file().await,
            Some(ViewerImage::Attachment(id)) => {
                let state = self.inner.lock().await;
                Ok(state.attachments.find(id).map(|attachment| ImageFile {
                    file_name: attachment.file_name.clone(),
                    mime_type: attachment.mime_type.clone(),
                    bytes: attachment.bytes.to_vec(),
                }))
            }
        }
    }

    /// Sends the current prompt, ratio, model, and attachments as one request.
    /// A call while another request is in flight does nothing.
    pub async fn generate(self: &Arc<Self>) -> GenerateOutcome {
        let (request, epoch) = {
            let mut state = self.inner.lock().await;
            if state.generation.is_in_flight() {
                debug!("generation already in flight; ignoring request");
                return GenerateOutcome::Ignored;
            }

            let prompt = state.prompt.trim().to_string();
            if prompt.is_empty() {
                self.show_notice(&mut state, NoticeKind::Validation, EMPTY_PROMPT_MESSAGE);
                return GenerateOutcome::Rejected(EMPTY_PROMPT_MESSAGE.to_string());
            }

            state.generation = GenerationState::InFlight;
            self.clear_error(&mut state);
            state.result_visible = false;
            if state.viewer == Some(ViewerImage::Result) {
                state.viewer = None;
                self.emit(SessionEvent::ViewerClosed);
            }
            self.emit(SessionEvent::GenerationStarted);
            self.emit_trigger(&state);

            let request = GenerationRequest {
                prompt,
                aspect_ratio: state.aspect_ratio,
                model: state.model,
                images: state.attachments.image_parts(),
            };
            (request, state.epoch)
        };

        let guard = InFlightGuard {
            session: Arc::clone(self),
            armed: true,
        };
        info!(
            aspect_ratio = %request.aspect_ratio,
            model = ?request.model,
            images = request.images.len(),
            prompt_len = request.prompt.chars().count(),
            "generation started"
        );

        let result = self.backend.generate(request).await.map(ResultImage::from);
        let outcome = self.finish_generation(epoch, result).await;
        guard.disarm();
        outcome
    }

    /// The displayed result as a downloadable file. A result that cannot be
    /// turned into bytes surfaces a download notice.
    pub async fn download_offer(&self) -> Result<Option<ImageFile>> {
        match self.result_file().await {
            Ok(file) => Ok(file),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "could not prepare result for download");
                let mut state = self.inner.lock().await;
                self.show_notice(
                    &mut state,
                    NoticeKind::DownloadFailed,
                    DOWNLOAD_FAILED_MESSAGE,
                );
                Err(err)
            }
        }
    }

    async fn result_file(&self) -> Result<Option<ImageFile>> {
        let result = self.inner.lock().await.visible_result();
        let Some(result) = result else {
            return Ok(None);
        };

        let bytes = match &result.source {
            ImageSource::Inline { bytes, .. } => bytes.clone(),
            ImageSource::Remote { url } => self
                .backend
                .fetch_image(url)
                .await
                .with_context(|| format!("failed to fetch result image from {url}"))?,
            ImageSource::Opaque { reason, .. } => {
                return Err(anyhow::Error::new(reason.clone())
                    .context("result image cannot be saved as a file"));
            }
        };
        let mime_type = result.mime_type().to_string();
        Ok(Some(ImageFile {
            file_name: download_file_name(&mime_type, Utc::now()),
            mime_type,
            bytes,
        }))
    }

    pub async fn share(self: &Arc<Self>, target: &dyn ShareTarget) -> ShareOutcome {
        let file = match self.result_file().await {
            Ok(Some(file)) => file,
            Ok(None) => return ShareOutcome::NothingToShare,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "could not prepare result for sharing");
                let mut state = self.inner.lock().await;
                self.show_notice(&mut state, NoticeKind::ShareFailed, SHARE_FAILED_MESSAGE);
                return ShareOutcome::Failed;
            }
        };

        if !target.can_share(&file) {
            self.show_share_unsupported().await;
            return ShareOutcome::Unsupported;
        }

        let file_name = file.file_name.clone();
        match target.share(file).await {
            Ok(()) => {
                info!(%file_name, "result shared");
                ShareOutcome::Shared
            }
            Err(ShareError::Cancelled) => {
                debug!("share cancelled by user");
                ShareOutcome::Cancelled
            }
            Err(ShareError::Unsupported) => {
                self.show_share_unsupported().await;
                ShareOutcome::Unsupported
            }
            Err(err) => {
                warn!(error = %err, "share failed");
                let mut state = self.inner.lock().await;
                self.show_notice(&mut state, NoticeKind::ShareFailed, SHARE_FAILED_MESSAGE);
                ShareOutcome::Failed
            }
        }
    }

    /// Returns the session to its initial values. An in-flight request keeps
    /// the slot busy until it finishes; its outcome is then dropped.
    pub async fn reset(&self) {
        let mut state = self.inner.lock().await;
        state.epoch += 1;
        state.attachments.clear();
        state.prompt.clear();
        state.result = None;
        state.result_visible = false;
        self.clear_error(&mut state);
        if state.viewer.take().is_some() {
            self.emit(SessionEvent::ViewerClosed);
        }
        if !state.generation.is_in_flight() {
            state.generation = GenerationState::Idle;
        }
        info!(epoch = state.epoch, "session reset");

        self.emit(SessionEvent::Reset);
        self.emit(SessionEvent::PreviewsChanged);
        self.emit(SessionEvent::PromptChanged { length: 0 });
        self.emit_trigger(&state);
        self.emit(SessionEvent::FocusPrompt);
    }

    async fn finish_generation(
        self: &Arc<Self>,
        epoch: u64,
        result: Result<ResultImage, GenerationError>,
    ) -> GenerateOutcome {
        let mut state = self.inner.lock().await;
        if state.epoch != epoch {
            state.generation = GenerationState::Idle;
            info!("session was reset during generation; discarding outcome");
            self.emit_trigger(&state);
            return GenerateOutcome::Discarded;
        }

        let outcome = match result {
            Ok(image) => {
                let image = Arc::new(image);
                info!(model_used = ?image.model_used, "generation succeeded");
                if let ImageSource::Opaque { reason, .. } = &image.source {
                    debug!(%reason, "result reference cannot be decoded; showing it as-is");
                }
                state.generation = GenerationState::Succeeded(Arc::clone(&image));
                state.result = Some(Arc::clone(&image));
                state.result_visible = true;
                self.emit(SessionEvent::GenerationSucceeded(Arc::clone(&image)));
                self.schedule_result_scroll(epoch);
                GenerateOutcome::Succeeded(image)
            }
            Err(err) => {
                let message = err.user_message();
                warn!(error = %err, "generation failed");
                state.generation = GenerationState::Failed(message.clone());
                self.emit(SessionEvent::GenerationFailed(message.clone()));
                self.show_notice(&mut state, NoticeKind::Generation, message.clone());
                GenerateOutcome::Failed(message)
            }
        };
        self.emit_trigger(&state);
        outcome
    }

    async fn abandon_generation(&self) {
        let mut state = self.inner.lock().await;
        if state.generation.is_in_flight() {
            warn!("generation dropped before completing; releasing slot");
            state.generation = GenerationState::Idle;
            self.emit_trigger(&state);
        }
    }

    fn spawn_thumbnail_decode(self: &Arc<Self>, attachment_id: AttachmentId, bytes: Arc<[u8]>) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let decoded = tokio::task::spawn_blocking(move || preview::decode_thumbnail(&bytes))
                .await
                .unwrap_or_else(|err| Err(format!("thumbnail task failed: {err}")));
            session.apply_thumbnail(attachment_id, decoded).await;
        });
    }

    async fn apply_thumbnail(
        &self,
        attachment_id: AttachmentId,
        decoded: Result<Thumbnail, String>,
    ) {
        let thumbnail = match decoded {
            Ok(thumbnail) => ThumbnailState::Ready(thumbnail),
            Err(reason) => ThumbnailState::Failed(reason),
        };
        let mut state = self.inner.lock().await;
        let Some(index) = state
            .attachments
            .set_thumbnail(attachment_id, thumbnail.clone())
        else {
            debug!(
                attachment_id = attachment_id.0,
                "attachment removed before its thumbnail finished decoding"
            );
            return;
        };

        match thumbnail {
            ThumbnailState::Failed(reason) => {
                debug!(attachment_id = attachment_id.0, %reason, "thumbnail decode failed");
                self.emit(SessionEvent::ThumbnailFailed {
                    attachment_id,
                    reason,
                });
            }
            _ => self.emit(SessionEvent::ThumbnailReady {
                attachment_id,
                index,
            }),
        }
    }

    fn schedule_result_scroll(self: &Arc<Self>, epoch: u64) {
        let session = Arc::clone(self);
        let delay = self.timings.result_scroll_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let state = session.inner.lock().await;
            if state.epoch == epoch && state.result_visible {
                session.emit(SessionEvent::ScrollIntoView(ScrollTarget::Result));
            }
        });
    }

    async fn show_share_unsupported(self: &Arc<Self>) {
        let notice = {
            let mut state = self.inner.lock().await;
            self.show_notice(
                &mut state,
                NoticeKind::ShareUnsupported,
                SHARE_UNSUPPORTED_MESSAGE,
            )
        };
        let session = Arc::clone(self);
        let timeout = self.timings.share_notice_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut state = session.inner.lock().await;
            if state.error.as_ref().map(|current| current.id) == Some(notice.id) {
                session.clear_error(&mut state);
            }
        });
    }

    fn show_notice(
        &self,
        state: &mut SessionState,
        kind: NoticeKind,
        message: impl Into<String>,
    ) -> Notice {
        state.next_notice_id += 1;
        let notice = Notice {
            id: NoticeId(state.next_notice_id),
            kind,
            message: message.into(),
        };
        state.error = Some(notice.clone());
        self.emit(SessionEvent::NoticeShown(notice.clone()));
        self.emit(SessionEvent::ScrollIntoView(ScrollTarget::Error));
        notice
    }

    fn clear_error(&self, state: &mut SessionState) {
        if let Some(notice) = state.error.take() {
            self.emit(SessionEvent::NoticeCleared(notice.id));
        }
    }

    fn emit_trigger(&self, state: &SessionState) {
        self.emit(SessionEvent::TriggerChanged(state.trigger()));
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
