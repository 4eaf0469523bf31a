//! HTTP side of the generation workflow.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use shared::{
    domain::{AspectRatio, ModelId},
    error::ErrorDetail,
    protocol::{
        GenerateResponse, HealthResponse, FIELD_ASPECT_RATIO, FIELD_IMAGES, FIELD_MODEL,
        FIELD_PROMPT, GENERATE_PATH, HEALTH_PATH,
    },
};
use tracing::debug;
use url::Url;

use crate::error::GenerationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePart {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub model: Option<ModelId>,
    pub images: Vec<ImagePart>,
}

/// A successful generation as reported by the backend, before the image
/// reference is decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub image: String,
    pub message: Option<String>,
    pub model_used: Option<String>,
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn health(&self) -> Result<HealthResponse>;
    async fn generate(&self, request: GenerationRequest)
        -> Result<GeneratedImage, GenerationError>;
    /// Fetches a result image that was returned by reference instead of inline.
    /// `url` may be relative to the server.
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>>;
}

/// Maps a raw generate response onto success or a typed failure.
pub fn interpret_generate_response(
    status: u16,
    body: &[u8],
) -> Result<GeneratedImage, GenerationError> {
    if !(200..300).contains(&status) {
        let detail = serde_json::from_slice::<ErrorDetail>(body)
            .ok()
            .and_then(|detail| detail.message().map(str::to_string));
        return Err(GenerationError::Status { status, detail });
    }

    let response: GenerateResponse = serde_json::from_slice(body)
        .map_err(|err| GenerationError::Malformed(err.to_string()))?;

    if let Some(image) = response.usable_image() {
        return Ok(GeneratedImage {
            image: image.to_string(),
            message: response.message.clone(),
            model_used: response.model_used.clone(),
        });
    }

    if response.success {
        Err(GenerationError::MissingImage {
            detail: response.detail,
        })
    } else {
        Err(GenerationError::Rejected {
            detail: response.detail,
        })
    }
}

pub struct HttpBackend {
    http: Client,
    server_url: String,
}

impl HttpBackend {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(server_url)
            .with_context(|| format!("invalid server url '{server_url}'"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!(
                "server url must use http or https, got '{}'",
                parsed.scheme()
            ));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            server_url: server_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Resolves an image reference against the server; absolute URLs pass through.
    fn resolve(&self, reference: &str) -> Result<Url> {
        let base = Url::parse(&format!("{}/", self.server_url))
            .with_context(|| format!("invalid server url '{}'", self.server_url))?;
        base.join(reference)
            .with_context(|| format!("invalid image reference '{reference}'"))
    }

    fn build_form(request: GenerationRequest) -> Result<Form, GenerationError> {
        let mut form = Form::new()
            .text(FIELD_PROMPT, request.prompt)
            .text(FIELD_ASPECT_RATIO, request.aspect_ratio.to_string());
        if let Some(model) = request.model {
            form = form.text(FIELD_MODEL, model.to_string());
        }
        for image in request.images {
            let part = Part::bytes(image.bytes)
                .file_name(image.file_name)
                .mime_str(&image.mime_type)
                .map_err(|err| {
                    GenerationError::Transport(format!(
                        "invalid mime '{}' for attachment: {err}",
                        image.mime_type
                    ))
                })?;
            form = form.part(FIELD_IMAGES, part);
        }
        Ok(form)
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn health(&self) -> Result<HealthResponse> {
        let server_url = &self.server_url;
        let response: HealthResponse = self
            .http
            .get(format!("{server_url}{HEALTH_PATH}"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response)
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GeneratedImage, GenerationError> {
        let server_url = &self.server_url;
        let image_count = request.images.len();
        let form = Self::build_form(request)?;

        let response = self
            .http
            .post(format!("{server_url}{GENERATE_PATH}"))
            .multipart(form)
            .send()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()))?;
        debug!(status, image_count, body_len = body.len(), "generate response received");

        interpret_generate_response(status, &body)
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let url = self.resolve(url)?;
        let bytes = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
