use serde::{Deserialize, Serialize};

pub const GENERATE_PATH: &str = "/api/generate";
pub const HEALTH_PATH: &str = "/api/health";

pub const FIELD_PROMPT: &str = "prompt";
pub const FIELD_ASPECT_RATIO: &str = "aspect_ratio";
pub const FIELD_MODEL: &str = "model";
pub const FIELD_IMAGES: &str = "images";

/// Body of `POST /api/generate`. Success and failure share one shape; every
/// field is optional so partially-formed bodies still deserialize.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl GenerateResponse {
    /// The image reference when the response is a usable success.
    pub fn usable_image(&self) -> Option<&str> {
        if !self.success {
            return None;
        }
        self.image
            .as_deref()
            .map(str::trim)
            .filter(|image| !image.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub api_configured: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_requires_flag_and_non_empty_image() {
        let ok: GenerateResponse = serde_json::from_str(
            r#"{"success":true,"image":"data:image/png;base64,AAAA","model_used":"imagen-3.0-generate-002"}"#,
        )
        .expect("json");
        assert_eq!(ok.usable_image(), Some("data:image/png;base64,AAAA"));

        let blank: GenerateResponse =
            serde_json::from_str(r#"{"success":true,"image":"  "}"#).expect("json");
        assert_eq!(blank.usable_image(), None);

        let flagged_off: GenerateResponse =
            serde_json::from_str(r#"{"success":false,"image":"data:image/png;base64,AAAA"}"#)
                .expect("json");
        assert_eq!(flagged_off.usable_image(), None);
    }

    #[test]
    fn detail_only_body_deserializes() {
        let body: GenerateResponse =
            serde_json::from_str(r#"{"detail":"quota exceeded"}"#).expect("json");
        assert!(!body.success);
        assert_eq!(body.detail.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn health_defaults_to_unconfigured() {
        let health: HealthResponse = serde_json::from_str(r#"{"status":"healthy"}"#).expect("json");
        assert!(!health.api_configured);
    }
}
