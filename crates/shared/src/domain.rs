use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{ParseAspectRatioError, ParseModelIdError};

/// Upper bound on reference images attached to a single generation.
pub const MAX_ATTACHMENTS: usize = 14;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);
    };
}

id_newtype!(AttachmentId);
id_newtype!(NoticeId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "3:4")]
    StandardPortrait,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Landscape,
        AspectRatio::Portrait,
        AspectRatio::Standard,
        AspectRatio::StandardPortrait,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Standard => "4:3",
            AspectRatio::StandardPortrait => "3:4",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = ParseAspectRatioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|ratio| ratio.as_str() == trimmed)
            .ok_or_else(|| ParseAspectRatioError(trimmed.to_string()))
    }
}

/// Image models the backend knows how to route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    #[serde(rename = "gemini-2.0-flash-preview-image-generation")]
    GeminiFlashImage,
    #[serde(rename = "imagen-3.0-generate-002")]
    Imagen3,
}

impl ModelId {
    pub const ALL: [ModelId; 2] = [ModelId::GeminiFlashImage, ModelId::Imagen3];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelId::GeminiFlashImage => "gemini-2.0-flash-preview-image-generation",
            ModelId::Imagen3 => "imagen-3.0-generate-002",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ModelId::GeminiFlashImage => "Gemini 2.0 Flash (Preview)",
            ModelId::Imagen3 => "Imagen 3",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = ParseModelIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|model| model.as_str() == trimmed)
            .ok_or_else(|| ParseModelIdError(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_ratio_parses_every_literal() {
        for ratio in AspectRatio::ALL {
            assert_eq!(ratio.as_str().parse::<AspectRatio>().expect("parse"), ratio);
        }
        assert_eq!(" 16:9 ".parse::<AspectRatio>().expect("parse"), AspectRatio::Landscape);
    }

    #[test]
    fn aspect_ratio_rejects_unknown_values() {
        let err = "21:9".parse::<AspectRatio>().expect_err("must fail");
        assert!(err.to_string().contains("21:9"));
    }

    #[test]
    fn aspect_ratio_serializes_as_literal() {
        let json = serde_json::to_string(&AspectRatio::StandardPortrait).expect("json");
        assert_eq!(json, "\"3:4\"");
        assert_eq!(AspectRatio::default(), AspectRatio::Square);
    }

    #[test]
    fn model_id_round_trips_through_text() {
        let model: ModelId = "imagen-3.0-generate-002".parse().expect("parse");
        assert_eq!(model, ModelId::Imagen3);
        assert!("dall-e".parse::<ModelId>().is_err());
    }
}
