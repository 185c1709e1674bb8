use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

pub const MAX_PROMPT_CHARS: usize = 32_000;
pub const MIN_IMAGES: u8 = 1;
pub const MAX_IMAGES: u8 = 10;
pub const MAX_OUTPUT_COMPRESSION: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Background {
    Transparent,
    Opaque,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Moderation {
    Low,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Jpeg,
    Webp,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Auto,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationSize {
    #[serde(rename = "1024x1024")]
    Square,
    #[serde(rename = "1536x1024")]
    Landscape,
    #[serde(rename = "1024x1536")]
    Portrait,
    #[serde(rename = "auto")]
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditSize {
    #[serde(rename = "1024x1024")]
    Square,
    #[serde(rename = "1536x1024")]
    Landscape,
    #[serde(rename = "1024x1536")]
    Portrait,
}

impl EditSize {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Square => "1024x1024",
            Self::Landscape => "1536x1024",
            Self::Portrait => "1024x1536",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("prompt exceeds {max} characters (got {actual})")]
    PromptTooLong { max: usize, actual: usize },
    #[error("{field} must be between {min} and {max} (got {actual})")]
    OutOfRange {
        field: &'static str,
        min: u8,
        max: u8,
        actual: u8,
    },
}

/// Optional generation settings are tri-state: absent (`None`), explicitly
/// null (`Some(None)`) or set (`Some(Some(_))`). Absent settings are left out
/// of the outbound payload; explicit nulls are forwarded as `null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit"
    )]
    pub background: Option<Option<Background>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit"
    )]
    pub moderation: Option<Option<Moderation>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit"
    )]
    pub n: Option<Option<u8>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit"
    )]
    pub output_compression: Option<Option<u8>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit"
    )]
    pub output_format: Option<Option<OutputFormat>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit"
    )]
    pub quality: Option<Option<Quality>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit"
    )]
    pub size: Option<Option<GenerationSize>>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_prompt(&self.prompt)?;
        if let Some(Some(n)) = self.n {
            validate_range("n", n, MIN_IMAGES, MAX_IMAGES)?;
        }
        if let Some(Some(compression)) = self.output_compression {
            validate_range("output_compression", compression, 0, MAX_OUTPUT_COMPRESSION)?;
        }
        Ok(())
    }
}

/// Edit settings are two-state: an explicit `null` deserializes to `None`
/// and is treated exactly like an absent field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRequest {
    pub image_path: PathBuf,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<EditSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,
}

impl EditRequest {
    pub fn new(image_path: impl Into<PathBuf>, prompt: impl Into<String>) -> Self {
        Self {
            image_path: image_path.into(),
            prompt: prompt.into(),
            mask_path: None,
            model: None,
            n: None,
            size: None,
            output_format: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_prompt(&self.prompt)?;
        if let Some(n) = self.n {
            validate_range("n", n, MIN_IMAGES, MAX_IMAGES)?;
        }
        Ok(())
    }
}

fn validate_prompt(prompt: &str) -> Result<(), ValidationError> {
    let actual = prompt.chars().count();
    if actual > MAX_PROMPT_CHARS {
        return Err(ValidationError::PromptTooLong {
            max: MAX_PROMPT_CHARS,
            actual,
        });
    }
    Ok(())
}

fn validate_range(field: &'static str, actual: u8, min: u8, max: u8) -> Result<(), ValidationError> {
    if actual < min || actual > max {
        return Err(ValidationError::OutOfRange {
            field,
            min,
            max,
            actual,
        });
    }
    Ok(())
}

// Only called when the key is present, so a present `null` becomes `Some(None)`.
fn explicit<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
