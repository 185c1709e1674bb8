mod resolver;

use std::fmt;
use std::path::PathBuf;

pub use resolver::{resolve, ConfigSources};

pub const DEFAULT_GENERATIONS_URL: &str = "https://api.openai.com/v1/images/generations";
pub const DEFAULT_EDITS_URL: &str = "https://api.openai.com/v1/images/edits";
pub const DEFAULT_OUTPUT_DIR: &str = "./output";
pub const FALLBACK_MODEL: &str = "gpt-image-1";

/// Immutable configuration snapshot, resolved once at start-up and passed
/// explicitly to every component.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub api_key: Option<String>,
    pub generations_endpoint: String,
    pub edits_endpoint: String,
    pub default_model: Option<String>,
    pub output_dir: PathBuf,
    pub image_store_endpoint: Option<String>,
    pub image_store_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            generations_endpoint: DEFAULT_GENERATIONS_URL.to_string(),
            edits_endpoint: DEFAULT_EDITS_URL.to_string(),
            default_model: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            image_store_endpoint: None,
            image_store_key: None,
        }
    }
}

impl Config {
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|key| !key.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn image_store_configured(&self) -> bool {
        self.image_store().is_some()
    }

    /// Endpoint and auth code, only when both are set.
    pub fn image_store(&self) -> Option<(&str, &str)> {
        let endpoint = self
            .image_store_endpoint
            .as_deref()
            .filter(|value| !value.trim().is_empty())?;
        let key = self
            .image_store_key
            .as_deref()
            .filter(|value| !value.trim().is_empty())?;
        Some((endpoint, key))
    }

    /// Request override, then configured default, then `gpt-image-1`.
    pub fn model_for(&self, requested: Option<&str>) -> String {
        requested
            .filter(|value| !value.trim().is_empty())
            .or(self.default_model.as_deref())
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(FALLBACK_MODEL)
            .to_string()
    }

    pub fn masked_api_key(&self) -> Option<String> {
        self.api_key.as_deref().map(mask_secret)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.masked_api_key())
            .field("generations_endpoint", &self.generations_endpoint)
            .field("edits_endpoint", &self.edits_endpoint)
            .field("default_model", &self.default_model)
            .field("output_dir", &self.output_dir)
            .field("image_store_endpoint", &self.image_store_endpoint)
            .field(
                "image_store_key",
                &self.image_store_key.as_deref().map(mask_secret),
            )
            .finish()
    }
}

pub(crate) fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 9 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..5].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
