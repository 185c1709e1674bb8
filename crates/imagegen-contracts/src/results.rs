use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// One entry per image returned by the remote API, in response order.
///
/// `local_path` is always the path that was attempted, even when the local
/// write failed. `url` is `None` when no image store is configured or the
/// upload did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedImage {
    pub local_path: PathBuf,
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Configured,
    Missing,
}

impl ComponentStatus {
    fn from_flag(configured: bool) -> Self {
        if configured {
            Self::Configured
        } else {
            Self::Missing
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub version: String,
    pub api_status: ComponentStatus,
    pub imgbed_status: ComponentStatus,
}

impl HealthReport {
    pub fn from_config(config: &Config) -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            api_status: ComponentStatus::from_flag(config.has_api_key()),
            imgbed_status: ComponentStatus::from_flag(config.image_store_configured()),
        }
    }
}
