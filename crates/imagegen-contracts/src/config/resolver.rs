use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use tracing::{info, warn};

use super::{mask_secret, Config, DEFAULT_EDITS_URL, DEFAULT_GENERATIONS_URL, DEFAULT_OUTPUT_DIR};

const API_KEY_PREFIX: &str = "sk-";
const UNRESOLVED_PLACEHOLDER: &str = "${env:";

/// Raw inputs for configuration resolution.
///
/// `overrides` are explicit `KEY VALUE` pairs from the command line and win
/// over `env`. `raw_args` is the untouched process argument list, consulted
/// only for the last-resort API key scan.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub overrides: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub raw_args: Vec<String>,
}

impl ConfigSources {
    pub fn from_process(overrides: BTreeMap<String, String>) -> Self {
        Self {
            overrides,
            env: env::vars_os()
                .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
                .collect(),
            raw_args: env::args_os()
                .filter_map(|arg| arg.into_string().ok())
                .collect(),
        }
    }

    fn override_value(&self, key: &str) -> Option<String> {
        non_blank(self.overrides.get(key))
    }

    fn env_value(&self, key: &str) -> Option<String> {
        non_blank(self.env.get(key))
    }

    fn layered(&self, key: &str) -> Option<String> {
        self.override_value(key).or_else(|| self.env_value(key))
    }
}

pub fn resolve(sources: &ConfigSources) -> Config {
    let api_key = resolve_api_key(sources);
    match api_key.as_deref() {
        Some(key) => info!(api_key = %mask_secret(key), "using API key"),
        None => warn!("no API key configured; image requests will be rejected"),
    }

    Config {
        api_key,
        generations_endpoint: sources
            .layered("API_GENERATIONS_URL")
            .unwrap_or_else(|| DEFAULT_GENERATIONS_URL.to_string()),
        edits_endpoint: sources
            .layered("API_EDITS_URL")
            .unwrap_or_else(|| DEFAULT_EDITS_URL.to_string()),
        default_model: sources.layered("DEFAULT_MODEL"),
        output_dir: PathBuf::from(
            sources
                .layered("DEFAULT_OUTPUT_DIR")
                .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
        ),
        image_store_endpoint: sources.layered("CF_IMGBED_UPLOAD_URL"),
        image_store_key: sources.layered("CF_IMGBED_API_KEY"),
    }
}

fn resolve_api_key(sources: &ConfigSources) -> Option<String> {
    let mut api_key = sources
        .override_value("API_KEY")
        .or_else(|| sources.override_value("OPENAI_API_KEY"))
        .or_else(|| sources.env_value("OPENAI_API_KEY"))
        .or_else(|| sources.env_value("API_KEY"));

    // TODO: drop the raw argument scan once hosts are confirmed to pass keys via -e or env.
    if api_key.is_none() {
        api_key = sources
            .raw_args
            .iter()
            .find(|arg| arg.starts_with(API_KEY_PREFIX))
            .cloned();
        if api_key.is_some() {
            warn!("recovered API key from a raw command-line argument");
        }
    }

    if let Some(key) = api_key.as_deref() {
        if key.contains(UNRESOLVED_PLACEHOLDER) {
            warn!("API key contains an unresolved placeholder; reading OPENAI_API_KEY instead");
            api_key = sources.env_value("OPENAI_API_KEY");
        }
    }

    api_key
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .filter(|value| !value.trim().is_empty())
        .cloned()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use super::{resolve, ConfigSources};
    use crate::config::{DEFAULT_EDITS_URL, DEFAULT_GENERATIONS_URL};

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = resolve(&ConfigSources::default());
        assert_eq!(config.api_key, None);
        assert_eq!(config.generations_endpoint, DEFAULT_GENERATIONS_URL);
        assert_eq!(config.edits_endpoint, DEFAULT_EDITS_URL);
        assert_eq!(config.output_dir, PathBuf::from("./output"));
        assert_eq!(config.default_model, None);
        assert!(!config.image_store_configured());
    }

    #[test]
    fn overrides_win_over_environment() {
        let sources = ConfigSources {
            overrides: map(&[
                ("OPENAI_API_KEY", "sk-override"),
                ("DEFAULT_OUTPUT_DIR", "/tmp/images"),
            ]),
            env: map(&[
                ("OPENAI_API_KEY", "sk-env"),
                ("DEFAULT_OUTPUT_DIR", "/var/images"),
                ("DEFAULT_MODEL", "gpt-image-1-mini"),
                ("CF_IMGBED_UPLOAD_URL", "https://img.example.com/upload"),
                ("CF_IMGBED_API_KEY", "store"),
            ]),
            raw_args: Vec::new(),
        };
        let config = resolve(&sources);
        assert_eq!(config.api_key.as_deref(), Some("sk-override"));
        assert_eq!(config.output_dir, PathBuf::from("/tmp/images"));
        assert_eq!(config.default_model.as_deref(), Some("gpt-image-1-mini"));
        assert!(config.image_store_configured());
    }

    #[test]
    fn api_key_priority_order() {
        let sources = ConfigSources {
            overrides: map(&[("API_KEY", "sk-cli-api"), ("OPENAI_API_KEY", "sk-cli-openai")]),
            env: map(&[("OPENAI_API_KEY", "sk-env-openai"), ("API_KEY", "sk-env-api")]),
            raw_args: Vec::new(),
        };
        assert_eq!(resolve(&sources).api_key.as_deref(), Some("sk-cli-api"));

        let sources = ConfigSources {
            env: map(&[("OPENAI_API_KEY", "sk-env-openai"), ("API_KEY", "sk-env-api")]),
            ..ConfigSources::default()
        };
        assert_eq!(resolve(&sources).api_key.as_deref(), Some("sk-env-openai"));

        let sources = ConfigSources {
            env: map(&[("API_KEY", "sk-env-api"), ("OPENAI_API_KEY", "   ")]),
            ..ConfigSources::default()
        };
        assert_eq!(resolve(&sources).api_key.as_deref(), Some("sk-env-api"));
    }

    #[test]
    fn unresolved_placeholder_falls_back_to_environment() {
        let sources = ConfigSources {
            overrides: map(&[("API_KEY", "${env:OPENAI_API_KEY}")]),
            env: map(&[("OPENAI_API_KEY", "sk-real")]),
            raw_args: Vec::new(),
        };
        assert_eq!(resolve(&sources).api_key.as_deref(), Some("sk-real"));

        let sources = ConfigSources {
            overrides: map(&[("API_KEY", "${env:OPENAI_API_KEY}")]),
            ..ConfigSources::default()
        };
        assert_eq!(resolve(&sources).api_key, None);
    }

    #[test]
    fn raw_argument_scan_is_last_resort() {
        let raw_args = vec![
            "imagegen".to_string(),
            "-e".to_string(),
            "MY_KEY".to_string(),
            "sk-from-args".to_string(),
        ];
        let sources = ConfigSources {
            raw_args: raw_args.clone(),
            ..ConfigSources::default()
        };
        assert_eq!(resolve(&sources).api_key.as_deref(), Some("sk-from-args"));

        let sources = ConfigSources {
            env: map(&[("API_KEY", "sk-env")]),
            raw_args,
            ..ConfigSources::default()
        };
        assert_eq!(resolve(&sources).api_key.as_deref(), Some("sk-env"));
    }

    #[test]
    fn values_are_kept_as_written() {
        let sources = ConfigSources {
            overrides: map(&[("API_EDITS_URL", " https://edits.example.com/v1 ")]),
            env: map(&[("API_GENERATIONS_URL", "")]),
            raw_args: Vec::new(),
        };
        let config = resolve(&sources);
        assert_eq!(config.edits_endpoint, " https://edits.example.com/v1 ");
        assert_eq!(config.generations_endpoint, DEFAULT_GENERATIONS_URL);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_environment_entries_are_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        std::env::set_var("IMAGEGEN_TEST_LATIN1_VALUE", OsStr::from_bytes(b"caf\xe9"));
        std::env::set_var("IMAGEGEN_TEST_UTF8_VALUE", "café");

        let sources = ConfigSources::from_process(BTreeMap::new());
        assert!(!sources.env.contains_key("IMAGEGEN_TEST_LATIN1_VALUE"));
        assert_eq!(
            sources.env.get("IMAGEGEN_TEST_UTF8_VALUE").map(String::as_str),
            Some("café")
        );

        std::env::remove_var("IMAGEGEN_TEST_LATIN1_VALUE");
        std::env::remove_var("IMAGEGEN_TEST_UTF8_VALUE");
    }
}
