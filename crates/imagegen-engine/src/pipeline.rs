use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use imagegen_contracts::config::Config;
use imagegen_contracts::requests::{EditRequest, GenerationRequest};
use imagegen_contracts::results::PersistedImage;
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::image_store::ImageStoreClient;
use crate::storage::LocalStorage;

pub const GENERATION_FILE_PREFIX: &str = "openai";
pub const EDIT_FILE_PREFIX: &str = "openai_edit";

/// Decoded image bytes exactly as the API returned them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    bytes: Vec<u8>,
}

impl RawImage {
    pub fn from_base64(encoded: &str) -> Result<Self, EngineError> {
        let bytes = BASE64
            .decode(encoded.trim().as_bytes())
            .map_err(|err| EngineError::InvalidResponse(format!("image base64 decode failed: {err}")))?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImageItem>,
}

#[derive(Debug, Deserialize)]
struct ImageItem {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    revised_prompt: Option<String>,
}

impl ImageItem {
    fn decode(&self) -> Result<RawImage, EngineError> {
        let encoded = self.b64_json.as_deref().ok_or_else(|| {
            EngineError::InvalidResponse("image item is missing b64_json".to_string())
        })?;
        RawImage::from_base64(encoded)
    }
}

/// Generation and edit calls against the images API, followed by per-image
/// local persistence and image store mirroring.
///
/// Each call is independent; the only shared state is the read-only
/// configuration and the connection pool.
#[derive(Debug, Clone)]
pub struct ImagePipeline {
    config: Config,
    http: HttpClient,
    storage: LocalStorage,
    image_store: ImageStoreClient,
}

impl ImagePipeline {
    pub fn new(config: Config) -> Result<Self, EngineError> {
        // No overall timeout on API calls; the image store sets its own per request.
        let http = HttpClient::builder()
            .timeout(None)
            .build()
            .map_err(EngineError::HttpClient)?;
        let storage = LocalStorage::new(config.output_dir.clone());
        let image_store = ImageStoreClient::new(&config, http.clone());
        Ok(Self {
            config,
            http,
            storage,
            image_store,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn generate(&self, request: &GenerationRequest) -> Result<Vec<PersistedImage>, EngineError> {
        let api_key = self.api_key()?;
        let endpoint = self.config.generations_endpoint.as_str();
        let payload = generation_payload(request, &self.config)?;
        debug!(
            endpoint,
            fields = ?payload.keys().collect::<Vec<_>>(),
            "sending generation request"
        );

        let response = self
            .http
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&Value::Object(payload))
            .send()
            .map_err(|source| EngineError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;
        let items = read_image_items(endpoint, response)?;
        info!(count = items.len(), "generation returned images");

        Ok(items
            .into_iter()
            .map(|item| self.persist_item(item, GENERATION_FILE_PREFIX, true))
            .collect())
    }

    pub fn edit(&self, request: &EditRequest) -> Result<Vec<PersistedImage>, EngineError> {
        let api_key = self.api_key()?;
        let endpoint = self.config.edits_endpoint.as_str();

        let image = read_source_image(&request.image_path)?;
        let mask = match request
            .mask_path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
        {
            Some(path) => Some(read_source_image(path)?),
            None => None,
        };

        let mut form = MultipartForm::new().part("image", png_part(image, "image.png")?);
        if let Some(mask) = mask {
            form = form.part("mask", png_part(mask, "mask.png")?);
        }
        let fields = edit_form_fields(request, &self.config);
        debug!(
            endpoint,
            fields = ?fields.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            has_mask = request.mask_path.is_some(),
            "sending edit request"
        );
        for (name, value) in fields {
            form = form.text(name, value);
        }

        let response = self
            .http
            .post(endpoint)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .map_err(|source| EngineError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;
        let items = read_image_items(endpoint, response)?;
        info!(count = items.len(), "edit returned images");

        Ok(items
            .into_iter()
            .map(|item| self.persist_item(item, EDIT_FILE_PREFIX, false))
            .collect())
    }

    fn api_key(&self) -> Result<&str, EngineError> {
        self.config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(EngineError::Configuration)
    }

    // Never fails: save and upload problems are logged and leave the slot in place.
    fn persist_item(&self, item: ImageItem, prefix: &str, keep_revised_prompt: bool) -> PersistedImage {
        let local_path = self.storage.allocate_path(prefix);
        let filename = local_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{prefix}.png"));

        let url = match item.decode() {
            Ok(raw) => {
                match self.storage.save(raw.as_bytes(), &local_path) {
                    Ok(()) => info!(path = %local_path.display(), "image saved"),
                    Err(err) => warn!(path = %local_path.display(), "failed to save image locally: {err}"),
                }
                self.image_store.upload(raw.as_bytes(), &filename)
            }
            Err(err) => {
                warn!(path = %local_path.display(), "skipping image item: {err}");
                None
            }
        };

        PersistedImage {
            local_path,
            url,
            revised_prompt: if keep_revised_prompt {
                item.revised_prompt
            } else {
                None
            },
        }
    }
}

/// Absent settings are left out; explicit nulls are sent as `null`.
fn generation_payload(request: &GenerationRequest, config: &Config) -> Result<Map<String, Value>, EngineError> {
    let mut payload = Map::new();
    payload.insert("prompt".to_string(), Value::String(request.prompt.clone()));
    payload.insert(
        "model".to_string(),
        Value::String(config.model_for(request.model.as_deref())),
    );
    insert_setting(&mut payload, "background", &request.background)?;
    insert_setting(&mut payload, "moderation", &request.moderation)?;
    insert_setting(&mut payload, "n", &request.n)?;
    insert_setting(&mut payload, "output_compression", &request.output_compression)?;
    insert_setting(&mut payload, "output_format", &request.output_format)?;
    insert_setting(&mut payload, "quality", &request.quality)?;
    insert_setting(&mut payload, "size", &request.size)?;
    Ok(payload)
}

fn insert_setting<T: Serialize>(
    payload: &mut Map<String, Value>,
    key: &str,
    setting: &Option<Option<T>>,
) -> Result<(), EngineError> {
    let Some(value) = setting else {
        return Ok(());
    };
    let value = serde_json::to_value(value)
        .map_err(|err| EngineError::InvalidRequest(format!("failed to encode {key}: {err}")))?;
    payload.insert(key.to_string(), value);
    Ok(())
}

fn edit_form_fields(request: &EditRequest, config: &Config) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("prompt", request.prompt.clone()),
        ("model", config.model_for(request.model.as_deref())),
    ];
    if let Some(n) = request.n {
        fields.push(("n", n.to_string()));
    }
    if let Some(size) = request.size {
        fields.push(("size", size.as_str().to_string()));
    }
    if let Some(output_format) = request.output_format {
        fields.push(("output_format", output_format.as_str().to_string()));
    }
    fields
}

fn read_source_image(path: &Path) -> Result<Vec<u8>, EngineError> {
    fs::read(path).map_err(|source| EngineError::Io {
        context: "failed to read image file",
        path: path.to_path_buf(),
        source,
    })
}

fn png_part(bytes: Vec<u8>, file_name: &'static str) -> Result<MultipartPart, EngineError> {
    MultipartPart::bytes(bytes)
        .file_name(file_name)
        .mime_str("image/png")
        .map_err(|err| EngineError::InvalidRequest(format!("invalid mime for {file_name}: {err}")))
}

fn read_image_items(endpoint: &str, response: HttpResponse) -> Result<Vec<ImageItem>, EngineError> {
    let status = response.status();
    let body = response.text().map_err(|source| EngineError::Transport {
        endpoint: endpoint.to_string(),
        source,
    })?;
    if !status.is_success() {
        return Err(remote_api_error(status, &body));
    }
    let parsed: ImagesResponse = serde_json::from_str(&body)
        .map_err(|err| EngineError::InvalidResponse(format!("unexpected images payload: {err}")))?;
    Ok(parsed.data)
}

fn remote_api_error(status: StatusCode, body: &str) -> EngineError {
    let message = match serde_json::from_str::<Value>(body) {
        Ok(parsed) => parsed
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| parsed.to_string()),
        Err(_) => body.to_string(),
    };
    EngineError::RemoteApi {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        message,
    }
}
