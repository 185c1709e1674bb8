use std::time::Duration;

use imagegen_contracts::config::Config;
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, error, info};
use url::Url;

use crate::error::EngineError;

pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the image bed that mirrors saved images and hands back a
/// public URL.
#[derive(Debug, Clone)]
pub struct ImageStoreClient {
    endpoint: Option<String>,
    auth_code: Option<String>,
    http: HttpClient,
    timeout: Duration,
}

impl ImageStoreClient {
    pub fn new(config: &Config, http: HttpClient) -> Self {
        let (endpoint, auth_code) = match config.image_store() {
            Some((endpoint, auth_code)) => (Some(endpoint.to_string()), Some(auth_code.to_string())),
            None => (None, None),
        };
        Self {
            endpoint,
            auth_code,
            http,
            timeout: UPLOAD_TIMEOUT,
        }
    }

    /// Replaces the per-request upload timeout, `UPLOAD_TIMEOUT` by default.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some() && self.auth_code.is_some()
    }

    /// Best-effort upload. Every failure is logged and collapses to `None`.
    pub fn upload(&self, bytes: &[u8], filename: &str) -> Option<String> {
        match self.try_upload(bytes, filename) {
            Ok(url) => url,
            Err(err) => {
                error!(filename, "failed to upload image to image store: {err}");
                None
            }
        }
    }

    /// `Ok(None)` means the store is not configured and no request was made.
    pub fn try_upload(&self, bytes: &[u8], filename: &str) -> Result<Option<String>, EngineError> {
        let (Some(endpoint), Some(auth_code)) = (self.endpoint.as_deref(), self.auth_code.as_deref())
        else {
            debug!(filename, "image store not configured; skipping upload");
            return Ok(None);
        };

        info!(filename, "uploading image to image store");
        let part = MultipartPart::bytes(bytes.to_vec()).file_name(filename.to_string());
        let form = MultipartForm::new().part("file", part);
        let response = self
            .http
            .post(authorized_upload_url(endpoint, auth_code))
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    EngineError::Upload(format!("timed out after {:?}: {err}", self.timeout))
                } else {
                    EngineError::Upload(format!("no response received: {err}"))
                }
            })?;

        let status = response.status();
        let headers = format!("{:?}", response.headers());
        let body = response
            .text()
            .map_err(|err| EngineError::Upload(format!("failed reading response body: {err}")))?;

        let src = if status == StatusCode::OK {
            first_src(&body)
        } else {
            None
        };
        let Some(src) = src else {
            return Err(EngineError::Upload(format!(
                "unexpected response. Status: {}. Headers: {headers}. Data: {body}",
                status.as_u16()
            )));
        };

        let url = resolve_against_origin(endpoint, &src)?;
        info!(%url, "image uploaded");
        Ok(Some(url))
    }
}

fn authorized_upload_url(endpoint: &str, auth_code: &str) -> String {
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!("{endpoint}{separator}authCode={auth_code}")
}

fn first_src(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed
        .as_array()?
        .first()?
        .get("src")
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn resolve_against_origin(endpoint: &str, src: &str) -> Result<String, EngineError> {
    let mut base = Url::parse(endpoint)
        .map_err(|err| EngineError::Upload(format!("invalid upload endpoint '{endpoint}': {err}")))?;
    base.set_path("/");
    base.set_query(None);
    base.set_fragment(None);
    base.join(src)
        .map(|url| url.to_string())
        .map_err(|err| EngineError::Upload(format!("invalid image path '{src}': {err}")))
}
