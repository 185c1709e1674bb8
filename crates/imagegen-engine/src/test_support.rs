use std::io::Cursor;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use imagegen_contracts::config::Config;
use tokio::runtime::Runtime;
use wiremock::{Mock, MockServer, Request};

pub(crate) const TEST_API_KEY: &str = "sk-test-key";

/// A wiremock server driven from synchronous tests. The blocking pipeline
/// runs on the test thread while the server is served by the runtime's
/// worker threads.
pub(crate) struct MockApi {
    // Declared before `runtime` so the server is dropped first.
    server: MockServer,
    runtime: Runtime,
}

impl MockApi {
    pub(crate) fn start() -> anyhow::Result<Self> {
        let runtime = Runtime::new()?;
        let server = runtime.block_on(MockServer::start());
        Ok(Self { server, runtime })
    }

    pub(crate) fn uri(&self) -> String {
        self.server.uri()
    }

    pub(crate) fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.runtime
            .block_on(self.server.received_requests())
            .unwrap_or_default()
    }

    pub(crate) fn config(&self, output_dir: &Path) -> Config {
        Config {
            api_key: Some(TEST_API_KEY.to_string()),
            generations_endpoint: format!("{}/v1/images/generations", self.uri()),
            edits_endpoint: format!("{}/v1/images/edits", self.uri()),
            output_dir: output_dir.to_path_buf(),
            ..Config::default()
        }
    }
}

pub(crate) fn png_bytes(width: u32, height: u32, seed: u8) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            seed.wrapping_add(x as u8),
            seed.wrapping_mul(3).wrapping_add(y as u8),
            seed,
            255,
        ])
    });
    let mut out = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .expect("encode png");
    out
}

pub(crate) fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
    let mut out = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .expect("encode jpeg");
    out
}

pub(crate) fn b64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}
