mod error;
mod image_store;
mod pipeline;
mod storage;
mod tools;

#[cfg(test)]
mod test_support;

pub use error::EngineError;
pub use image_store::{ImageStoreClient, UPLOAD_TIMEOUT};
pub use pipeline::{ImagePipeline, RawImage, EDIT_FILE_PREFIX, GENERATION_FILE_PREFIX};
pub use storage::{ensure_directory, LocalStorage};
pub use tools::{call_tool, EDIT_IMAGE_TOOL, GENERATE_IMAGE_TOOL, HEALTH_TOOL, TOOL_NAMES};
