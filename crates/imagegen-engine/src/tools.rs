use imagegen_contracts::requests::{EditRequest, GenerationRequest};
use imagegen_contracts::results::HealthReport;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::EngineError;
use crate::pipeline::ImagePipeline;

pub const GENERATE_IMAGE_TOOL: &str = "generate-image";
pub const EDIT_IMAGE_TOOL: &str = "edit-image";
pub const HEALTH_TOOL: &str = "health";
pub const TOOL_NAMES: [&str; 3] = [GENERATE_IMAGE_TOOL, EDIT_IMAGE_TOOL, HEALTH_TOOL];

/// Dispatches one tool invocation: typed parsing, range validation, then the
/// pipeline. The result is the JSON the caller receives.
pub fn call_tool(pipeline: &ImagePipeline, name: &str, arguments: Value) -> Result<Value, EngineError> {
    match name {
        GENERATE_IMAGE_TOOL => {
            let request: GenerationRequest = parse_arguments(name, arguments)?;
            request.validate()?;
            to_json(&pipeline.generate(&request)?)
        }
        EDIT_IMAGE_TOOL => {
            let request: EditRequest = parse_arguments(name, arguments)?;
            request.validate()?;
            to_json(&pipeline.edit(&request)?)
        }
        HEALTH_TOOL => to_json(&HealthReport::from_config(pipeline.config())),
        other => Err(EngineError::InvalidRequest(format!(
            "unknown tool '{other}' (expected one of: {})",
            TOOL_NAMES.join(", ")
        ))),
    }
}

fn parse_arguments<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, EngineError> {
    let arguments = match arguments {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(arguments)
        .map_err(|err| EngineError::InvalidRequest(format!("{tool}: {err}")))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, EngineError> {
    serde_json::to_value(value)
        .map_err(|err| EngineError::InvalidResponse(format!("failed to serialize result: {err}")))
}
