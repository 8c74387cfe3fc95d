use napi::bindgen_prelude::*;
use napi_derive::napi;

use crate::error::LayoutError;
use crate::types::{GraphSnapshot, LayoutConfig};

fn to_napi_error(error: LayoutError) -> Error {
    let status = match error {
        LayoutError::Json(_) | LayoutError::InvalidConfig(_) => Status::InvalidArg,
        _ => Status::GenericFailure,
    };
    Error::new(status, error.to_string())
}

#[napi(js_name = "layout")]
pub fn layout_napi(snapshot_json: String, config_json: Option<String>) -> Result<String> {
    let snapshot: GraphSnapshot = serde_json::from_str(&snapshot_json)
        .map_err(|e| Error::new(Status::InvalidArg, format!("Invalid snapshot JSON: {}", e)))?;

    let config = match config_json {
        Some(config_str) => LayoutConfig::from_json(&config_str).map_err(to_napi_error)?,
        None => LayoutConfig::default(),
    };

    let result = crate::layout::layout_snapshot(&snapshot, &config).map_err(to_napi_error)?;
    serde_json::to_string(&result).map_err(|e| {
        Error::new(
            Status::GenericFailure,
            format!("Failed to serialize result: {}", e),
        )
    })
}

#[napi]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[napi(js_name = "layoutSimple")]
pub fn layout_simple(input_json: String) -> Result<String> {
    crate::layout::layout_json(&input_json).map_err(to_napi_error)
}
