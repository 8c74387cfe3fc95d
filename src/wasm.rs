use wasm_bindgen::prelude::*;

#[wasm_bindgen(start)]
pub fn wasm_init() {
    console_error_panic_hook::set_once();
}

#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Takes `{ nodes, links, layout? }` and returns the serialized
/// `LayoutResult`.
#[wasm_bindgen]
pub fn layout_simple(input_json: &str) -> Result<String, JsValue> {
    crate::layout::layout_json(input_json).map_err(|e| JsValue::from_str(&e.to_string()))
}

#[wasm_bindgen]
pub fn layout_with_config(snapshot_json: &str, config_json: Option<String>) -> Result<String, JsValue> {
    let snapshot: crate::types::GraphSnapshot =
        serde_json::from_str(snapshot_json).map_err(|e| JsValue::from_str(&e.to_string()))?;

    let config = match config_json {
        Some(config_str) => crate::types::LayoutConfig::from_json(&config_str)
            .map_err(|e| JsValue::from_str(&e.to_string()))?,
        None => crate::types::LayoutConfig::default(),
    };

    let result = crate::layout::layout_snapshot(&snapshot, &config)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    serde_json::to_string(&result).map_err(|e| JsValue::from_str(&e.to_string()))
}
