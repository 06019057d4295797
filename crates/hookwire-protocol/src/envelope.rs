//! The `{code, result, msg}` JSON envelope written by the framework itself
//! (middleware rejections, `write_json` from controllers).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Content type sent with every envelope.
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=utf-8";

/// Logical reply envelope.
///
/// `code` mirrors the transport status chosen by the writer. serde_json never
/// escapes non-ASCII characters or `/`, so the encoded body is plain UTF-8.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonEnvelope {
    pub code: u16,
    pub result: Value,
    pub msg: Value,
}

impl JsonEnvelope {
    pub fn new(code: u16, result: impl Into<Value>, msg: impl Into<Value>) -> Self {
        Self {
            code,
            result: result.into(),
            msg: msg.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing a struct of `u16` + `Value` fields cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
