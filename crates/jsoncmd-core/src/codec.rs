//! JSON text <-> in-memory value conversion.
//!
//! The dispatcher only talks to a `Codec`; `SerdeJsonCodec` is the stock
//! implementation backed by `serde_json`.

use serde_json::Value;

use crate::error::CodecError;

pub trait Codec: Send + Sync {
    fn decode(&self, json: &str) -> Result<Value, CodecError>;
    fn encode(&self, value: &Value) -> Result<String, CodecError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SerdeJsonCodec;

impl Codec for SerdeJsonCodec {
    fn decode(&self, json: &str) -> Result<Value, CodecError> {
        Ok(serde_json::from_str(json)?)
    }

    fn encode(&self, value: &Value) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_arrays_and_null() {
        let codec = SerdeJsonCodec;
        assert_eq!(codec.decode(r#"["a", 1]"#).unwrap(), json!(["a", 1]));
        assert_eq!(codec.decode("null").unwrap(), Value::Null);
        assert!(codec.decode("[1,").is_err());
    }

    #[test]
    fn encodes_compactly() {
        let codec = SerdeJsonCodec;
        assert_eq!(codec.encode(&json!({"a": [1, null]})).unwrap(), r#"{"a":[1,null]}"#);
    }
}
