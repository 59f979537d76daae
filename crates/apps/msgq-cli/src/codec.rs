use anyhow::{Context, Result};
use msgq::{Codec, IdentityCodec, JsonCodec, MsgPackCodec};
use serde_json::Value;

/// A codec the CLI can feed from a command-line argument and print back.
pub trait CliCodec: Codec {
    fn parse(&self, input: &str) -> Result<Self::Item>;

    /// JSON form of a received value; text payloads become JSON strings.
    fn render(&self, item: &Self::Item) -> Result<Value>;
}

impl CliCodec for IdentityCodec {
    fn parse(&self, input: &str) -> Result<String> {
        Ok(input.to_string())
    }

    fn render(&self, item: &String) -> Result<Value> {
        Ok(Value::String(item.clone()))
    }
}

impl CliCodec for JsonCodec<Value> {
    fn parse(&self, input: &str) -> Result<Value> {
        serde_json::from_str(input).context("value is not valid JSON")
    }

    fn render(&self, item: &Value) -> Result<Value> {
        Ok(item.clone())
    }
}

/// MessagePack values are entered and shown as JSON.
impl CliCodec for MsgPackCodec<rmpv::Value> {
    fn parse(&self, input: &str) -> Result<rmpv::Value> {
        let json: Value = serde_json::from_str(input).context("value is not valid JSON")?;
        rmpv::ext::to_value(json).context("value cannot be represented as MessagePack")
    }

    fn render(&self, item: &rmpv::Value) -> Result<Value> {
        match serde_json::to_value(item) {
            Ok(json) => Ok(json),
            // e.g. maps keyed by arrays
            Err(_) => Ok(Value::String(item.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msgpack_parses_json_input() {
        let codec = MsgPackCodec::<rmpv::Value>::new();
        let value = codec.parse(r#"{"a":[1,true,null]}"#).unwrap();
        let bytes = codec.encode(&value).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(
            codec.render(&decoded).unwrap(),
            serde_json::json!({"a": [1, true, null]})
        );
    }

    #[test]
    fn json_renders_structured_value() {
        let codec = JsonCodec::<Value>::new();
        let value = codec.parse(r#"{"job":7}"#).unwrap();
        assert_eq!(codec.render(&value).unwrap(), serde_json::json!({"job": 7}));
        assert_eq!(
            IdentityCodec.render(&"plain".to_string()).unwrap(),
            Value::String("plain".into())
        );
    }

    #[test]
    fn json_rejects_garbage() {
        assert!(JsonCodec::<Value>::new().parse("{nope").is_err());
    }

    #[test]
    fn identity_passes_through() {
        assert_eq!(IdentityCodec.parse("  spaced ").unwrap(), "  spaced ");
    }
}
