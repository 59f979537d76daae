//! Payload codecs.
//!
//! A [`Codec`] maps application values to the opaque bytes carried by a
//! queue message and back. The queue never inspects payloads and adds no
//! header, so both ends of a queue must agree on the codec out of band.

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::SerializationError;

/// Encode/decode pair injected into a [`Queue`](crate::Queue).
///
/// For every value a codec is meant to carry, `decode(encode(v))` must be
/// equal to `v`. Codecs are stateless as far as the queue is concerned.
pub trait Codec: Send + Sync {
    type Item;

    fn encode(&self, item: &Self::Item) -> Result<Vec<u8>, SerializationError>;

    fn decode(&self, payload: &[u8]) -> Result<Self::Item, SerializationError>;
}

/// Text carried verbatim as UTF-8.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityCodec;

impl Codec for IdentityCodec {
    type Item = String;

    fn encode(&self, item: &String) -> Result<Vec<u8>, SerializationError> {
        Ok(item.as_bytes().to_vec())
    }

    fn decode(&self, payload: &[u8]) -> Result<String, SerializationError> {
        String::from_utf8(payload.to_vec()).map_err(SerializationError::decode)
    }
}

/// JSON text via `serde_json`.
pub struct JsonCodec<T = serde_json::Value> {
    _item: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self { _item: PhantomData }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<T> Codec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    type Item = T;

    fn encode(&self, item: &T) -> Result<Vec<u8>, SerializationError> {
        serde_json::to_vec(item).map_err(SerializationError::encode)
    }

    fn decode(&self, payload: &[u8]) -> Result<T, SerializationError> {
        serde_json::from_slice(payload).map_err(SerializationError::decode)
    }
}

/// Opaque binary encoding via MessagePack (`rmp-serde`).
///
/// Structs are written with named fields so that producers and consumers
/// only have to agree on field names, not declaration order. The default
/// item type, [`rmpv::Value`], carries any MessagePack object graph.
pub struct MsgPackCodec<T = rmpv::Value> {
    _item: PhantomData<fn() -> T>,
}

impl<T> MsgPackCodec<T> {
    pub fn new() -> Self {
        Self { _item: PhantomData }
    }
}

impl<T> Default for MsgPackCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for MsgPackCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for MsgPackCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MsgPackCodec")
    }
}

impl<T> Codec for MsgPackCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    type Item = T;

    fn encode(&self, item: &T) -> Result<Vec<u8>, SerializationError> {
        rmp_serde::to_vec_named(item).map_err(SerializationError::encode)
    }

    fn decode(&self, payload: &[u8]) -> Result<T, SerializationError> {
        rmp_serde::from_slice(payload).map_err(SerializationError::decode)
    }
}

/// Codec selector used by configuration and the CLI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    #[default]
    Identity,
    Json,
    #[serde(alias = "binary")]
    MsgPack,
}

impl CodecKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Json => "json",
            Self::MsgPack => "msgpack",
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodecKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "identity" | "text" | "raw" => Ok(Self::Identity),
            "json" => Ok(Self::Json),
            "msgpack" | "binary" => Ok(Self::MsgPack),
            other => Err(format!("unknown codec '{other}' (expected identity, json or msgpack)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn identity_is_verbatim() {
        let payload = IdentityCodec.encode(&"héllo 42".to_string()).unwrap();
        assert_eq!(payload, "héllo 42".as_bytes());
        assert_eq!(IdentityCodec.decode(&payload).unwrap(), "héllo 42");
    }

    #[test]
    fn identity_rejects_invalid_utf8() {
        let err = IdentityCodec.decode(&[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, SerializationError::DecodeFailed(_)));
    }

    #[test]
    fn json_object_roundtrip() {
        let codec = JsonCodec::<serde_json::Value>::new();
        let value = serde_json::json!({"a": 1});
        let payload = codec.encode(&value).unwrap();
        assert_eq!(payload, br#"{"a":1}"#);
        assert_eq!(codec.decode(&payload).unwrap(), value);
    }

    #[test]
    fn json_malformed_input_fails() {
        let codec = JsonCodec::<serde_json::Value>::new();
        let err = codec.decode(b"{\"a\":").unwrap_err();
        assert!(matches!(err, SerializationError::DecodeFailed(_)));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Job {
        id: u64,
        tags: Vec<String>,
        limits: BTreeMap<String, f64>,
        parent: Option<Box<Job>>,
    }

    #[test]
    fn msgpack_object_graph_roundtrip() {
        let codec = MsgPackCodec::<Job>::new();
        let job = Job {
            id: 9,
            tags: vec!["a".into(), "b".into()],
            limits: BTreeMap::from([("cpu".to_string(), 0.5)]),
            parent: Some(Box::new(Job {
                id: 1,
                tags: Vec::new(),
                limits: BTreeMap::new(),
                parent: None,
            })),
        };
        let payload = codec.encode(&job).unwrap();
        assert_eq!(codec.decode(&payload).unwrap(), job);
    }

    #[test]
    fn msgpack_corrupt_payload_fails() {
        let codec = MsgPackCodec::<Job>::new();
        let err = codec.decode(&[0xc1, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, SerializationError::DecodeFailed(_)));
    }

    #[test]
    fn msgpack_incompatible_payload_fails() {
        let payload = MsgPackCodec::<String>::new().encode(&"text".to_string()).unwrap();
        let err = MsgPackCodec::<Job>::new().decode(&payload).unwrap_err();
        assert!(matches!(err, SerializationError::DecodeFailed(_)));
    }

    #[test]
    fn codec_kind_parses() {
        assert_eq!("JSON".parse::<CodecKind>().unwrap(), CodecKind::Json);
        assert_eq!("binary".parse::<CodecKind>().unwrap(), CodecKind::MsgPack);
        assert!("yaml".parse::<CodecKind>().is_err());
        assert_eq!(CodecKind::default().to_string(), "identity");
    }
}
