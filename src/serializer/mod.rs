//! Encodings for the session payload.
//!
//! The store never inspects the payload; it hands the session's [`Values`] to
//! a [`SessionSerializer`] and persists whatever bytes come back. Swapping the
//! serializer (e.g. to JSON for a schema-stable payload readable by other
//! services) does not touch the store.

use std::fmt::Debug;

use crate::Values;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Encoding failed with: {0}")]
    Encode(String),

    #[error("Decoding failed with: {0}")]
    Decode(String),
}

/// Converts session values to and from an opaque payload.
pub trait SessionSerializer: Debug + Send + Sync + 'static {
    fn serialize(&self, values: &Values) -> Result<Vec<u8>, Error>;

    /// Decodes `data` and merges the result into `values`.
    fn deserialize(&self, data: &[u8], values: &mut Values) -> Result<(), Error>;
}

/// Compact binary encoding using [MessagePack](https://crates.io/crates/rmp-serde).
#[cfg(feature = "messagepack")]
#[derive(Clone, Copy, Debug, Default)]
pub struct MessagePackSerializer;

#[cfg(feature = "messagepack")]
impl SessionSerializer for MessagePackSerializer {
    fn serialize(&self, values: &Values) -> Result<Vec<u8>, Error> {
        rmp_serde::to_vec_named(values).map_err(|e| Error::Encode(e.to_string()))
    }

    fn deserialize(&self, data: &[u8], values: &mut Values) -> Result<(), Error> {
        let decoded: Values =
            rmp_serde::from_slice(data).map_err(|e| Error::Decode(e.to_string()))?;
        values.extend(decoded);
        Ok(())
    }
}

/// Plain JSON encoding.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl SessionSerializer for JsonSerializer {
    fn serialize(&self, values: &Values) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(values).map_err(|e| Error::Encode(e.to_string()))
    }

    fn deserialize(&self, data: &[u8], values: &mut Values) -> Result<(), Error> {
        let decoded: Values =
            serde_json::from_slice(data).map_err(|e| Error::Decode(e.to_string()))?;
        values.extend(decoded);
        Ok(())
    }
}

#[cfg(feature = "messagepack")]
pub(crate) fn default_serializer() -> Box<dyn SessionSerializer> {
    Box::new(MessagePackSerializer)
}

#[cfg(not(feature = "messagepack"))]
pub(crate) fn default_serializer() -> Box<dyn SessionSerializer> {
    Box::new(JsonSerializer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Values {
        let mut values = Values::new();
        values.insert("user_id".to_string(), json!(42));
        values.insert("name".to_string(), json!("Ada Lovelace"));
        values.insert("admin".to_string(), json!(false));
        values.insert("ratio".to_string(), json!(1.5));
        values.insert("missing".to_string(), json!(null));
        values.insert("negative".to_string(), json!(-17));
        values.insert("tags".to_string(), json!(["a", "b", 3]));
        values.insert(
            "prefs".to_string(),
            json!({ "theme": "dark", "langs": ["en", "fr"], "nested": { "depth": 2 } }),
        );
        values
    }

    fn round_trip(serializer: &dyn SessionSerializer, values: &Values) -> Values {
        let bytes = serializer.serialize(values).unwrap();
        let mut decoded = Values::new();
        serializer.deserialize(&bytes, &mut decoded).unwrap();
        decoded
    }

    #[test]
    fn json_round_trips_heterogeneous_values() {
        let values = sample();
        assert_eq!(round_trip(&JsonSerializer, &values), values);
        assert_eq!(round_trip(&JsonSerializer, &Values::new()), Values::new());
    }

    #[cfg(feature = "messagepack")]
    #[test]
    fn messagepack_round_trips_heterogeneous_values() {
        let values = sample();
        assert_eq!(round_trip(&MessagePackSerializer, &values), values);
        assert_eq!(round_trip(&MessagePackSerializer, &Values::new()), Values::new());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let mut values = Values::new();
        let err = JsonSerializer
            .deserialize(b"\xff\x00not a payload", &mut values)
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert!(values.is_empty());
    }

    #[cfg(feature = "messagepack")]
    #[test]
    fn messagepack_rejects_truncated_payloads() {
        let bytes = MessagePackSerializer.serialize(&sample()).unwrap();
        let mut values = Values::new();
        let err = MessagePackSerializer
            .deserialize(&bytes[..bytes.len() / 2], &mut values)
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
