//! Serialization codecs for structured cache values

use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Encoding between typed values and stored bytes
///
/// A codec must round-trip every value a caller stores through it.
pub trait Codec: Send + Sync {
    /// Short codec identifier used in diagnostics
    fn name(&self) -> &'static str;

    /// Encode a value to bytes
    ///
    /// # Errors
    /// Returns [`Error::Serialization`] if the value cannot be represented.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode bytes stored under `key`
    ///
    /// # Errors
    /// Returns [`Error::Deserialization`] if the bytes are not a valid `T`.
    fn decode<T: DeserializeOwned>(&self, key: &str, bytes: &[u8]) -> Result<T>;
}

/// JSON codec backed by `serde_json`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    /// Compact JSON
    #[must_use]
    pub const fn new() -> Self {
        Self { pretty: false }
    }

    /// Indented JSON, easier to inspect on disk
    #[must_use]
    pub const fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        encoded.map_err(|e| Error::serialization(format!("Failed to encode value: {e}")))
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| Error::deserialization(key, e.to_string()))
    }
}
