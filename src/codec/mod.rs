//! Pluggable serialization for cached values.
//!
//! A [`CacheCodec`] must be deterministic and round-trip stable
//! (`decode(encode(v)) == v`) and must tolerate unknown future fields when
//! decoding an older wire value against a newer type (forward-compatible).
//! Both built-in codecs satisfy this: `serde_json` ignores unrecognized
//! object keys by default, and `postcard` derives its wire shape from the
//! same `serde::Deserialize` impl, so adding a new `#[serde(default)]`
//! field to `Product` is forward-compatible under either codec.

mod json;
mod postcard_codec;

pub use json::JsonCodec;
pub use postcard_codec::PostcardCodec;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;

/// Serialize/deserialize cached values to/from bytes.
pub trait CacheCodec: Send + Sync + std::fmt::Debug {
    /// Serialize a value to bytes.
    ///
    /// # Errors
    /// Returns [`CacheError::CodecError`] if serialization fails.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CacheError>;

    /// Deserialize bytes to a value.
    ///
    /// # Errors
    /// Returns [`CacheError::CodecError`] if deserialization fails.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError>;

    /// Identifies this codec for logging/debugging.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        a: u32,
        b: String,
    }

    fn round_trip<C: CacheCodec>(codec: &C) {
        let value = Sample {
            a: 7,
            b: "seven".to_string(),
        };
        let bytes = codec.encode(&value).unwrap();
        let decoded: Sample = codec.decode(&bytes).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn json_round_trips() {
        round_trip(&JsonCodec);
    }

    #[test]
    fn postcard_round_trips() {
        round_trip(&PostcardCodec);
    }
}
