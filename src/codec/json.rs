use serde::de::DeserializeOwned;
use serde::Serialize;

use super::CacheCodec;
use crate::error::CacheError;

/// JSON codec, backed by `serde_json`. Human-readable, the default.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl CacheCodec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CacheError> {
        serde_json::to_vec(value).map_err(|e| CacheError::codec(e))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::codec(e))
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
