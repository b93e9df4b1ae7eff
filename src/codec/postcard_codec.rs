use serde::de::DeserializeOwned;
use serde::Serialize;

use super::CacheCodec;
use crate::error::CacheError;

/// Compact binary codec, backed by `postcard`. Smaller on the wire than
/// JSON; prefer it when L2 bandwidth/memory matters more than readability.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostcardCodec;

impl CacheCodec for PostcardCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CacheError> {
        postcard::to_allocvec(value).map_err(|e| CacheError::codec(anyhow::anyhow!(e)))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError> {
        postcard::from_bytes(bytes).map_err(|e| CacheError::codec(anyhow::anyhow!(e)))
    }

    fn name(&self) -> &'static str {
        "postcard"
    }
}
