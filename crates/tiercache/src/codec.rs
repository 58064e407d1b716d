//! Wire encoding of cache entries
//!
//! The remote store only speaks strings, so entries cross the boundary as JSON
//! with every [`Payload::Binary`](crate::Payload::Binary) leaf carried as a
//! tagged base64 string: `{"type":"binary","data":"aGVsbG8="}`.

use crate::{CacheEntry, CacheError, Result};

/// Serialize an entry into its stored string form.
pub fn encode_entry(entry: &CacheEntry) -> Result<String> {
    Ok(serde_json::to_string(entry)?)
}

/// Parse a stored string back into an entry.
///
/// A stored JSON `null` decodes to `None`; anything that does not match the
/// entry shape is reported as [`CacheError::MalformedEntry`].
pub fn decode_entry(key: &str, raw: &str) -> Result<Option<CacheEntry>> {
    serde_json::from_str::<Option<CacheEntry>>(raw).map_err(|e| CacheError::MalformedEntry {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Serde adapter storing raw bytes as standard base64.
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }
}
