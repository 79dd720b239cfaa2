//! Serde helper storing `Vec<u8>` fields as base64 strings, so binary
//! payloads survive the JSON layer of the TTL store.
//!
//! ```ignore
//! #[derive(Serialize, Deserialize)]
//! struct Payload {
//!     #[serde(with = "cache_aside::cache::base64_bytes")]
//!     body: Vec<u8>,
//! }
//! ```

pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(de::Error::custom)
    }
}
