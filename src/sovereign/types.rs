//! Sovereign entity data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mark::MarkId;

/// One version of a sovereign entity's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub version_number: u32,
    #[serde(with = "serde_bytes_as_base64")]
    pub content_bytes: Vec<u8>,
    pub content_hash: String,
    pub ingest_mark_id: MarkId,
    pub created_at: DateTime<Utc>,
}

mod serde_bytes_as_base64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&data_encoding_lite_base64(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        data_decoding_lite_base64(&s).map_err(serde::de::Error::custom)
    }

    // Minimal, dependency-free base64 (standard alphabet, with padding) so
    // version metadata stays human-inspectable JSON without pulling in a
    // dedicated base64 crate this codebase doesn't already carry.
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    fn data_encoding_lite_base64(bytes: &[u8]) -> String {
        let mut out = String::with_capacity((bytes.len() + 2) / 3 * 4);
        for chunk in bytes.chunks(3) {
            let b0 = chunk[0];
            let b1 = *chunk.get(1).unwrap_or(&0);
            let b2 = *chunk.get(2).unwrap_or(&0);
            let n = ((b0 as u32) << 16) | ((b1 as u32) << 8) | (b2 as u32);
            out.push(ALPHABET[(n >> 18 & 0x3f) as usize] as char);
            out.push(ALPHABET[(n >> 12 & 0x3f) as usize] as char);
            out.push(if chunk.len() > 1 { ALPHABET[(n >> 6 & 0x3f) as usize] as char } else { '=' });
            out.push(if chunk.len() > 2 { ALPHABET[(n & 0x3f) as usize] as char } else { '=' });
        }
        out
    }

    fn data_decoding_lite_base64(s: &str) -> Result<Vec<u8>, String> {
        fn val(c: u8) -> Option<u32> {
            match c {
                b'A'..=b'Z' => Some((c - b'A') as u32),
                b'a'..=b'z' => Some((c - b'a' + 26) as u32),
                b'0'..=b'9' => Some((c - b'0' + 52) as u32),
                b'+' => Some(62),
                b'/' => Some(63),
                _ => None,
            }
        }
        let mut out = Vec::new();
        let clean: Vec<u8> = s.bytes().filter(|&b| b != b'=').collect();
        for chunk in clean.chunks(4) {
            let mut n = 0u32;
            for (i, &c) in chunk.iter().enumerate() {
                let v = val(c).ok_or_else(|| format!("invalid base64 byte {c}"))?;
                n |= v << (18 - 6 * i);
            }
            out.push((n >> 16 & 0xff) as u8);
            if chunk.len() > 2 {
                out.push((n >> 8 & 0xff) as u8);
            }
            if chunk.len() > 3 {
                out.push((n & 0xff) as u8);
            }
        }
        Ok(out)
    }
}

/// Derived annotations and extracted edges, keyed independently of content
/// for the entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Overlay {
    pub edges: Vec<DiscoveredEdge>,
    pub annotations: serde_json::Value,
    /// Set when edge extraction failed for the current version; the
    /// version's bytes are still stored, just without derived edges.
    pub extraction_error: Option<String>,
}

/// A document possessed under the inbound-sovereignty protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SovereignEntity {
    pub path: String,
    pub versions: Vec<Version>,
    pub current_version: u32,
    pub overlay: Overlay,
}

impl SovereignEntity {
    pub fn current(&self) -> &Version {
        self.versions
            .iter()
            .find(|v| v.version_number == self.current_version)
            .expect("current_version always points at an existing version")
    }
}

/// An edge discovered by edge extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredEdge {
    pub kind: String,
    pub target: String,
    pub line_number: Option<u32>,
    pub context: Option<String>,
}

/// Input to `ingest`.
#[derive(Debug, Clone)]
pub struct IngestEvent {
    pub path: String,
    pub content_bytes: Vec<u8>,
    pub source: String,
}

/// Output of `ingest`.
#[derive(Debug, Clone)]
pub struct IngestedEntity {
    pub entity: SovereignEntity,
    pub ingest_mark_id: MarkId,
    pub edge_mark_ids: Vec<MarkId>,
    pub is_new_version: bool,
}
