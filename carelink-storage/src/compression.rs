//! Size-gated deflate compression of large record fields.
//!
//! A value is serialized to JSON; if that text is longer than the threshold
//! it is deflated and stored as `deflate:` + base64. The prefix lets the read
//! path tell compressed payloads from plain ones without side metadata.
//! Plain strings starting with the prefix are therefore reserved.

use crate::error::{StorageError, StorageResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde_json::Value;
use std::io::{Read, Write};

/// Marker prepended to every compressed payload.
pub const COMPRESSED_PREFIX: &str = "deflate:";

/// Default size threshold in bytes.
pub const DEFAULT_THRESHOLD: usize = 1024;

#[derive(Debug, Clone)]
pub struct CompressionService {
    threshold: usize,
}

impl Default for CompressionService {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl CompressionService {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// True when a serialized payload of this length is worth deflating.
    pub fn should_compress(&self, serialized_len: usize) -> bool {
        serialized_len > self.threshold
    }

    /// Deflates a value if its serialized form passes the threshold,
    /// otherwise returns it unchanged.
    pub fn compress(&self, value: &Value) -> StorageResult<Value> {
        let serialized = serde_json::to_vec(value)?;
        if !self.should_compress(serialized.len()) {
            return Ok(value.clone());
        }

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&serialized)
            .map_err(|e| StorageError::Compression(e.to_string()))?;
        let deflated = encoder
            .finish()
            .map_err(|e| StorageError::Compression(e.to_string()))?;

        Ok(Value::String(format!(
            "{COMPRESSED_PREFIX}{}",
            STANDARD.encode(deflated)
        )))
    }

    /// Reverses [`CompressionService::compress`]; values without the marker
    /// are returned as they are.
    pub fn decompress(&self, value: &Value) -> StorageResult<Value> {
        let Some(body) = value.as_str().and_then(|s| s.strip_prefix(COMPRESSED_PREFIX)) else {
            return Ok(value.clone());
        };

        let deflated = STANDARD
            .decode(body)
            .map_err(|e| StorageError::Decode(format!("invalid base64 in compressed value: {e}")))?;
        let mut inflated = Vec::new();
        DeflateDecoder::new(deflated.as_slice())
            .read_to_end(&mut inflated)
            .map_err(|e| StorageError::Decode(format!("inflate failed: {e}")))?;

        Ok(serde_json::from_slice(&inflated)?)
    }

    pub fn is_compressed(value: &Value) -> bool {
        value
            .as_str()
            .is_some_and(|s| s.starts_with(COMPRESSED_PREFIX))
    }

    /// Compresses the listed top-level fields of `record`.
    pub fn compress_fields(&self, record: &Value, fields: &[String]) -> StorageResult<Value> {
        let mut out = record.clone();
        if let Some(map) = out.as_object_mut() {
            for field in fields {
                if let Some(slot) = map.get_mut(field) {
                    *slot = self.compress(slot)?;
                }
            }
        }
        Ok(out)
    }

    /// Decompresses the listed top-level fields of `record`.
    pub fn decompress_fields(&self, record: &Value, fields: &[String]) -> StorageResult<Value> {
        let mut out = record.clone();
        if let Some(map) = out.as_object_mut() {
            for field in fields {
                if let Some(slot) = map.get_mut(field) {
                    *slot = self.decompress(slot)?;
                }
            }
        }
        Ok(out)
    }
}
