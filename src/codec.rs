//! Codec - Exchange String Envelope
//!
//! Reverses the textual envelope: version marker, base64, zlib, JSON.
//! Fail fast and precisely here; nothing downstream sees malformed input.

use std::io::{Read, Write};

use base64::Engine;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;

use crate::document::Document;

/// The only exchange format version this engine understands.
pub const SUPPORTED_VERSION: char = '0';

/// Book nesting deeper than this is rejected as crafted input.
pub const MAX_BOOK_DEPTH: usize = 16;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unsupported blueprint string version '{0}', only '0' is supported")]
    UnsupportedVersion(char),

    #[error("payload is not valid base64: {0}")]
    MalformedEncoding(String),

    #[error("compressed payload is corrupt: {0}")]
    CorruptPayload(String),

    #[error("schema violation at {path}: {message}")]
    SchemaViolation { path: String, message: String },
}

impl CodecError {
    pub(crate) fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaViolation {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Decode an exchange string into a validated document.
pub fn decode(text: &str) -> Result<Document, CodecError> {
    // Pasted strings routinely carry line breaks; the format never does.
    let cleaned: String = text.chars().filter(|c| *c != '\r' && *c != '\n').collect();

    let mut chars = cleaned.chars();
    let version = chars
        .next()
        .ok_or_else(|| CodecError::MalformedEncoding("empty blueprint string".to_string()))?;
    if version != SUPPORTED_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let compressed = base64::engine::general_purpose::STANDARD
        .decode(chars.as_str())
        .map_err(|e| CodecError::MalformedEncoding(e.to_string()))?;

    let mut json_bytes = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
        .read_to_end(&mut json_bytes)
        .map_err(|e| CodecError::CorruptPayload(e.to_string()))?;

    let mut document: Document = serde_json::from_slice(&json_bytes).map_err(|e| {
        CodecError::schema("document", e.to_string())
    })?;

    document.normalize();
    check_structure(&document)?;
    Ok(document)
}

/// Re-encode a document. Left inverse of `decode` up to semantic equality
/// of the document; byte equality of the payload is not promised.
pub fn encode(document: &Document) -> Result<String, CodecError> {
    check_structure(document)?;

    let json = serde_json::to_vec(document)
        .map_err(|e| CodecError::schema("document", e.to_string()))?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .and_then(|_| encoder.finish())
        .map(|compressed| {
            let mut out = String::with_capacity(compressed.len() * 4 / 3 + 1);
            out.push(SUPPORTED_VERSION);
            out.push_str(&base64::engine::general_purpose::STANDARD.encode(compressed));
            out
        })
        .map_err(|e| CodecError::CorruptPayload(e.to_string()))
}

/// Tree-level invariants: bounded nesting, at least one blueprint, and
/// per-blueprint structural validity.
fn check_structure(document: &Document) -> Result<(), CodecError> {
    if document.depth() > MAX_BOOK_DEPTH {
        return Err(CodecError::schema(
            "blueprint_book",
            format!("book nesting exceeds {MAX_BOOK_DEPTH} levels"),
        ));
    }

    let blueprints = document.blueprints();
    if blueprints.is_empty() {
        return Err(CodecError::schema(
            "blueprint_book.blueprints",
            "no blueprints found in document",
        ));
    }

    for blueprint in blueprints {
        blueprint
            .validate()
            .map_err(|issue| CodecError::schema(issue.path, issue.message))?;
    }
    Ok(())
}
