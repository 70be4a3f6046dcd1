//! Hashing - Determinism Evidence
//!
//! SHA-256 digests of render output. Identical documents against an
//! identical prototype table must produce identical digests.

use image::RgbaImage;
use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of bytes, return hex string.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Digest of a raster surface: dimensions plus the raw RGBA buffer, so
/// two images of different shape never collide on equal pixel runs.
pub fn image_digest(image: &RgbaImage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image.width().to_le_bytes());
    hasher.update(image.height().to_le_bytes());
    hasher.update(image.as_raw());
    hex::encode(hasher.finalize())
}

// We need hex encoding
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}
