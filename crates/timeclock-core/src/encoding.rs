//! Face encoding vector and its at-rest codec.
//!
//! Stored encodings are base64 text of the raw little-endian f64 byte
//! sequence of a 128-element vector. Encodings written by earlier releases
//! decode byte-for-byte, so the layout here is a compatibility contract.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use thiserror::Error;

/// Dimensionality of a face encoding.
pub const ENCODING_DIM: usize = 128;

const ENCODING_BYTES: usize = ENCODING_DIM * 8;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("expected {ENCODING_BYTES} bytes of encoding data, got {0}")]
    WrongLength(usize),
}

/// A 128-dimensional face embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceEncoding {
    values: Vec<f64>,
}

impl FaceEncoding {
    /// Build from raw values; the vector must be exactly 128 elements.
    pub fn from_values(values: Vec<f64>) -> Result<Self, CodecError> {
        if values.len() != ENCODING_DIM {
            return Err(CodecError::WrongLength(values.len() * 8));
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Serialize to the at-rest base64 form (little-endian f64 bytes).
    pub fn to_base64(&self) -> String {
        let mut bytes = Vec::with_capacity(ENCODING_BYTES);
        for v in &self.values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        BASE64.encode(bytes)
    }

    /// Parse the at-rest base64 form. Rejects payloads that are not exactly
    /// 128 little-endian f64 values.
    pub fn from_base64(text: &str) -> Result<Self, CodecError> {
        let bytes = BASE64.decode(text)?;
        if bytes.len() != ENCODING_BYTES {
            return Err(CodecError::WrongLength(bytes.len()));
        }
        let values = bytes
            .chunks_exact(8)
            .map(|chunk| f64::from_le_bytes(chunk.try_into().expect("chunk is 8 bytes")))
            .collect();
        Ok(Self { values })
    }

    /// Euclidean distance to another encoding. Lower is more similar.
    pub fn euclidean_distance(&self, other: &FaceEncoding) -> f64 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}
