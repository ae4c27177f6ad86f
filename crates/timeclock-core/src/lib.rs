//! timeclock-core — Face embedding extraction and gallery matching.
//!
//! Detection and embedding both run via ONNX Runtime for CPU inference.
//! Embeddings are 128-dimensional f64 vectors; the base64 at-rest codec in
//! [`encoding`] is an interoperability contract with previously enrolled
//! identities and must not change.

pub mod detector;
pub mod encoder;
pub mod encoding;
pub mod matcher;

pub use encoder::{EncoderError, FaceEmbedder, FaceEncoder};
pub use encoding::{FaceEncoding, ENCODING_DIM};
pub use matcher::{EuclideanMatcher, GalleryEntry, MatchResult, Matcher};
