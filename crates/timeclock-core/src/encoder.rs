//! Face encoder: raw image bytes to a 128-dimensional face encoding.
//!
//! Decodes the payload, finds the best face with the detector, crops it with
//! a margin, and runs the embedding model. Used for both enrollment and for
//! every incoming attendance probe.

use crate::detector::{DetectorError, FaceBox, FaceDetector};
use crate::encoding::{FaceEncoding, ENCODING_DIM};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const EMBEDDER_INPUT_SIZE: usize = 150;
const EMBEDDER_MEAN: f32 = 127.5;
const EMBEDDER_STD: f32 = 128.0;
/// Fractional margin added around the detected box before cropping; the
/// embedding model expects some context around the face.
const CROP_MARGIN: f32 = 0.2;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("image payload could not be decoded: {0}")]
    ImageDecode(String),
    #[error("no face detected in image")]
    NoFaceDetected,
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Seam between the pipeline and the ONNX-backed encoder, so callers can be
/// exercised without model files on disk.
pub trait FaceEmbedder: Send {
    fn encode(&mut self, image_bytes: &[u8]) -> Result<FaceEncoding, EncoderError>;
}

/// ONNX-backed face encoder: detection model + embedding model.
pub struct FaceEncoder {
    detector: FaceDetector,
    session: Session,
}

impl FaceEncoder {
    /// Load both ONNX models.
    pub fn load(detector_path: &str, embedder_path: &str) -> Result<Self, EncoderError> {
        let detector = FaceDetector::load(detector_path)?;

        if !Path::new(embedder_path).exists() {
            return Err(EncoderError::ModelNotFound(embedder_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(embedder_path)?;

        tracing::info!(
            path = embedder_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face embedding model"
        );

        Ok(Self { detector, session })
    }

    fn embed(&mut self, face_crop: &RgbImage) -> Result<FaceEncoding, EncoderError> {
        let input = preprocess(face_crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EncoderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != ENCODING_DIM {
            return Err(EncoderError::InferenceFailed(format!(
                "expected {ENCODING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        let values: Vec<f64> = raw.iter().map(|&v| v as f64).collect();
        FaceEncoding::from_values(values).map_err(|e| EncoderError::InferenceFailed(e.to_string()))
    }
}

impl FaceEmbedder for FaceEncoder {
    /// Decode image bytes, detect the best face, and extract its encoding.
    fn encode(&mut self, image_bytes: &[u8]) -> Result<FaceEncoding, EncoderError> {
        if image_bytes.is_empty() {
            return Err(EncoderError::ImageDecode("empty payload".to_string()));
        }

        let image = image::load_from_memory(image_bytes)
            .map_err(|e| EncoderError::ImageDecode(e.to_string()))?
            .to_rgb8();

        let faces = self.detector.detect(&image)?;
        // Detections are sorted by confidence; take the best one.
        let face = faces.first().ok_or(EncoderError::NoFaceDetected)?;
        tracing::debug!(
            confidence = face.confidence,
            detected = faces.len(),
            "face selected for encoding"
        );

        let (x, y, w, h) = crop_region(face, image.width(), image.height());
        let face_crop = image::imageops::crop_imm(&image, x, y, w, h).to_image();
        let face_crop = image::imageops::resize(
            &face_crop,
            EMBEDDER_INPUT_SIZE as u32,
            EMBEDDER_INPUT_SIZE as u32,
            image::imageops::FilterType::Triangle,
        );

        self.embed(&face_crop)
    }
}

/// Expand a face box by the crop margin and clamp it to the image bounds.
/// Returns (x, y, width, height) in pixels, never degenerate.
fn crop_region(face: &FaceBox, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
    let box_w = (face.x2 - face.x1).max(1.0);
    let box_h = (face.y2 - face.y1).max(1.0);

    let x1 = (face.x1 - box_w * CROP_MARGIN).max(0.0);
    let y1 = (face.y1 - box_h * CROP_MARGIN).max(0.0);
    let x2 = (face.x2 + box_w * CROP_MARGIN).min(image_width as f32);
    let y2 = (face.y2 + box_h * CROP_MARGIN).min(image_height as f32);

    let x = (x1 as u32).min(image_width.saturating_sub(1));
    let y = (y1 as u32).min(image_height.saturating_sub(1));
    let w = ((x2 - x1) as u32).max(1).min(image_width - x);
    let h = ((y2 - y1) as u32).max(1).min(image_height - y);
    (x, y, w, h)
}

/// Normalize a face crop into a NCHW float tensor.
fn preprocess(face_crop: &RgbImage) -> Array4<f32> {
    let size = EMBEDDER_INPUT_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for (x, y, pixel) in face_crop.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (pixel.0[c] as f32 - EMBEDDER_MEAN) / EMBEDDER_STD;
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preprocess_output_shape_and_normalization() {
        let crop = RgbImage::from_pixel(
            EMBEDDER_INPUT_SIZE as u32,
            EMBEDDER_INPUT_SIZE as u32,
            image::Rgb([128, 128, 128]),
        );
        let tensor = preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, 3, EMBEDDER_INPUT_SIZE, EMBEDDER_INPUT_SIZE]);

        let expected = (128.0 - EMBEDDER_MEAN) / EMBEDDER_STD;
        assert!((tensor[[0, 0, 0, 0]] - expected).abs() < 1e-6);
    }

    #[test]
    fn crop_region_adds_margin() {
        let face = FaceBox { x1: 100.0, y1: 100.0, x2: 200.0, y2: 200.0, confidence: 0.9 };
        let (x, y, w, h) = crop_region(&face, 640, 480);
        assert_eq!((x, y), (80, 80));
        assert_eq!((w, h), (140, 140));
    }

    #[test]
    fn crop_region_clamps_at_image_edges() {
        let face = FaceBox { x1: 0.0, y1: 0.0, x2: 100.0, y2: 100.0, confidence: 0.9 };
        let (x, y, w, h) = crop_region(&face, 110, 110);
        assert_eq!((x, y), (0, 0));
        assert_eq!((w, h), (110, 110));
    }

    #[test]
    fn crop_region_never_degenerate() {
        let face = FaceBox { x1: 50.0, y1: 50.0, x2: 50.0, y2: 50.0, confidence: 0.9 };
        let (_, _, w, h) = crop_region(&face, 100, 100);
        assert!(w >= 1 && h >= 1);
    }
}
