//! Face detector via ONNX Runtime.
//!
//! Runs an UltraFace-style detection model (RFB-320): two output tensors,
//! per-anchor class scores and normalized corner boxes, followed by NMS.

use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const DETECTOR_INPUT_WIDTH: usize = 320;
const DETECTOR_INPUT_HEIGHT: usize = 240;
const DETECTOR_MEAN: f32 = 127.0;
const DETECTOR_STD: f32 = 128.0;
const DETECTOR_CONFIDENCE_THRESHOLD: f32 = 0.7;
const DETECTOR_NMS_THRESHOLD: f32 = 0.3;
/// Values per anchor in the score tensor: [background, face].
const SCORE_STRIDE: usize = 2;
/// Values per anchor in the box tensor: [x1, y1, x2, y2], normalized.
const BOX_STRIDE: usize = 4;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A detected face in source-image pixel coordinates.
#[derive(Debug, Clone)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

/// UltraFace-based face detector.
pub struct FaceDetector {
    session: Session,
}

impl FaceDetector {
    /// Load the detection ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face detection model"
        );

        Ok(Self { session })
    }

    /// Detect faces, returning boxes sorted by confidence descending.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceBox>, DetectorError> {
        let input = preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("scores: {e}")))?;
        let (_, boxes) = outputs[1]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("boxes: {e}")))?;

        let detections = decode(
            scores,
            boxes,
            image.width() as f32,
            image.height() as f32,
            DETECTOR_CONFIDENCE_THRESHOLD,
        );

        let mut result = nms(detections, DETECTOR_NMS_THRESHOLD);
        result.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(result)
    }
}

/// Resize to the model input size and normalize into a NCHW float tensor.
fn preprocess(image: &RgbImage) -> Array4<f32> {
    let resized = image::imageops::resize(
        image,
        DETECTOR_INPUT_WIDTH as u32,
        DETECTOR_INPUT_HEIGHT as u32,
        image::imageops::FilterType::Triangle,
    );

    let mut tensor =
        Array4::<f32>::zeros((1, 3, DETECTOR_INPUT_HEIGHT, DETECTOR_INPUT_WIDTH));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (pixel.0[c] as f32 - DETECTOR_MEAN) / DETECTOR_STD;
        }
    }
    tensor
}

/// Decode per-anchor scores and normalized corner boxes into pixel-space
/// face boxes above the confidence threshold.
fn decode(
    scores: &[f32],
    boxes: &[f32],
    image_width: f32,
    image_height: f32,
    threshold: f32,
) -> Vec<FaceBox> {
    let num_anchors = scores.len() / SCORE_STRIDE;
    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        // Index 1 of each score pair is the face-class probability.
        let confidence = scores[idx * SCORE_STRIDE + 1];
        if confidence < threshold {
            continue;
        }

        let box_off = idx * BOX_STRIDE;
        if box_off + 3 >= boxes.len() {
            continue;
        }

        detections.push(FaceBox {
            x1: (boxes[box_off] * image_width).clamp(0.0, image_width),
            y1: (boxes[box_off + 1] * image_height).clamp(0.0, image_height),
            x2: (boxes[box_off + 2] * image_width).clamp(0.0, image_width),
            y2: (boxes[box_off + 3] * image_height).clamp(0.0, image_height),
            confidence,
        });
    }

    detections
}

/// Non-Maximum Suppression: remove overlapping detections.
fn nms(mut detections: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<FaceBox> = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i].clone());

        for j in (i + 1)..detections.len() {
            if suppressed[j] {
                continue;
            }
            if iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Intersection-over-Union between two boxes.
fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> FaceBox {
        FaceBox { x1, y1, x2, y2, confidence }
    }

    #[test]
    fn decode_scales_normalized_boxes() {
        // Two anchors, one above threshold.
        let scores = [0.9, 0.1, 0.05, 0.95];
        let boxes = [0.0, 0.0, 0.5, 0.5, 0.25, 0.25, 0.75, 1.0];

        let dets = decode(&scores, &boxes, 640.0, 480.0, 0.7);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].x1, 160.0);
        assert_eq!(dets[0].y1, 120.0);
        assert_eq!(dets[0].x2, 480.0);
        assert_eq!(dets[0].y2, 480.0);
    }

    #[test]
    fn decode_clamps_to_image_bounds() {
        let scores = [0.0, 0.99];
        let boxes = [-0.1, -0.2, 1.5, 1.1];

        let dets = decode(&scores, &boxes, 100.0, 100.0, 0.7);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].x1, 0.0);
        assert_eq!(dets[0].y1, 0.0);
        assert_eq!(dets[0].x2, 100.0);
        assert_eq!(dets[0].y2, 100.0);
    }

    #[test]
    fn nms_suppresses_overlaps() {
        let dets = vec![
            face(0.0, 0.0, 100.0, 100.0, 0.9),
            face(5.0, 5.0, 105.0, 105.0, 0.8),
            face(200.0, 200.0, 300.0, 300.0, 0.7),
        ];

        let kept = nms(dets, 0.3);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.7);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = face(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = face(20.0, 20.0, 30.0, 30.0, 1.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = face(0.0, 0.0, 10.0, 10.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn preprocess_output_shape() {
        let image = RgbImage::from_pixel(64, 48, image::Rgb([127, 127, 127]));
        let tensor = preprocess(&image);
        assert_eq!(
            tensor.shape(),
            &[1, 3, DETECTOR_INPUT_HEIGHT, DETECTOR_INPUT_WIDTH]
        );
        // Pixel value 127 normalizes to 0.0.
        assert!(tensor[[0, 0, 0, 0]].abs() < 1e-6);
    }
}
