//! Primary-face selection and embedding extraction.

use crate::detector::DetectorError;
use crate::error::PipelineError;
use crate::frame::Frame;
use crate::recognizer::RecognizerError;
use crate::types::{BoundingBox, Embedding};

/// Face detection backend.
pub trait FaceDetect {
    /// Detect candidate faces. Output order is the tie-break order for
    /// primary-face selection.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, DetectorError>;
}

/// Embedding backend for one detected face.
pub trait FaceEncode {
    fn encode(&mut self, frame: &Frame, face: &BoundingBox) -> Result<Embedding, RecognizerError>;
}

/// Turns an image into the embedding of its primary face.
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    /// Detections below this confidence are ignored.
    pub min_confidence: f32,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self { min_confidence: 0.5 }
    }
}

impl FeatureExtractor {
    pub fn new(min_confidence: f32) -> Self {
        Self { min_confidence }
    }

    /// Detect faces and return those that clear the confidence floor.
    pub fn detect(
        &self,
        detector: &mut dyn FaceDetect,
        frame: &Frame,
    ) -> Result<Vec<BoundingBox>, PipelineError> {
        let faces = detector.detect(frame)?;
        Ok(faces
            .into_iter()
            .filter(|f| f.confidence >= self.min_confidence)
            .collect())
    }

    /// The face the pipeline works on: the largest one above the floor.
    pub fn primary_face(
        &self,
        detector: &mut dyn FaceDetect,
        frame: &Frame,
    ) -> Result<Option<BoundingBox>, PipelineError> {
        let faces = self.detect(detector, frame)?;
        let Some(face) = select_primary(&faces) else {
            return Ok(None);
        };
        if faces.len() > 1 {
            tracing::debug!(
                faces = faces.len(),
                area = face.area(),
                "multiple faces detected; using the largest"
            );
        }
        Ok(Some(face.clone()))
    }

    /// Embedding of an already-located face.
    pub fn encode_face(
        &self,
        encoder: &mut dyn FaceEncode,
        frame: &Frame,
        face: &BoundingBox,
    ) -> Result<Embedding, PipelineError> {
        if face.area() <= 0.0 {
            return Err(PipelineError::Encoding("degenerate face region".into()));
        }

        let embedding = encoder.encode(frame, face)?;
        if embedding.values.is_empty() || embedding.values.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::Encoding("embedding is empty or non-finite".into()));
        }
        Ok(embedding)
    }

    /// Locate the primary face and compute its embedding.
    pub fn extract(
        &self,
        detector: &mut dyn FaceDetect,
        encoder: &mut dyn FaceEncode,
        frame: &Frame,
    ) -> Result<Embedding, PipelineError> {
        let face = self
            .primary_face(detector, frame)?
            .ok_or(PipelineError::NoFace)?;
        self.encode_face(encoder, frame, &face)
    }
}

/// Pick the face with the largest bounding-box area; ties go to the earliest.
pub fn select_primary(faces: &[BoundingBox]) -> Option<&BoundingBox> {
    let mut best: Option<&BoundingBox> = None;
    for face in faces {
        match best {
            Some(b) if face.area() <= b.area() => {}
            _ => best = Some(face),
        }
    }
    best
}
