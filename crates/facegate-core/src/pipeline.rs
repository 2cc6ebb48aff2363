//! The model set behind one engine: detector, encoder and landmarker.

use crate::detector::{DetectorError, ScrfdDetector, SCRFD_MODEL_FILE};
use crate::error::PipelineError;
use crate::extractor::{FaceDetect, FaceEncode, FeatureExtractor};
use crate::frame::Frame;
use crate::liveness::LivenessScorer;
use crate::mesh::{LandmarkDetect, MeshError, OnnxFaceMesh, MESH_MODEL_FILE};
use crate::recognizer::{ArcFaceEncoder, RecognizerError, ARCFACE_MODEL_FILE};
use crate::types::{Embedding, LivenessResult};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("face mesh: {0}")]
    Mesh(#[from] MeshError),
}

/// Tunables shared by extraction and liveness scoring.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub detection_confidence: f32,
    pub liveness_pass_score: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            detection_confidence: 0.5,
            liveness_pass_score: 40,
        }
    }
}

/// Owns the inference backends and runs the per-image stages.
pub struct Pipeline {
    detector: Box<dyn FaceDetect + Send>,
    encoder: Box<dyn FaceEncode + Send>,
    landmarker: Box<dyn LandmarkDetect + Send>,
    extractor: FeatureExtractor,
    liveness: LivenessScorer,
}

impl Pipeline {
    pub fn new(
        detector: Box<dyn FaceDetect + Send>,
        encoder: Box<dyn FaceEncode + Send>,
        landmarker: Box<dyn LandmarkDetect + Send>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            detector,
            encoder,
            landmarker,
            extractor: FeatureExtractor::new(settings.detection_confidence),
            liveness: LivenessScorer {
                pass_score: settings.liveness_pass_score,
                min_confidence: settings.detection_confidence,
            },
        }
    }

    /// Load the SCRFD, ArcFace and face mesh models from `model_dir`.
    pub fn load(model_dir: &Path, settings: PipelineSettings) -> Result<Self, ModelLoadError> {
        let detector = ScrfdDetector::load(
            &model_dir.join(SCRFD_MODEL_FILE),
            settings.detection_confidence,
        )?;
        let encoder = ArcFaceEncoder::load(&model_dir.join(ARCFACE_MODEL_FILE))?;
        let landmarker = OnnxFaceMesh::load(&model_dir.join(MESH_MODEL_FILE))?;
        tracing::info!(dir = %model_dir.display(), "models loaded");

        Ok(Self::new(
            Box::new(detector),
            Box::new(encoder),
            Box::new(landmarker),
            settings,
        ))
    }

    pub fn extract(&mut self, frame: &Frame) -> Result<Embedding, PipelineError> {
        self.extractor
            .extract(self.detector.as_mut(), self.encoder.as_mut(), frame)
    }

    pub fn score_liveness(&mut self, frame: &Frame) -> LivenessResult {
        self.liveness
            .score(frame, self.detector.as_mut(), self.landmarker.as_mut())
    }

    /// Liveness and embedding for one image from a single detection pass.
    pub fn analyze(&mut self, frame: &Frame) -> Analysis {
        let face = match self.extractor.primary_face(self.detector.as_mut(), frame) {
            Ok(face) => face,
            Err(err) => {
                return Analysis {
                    liveness: LivenessScorer::skipped(&err),
                    embedding: Err(err),
                };
            }
        };

        let liveness = self
            .liveness
            .score_face(frame, face.as_ref(), self.landmarker.as_mut());
        let embedding = match &face {
            Some(face) => self
                .extractor
                .encode_face(self.encoder.as_mut(), frame, face),
            None => Err(PipelineError::NoFace),
        };
        Analysis {
            liveness,
            embedding,
        }
    }
}

/// Per-image result of [`Pipeline::analyze`].
#[derive(Debug)]
pub struct Analysis {
    pub liveness: LivenessResult,
    pub embedding: Result<Embedding, PipelineError>,
}
