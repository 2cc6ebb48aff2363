//! facegate-core: Biometric decision pipeline.
//!
//! SCRFD locates faces, ArcFace turns the primary face into an embedding,
//! a 468-point face mesh feeds the liveness heuristics, and a cosine
//! matcher finds the nearest enrolled identity. All inference runs on the
//! CPU via ONNX Runtime; every model sits behind a trait so the pipeline
//! can be driven by scripted backends in tests.

pub mod aggregate;
pub mod alignment;
pub mod detector;
pub mod error;
pub mod extractor;
pub mod filters;
pub mod frame;
pub mod liveness;
pub mod matcher;
pub mod mesh;
pub mod pipeline;
pub mod recognizer;
pub mod types;

pub use aggregate::{AggregationPolicy, MeanAggregation};
pub use detector::DetectorError;
pub use error::PipelineError;
pub use extractor::{FaceDetect, FaceEncode, FeatureExtractor};
pub use frame::{DecodeError, Frame};
pub use liveness::LivenessScorer;
pub use matcher::{
    CosineMatcher, EuclideanMatcher, MatchMetric, MatchResult, Matcher, UNKNOWN_IDENTITY,
};
pub use mesh::{FaceLandmarks, LandmarkDetect, MeshError};
pub use pipeline::{Analysis, ModelLoadError, Pipeline, PipelineSettings};
pub use recognizer::RecognizerError;
pub use types::{
    BoundingBox, Embedding, EnrolledIdentity, LivenessResult, RecognitionOutcome, SecurityLevel,
    LIVENESS_NOT_EVALUATED,
};

use std::path::PathBuf;

/// Default location of the ONNX model files.
pub fn default_model_dir() -> PathBuf {
    let data_dir = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        });
    data_dir.join("facegate").join("models")
}
