use crate::detector::DetectorError;
use crate::frame::DecodeError;
use crate::recognizer::RecognizerError;
use thiserror::Error;

/// Failures of the biometric pipeline.
///
/// Coordinators turn every variant into a `(ok = false, message)` reply;
/// none of them is fatal to the process.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No face found in image")]
    NoFace,
    #[error("Could not extract face features: {0}")]
    Encoding(String),
    #[error("need at least {required} valid samples, got {available}")]
    InsufficientSamples { required: usize, available: usize },
    #[error("No enrolled faces in database")]
    EmptyRegistry,
    #[error("Name {0} already exists")]
    DuplicateName(String),
    #[error("invalid image: {0}")]
    Decode(#[from] DecodeError),
    #[error("face detection failed: {0}")]
    Detector(#[from] DetectorError),
}

impl From<RecognizerError> for PipelineError {
    fn from(err: RecognizerError) -> Self {
        PipelineError::Encoding(err.to_string())
    }
}
