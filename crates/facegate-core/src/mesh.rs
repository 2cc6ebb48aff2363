//! 468-point face mesh landmarker via ONNX Runtime.
//!
//! The mesh model runs on a square crop around a detected face. Only the
//! liveness heuristics consume these landmarks.

use crate::frame::Frame;
use crate::types::BoundingBox;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const MESH_INPUT_SIZE: usize = 192;
const MESH_POINTS: usize = 468;
/// The crop is the detection box enlarged by this factor around its centre.
const MESH_CROP_SCALE: f32 = 1.5;
const MESH_PRESENCE_THRESHOLD: f32 = 0.5;

/// Face mesh model file name inside the model directory.
pub const MESH_MODEL_FILE: &str = "face_landmark.onnx";

/// Eye contour indices in mesh order: [outer, top, top, inner, bottom, bottom].
pub const LEFT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
pub const RIGHT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("expected {MESH_POINTS} landmarks, got {0}")]
    PointCount(usize),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Dense facial landmarks in source-image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLandmarks {
    pub points: Vec<(f32, f32)>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<(f32, f32)>) -> Result<Self, MeshError> {
        if points.len() < MESH_POINTS {
            return Err(MeshError::PointCount(points.len()));
        }
        Ok(Self { points })
    }

    pub fn eye(&self, indices: &[usize; 6]) -> [(f32, f32); 6] {
        indices.map(|i| self.points[i])
    }

    /// Axis-aligned bounds of all points: (min_x, min_y, max_x, max_y).
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        self.points.iter().fold(
            (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
            |(x0, y0, x1, y1), &(x, y)| (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        )
    }
}

/// Dense landmark backend.
pub trait LandmarkDetect {
    /// Landmarks for the face inside `face`, or `None` if the model does
    /// not see a face there.
    fn landmarks(
        &mut self,
        frame: &Frame,
        face: &BoundingBox,
    ) -> Result<Option<FaceLandmarks>, MeshError>;
}

/// Square crop region in source pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Crop {
    x: f32,
    y: f32,
    size: f32,
}

impl Crop {
    fn around(face: &BoundingBox) -> Self {
        let size = face.width.max(face.height) * MESH_CROP_SCALE;
        let cx = face.x + face.width / 2.0;
        let cy = face.y + face.height / 2.0;
        Crop {
            x: cx - size / 2.0,
            y: cy - size / 2.0,
            size,
        }
    }

    fn to_source(&self, (x, y): (f32, f32)) -> (f32, f32) {
        let scale = self.size / MESH_INPUT_SIZE as f32;
        (self.x + x * scale, self.y + y * scale)
    }
}

/// ONNX face mesh landmarker (192×192 RGB input in [0, 1]).
pub struct OnnxFaceMesh {
    session: Session,
    /// Whether the model exports a second "face present" logit.
    has_presence: bool,
}

impl OnnxFaceMesh {
    pub fn load(model_path: &Path) -> Result<Self, MeshError> {
        if !model_path.exists() {
            return Err(MeshError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(1)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face mesh model"
        );

        let has_presence = session.outputs().len() > 1;
        Ok(Self {
            session,
            has_presence,
        })
    }

    fn preprocess(frame: &Frame, crop: &Crop) -> Array4<f32> {
        let mut tensor = Array4::<f32>::zeros((1, 3, MESH_INPUT_SIZE, MESH_INPUT_SIZE));
        for y in 0..MESH_INPUT_SIZE {
            for x in 0..MESH_INPUT_SIZE {
                let (sx, sy) = crop.to_source((x as f32 + 0.5, y as f32 + 0.5));
                for c in 0..3 {
                    tensor[[0, c, y, x]] = frame.sample(sx - 0.5, sy - 0.5, c) / 255.0;
                }
            }
        }
        tensor
    }
}

impl LandmarkDetect for OnnxFaceMesh {
    fn landmarks(
        &mut self,
        frame: &Frame,
        face: &BoundingBox,
    ) -> Result<Option<FaceLandmarks>, MeshError> {
        let crop = Crop::around(face);
        let input = Self::preprocess(frame, &crop);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, coords) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| MeshError::InferenceFailed(format!("landmarks: {e}")))?;
        let presence = if self.has_presence {
            let (_, flag) = outputs[1]
                .try_extract_tensor::<f32>()
                .map_err(|e| MeshError::InferenceFailed(format!("face flag: {e}")))?;
            flag.first().copied().map(sigmoid).unwrap_or(1.0)
        } else {
            1.0
        };

        if presence < MESH_PRESENCE_THRESHOLD {
            tracing::debug!(presence, "face mesh: no face in crop");
            return Ok(None);
        }

        decode_points(coords, &crop).map(Some)
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Interpret the flat (x, y, z) output and map it back to source pixels.
fn decode_points(coords: &[f32], crop: &Crop) -> Result<FaceLandmarks, MeshError> {
    if coords.len() < MESH_POINTS * 3 {
        return Err(MeshError::PointCount(coords.len() / 3));
    }
    let points = coords
        .chunks_exact(3)
        .take(MESH_POINTS)
        .map(|p| crop.to_source((p[0], p[1])))
        .collect();
    FaceLandmarks::new(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_around_face() {
        let face = BoundingBox {
            x: 100.0, y: 50.0, width: 80.0, height: 100.0,
            confidence: 0.9, landmarks: None,
        };
        let crop = Crop::around(&face);
        assert_eq!(crop, Crop { x: 65.0, y: 25.0, size: 150.0 });
    }

    #[test]
    fn test_decode_points_maps_to_source() {
        let crop = Crop { x: 10.0, y: 20.0, size: 384.0 };
        let mut coords = vec![0.0f32; MESH_POINTS * 3];
        coords[3] = 96.0;
        coords[4] = 48.0;
        let lm = decode_points(&coords, &crop).unwrap();
        assert_eq!(lm.points.len(), MESH_POINTS);
        assert_eq!(lm.points[0], (10.0, 20.0));
        assert_eq!(lm.points[1], (202.0, 116.0));
    }

    #[test]
    fn test_decode_points_short_output() {
        let crop = Crop { x: 0.0, y: 0.0, size: 192.0 };
        assert!(matches!(
            decode_points(&[0.0; 30], &crop),
            Err(MeshError::PointCount(10))
        ));
    }

    #[test]
    fn test_landmarks_bounds_and_eye() {
        let mut points = vec![(50.0f32, 50.0f32); MESH_POINTS];
        points[10] = (20.0, 70.0);
        points[LEFT_EYE[0]] = (90.0, 5.0);
        let lm = FaceLandmarks::new(points).unwrap();
        assert_eq!(lm.bounds(), (20.0, 5.0, 90.0, 70.0));
        assert_eq!(lm.eye(&LEFT_EYE)[0], (90.0, 5.0));
    }

    #[test]
    fn test_preprocess_range() {
        let frame = Frame::from_rgb(64, 64, vec![255u8; 64 * 64 * 3]).unwrap();
        let crop = Crop { x: 0.0, y: 0.0, size: 64.0 };
        let t = OnnxFaceMesh::preprocess(&frame, &crop);
        assert_eq!(t.shape(), &[1, 3, MESH_INPUT_SIZE, MESH_INPUT_SIZE]);
        assert!((t[[0, 1, 96, 96]] - 1.0).abs() < 1e-4);
    }
}
