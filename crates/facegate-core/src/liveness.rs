//! Single-image liveness heuristics.
//!
//! Four additive checks (eye openness, Laplacian texture, Canny edge
//! density, face-to-frame area) plus a baseline for having a face at all.
//! The thresholds are deliberately lenient: this scorer annotates captures,
//! it is not an anti-spoofing gate. Any internal failure yields a pass.

use crate::detector::DetectorError;
use crate::extractor::{select_primary, FaceDetect};
use crate::filters;
use crate::frame::Frame;
use crate::mesh::{FaceLandmarks, LandmarkDetect, MeshError, LEFT_EYE, RIGHT_EYE};
use crate::types::{BoundingBox, LivenessResult, LIVENESS_SKIPPED, NO_FACE_DETECTED};
use std::fmt;
use thiserror::Error;

const EAR_RANGE: (f32, f32) = (0.08, 0.50);
const EAR_POINTS: u32 = 20;
const TEXTURE_MIN_VARIANCE: f64 = 40.0;
const TEXTURE_POINTS: u32 = 25;
const EDGE_DENSITY_RANGE: (f64, f64) = (0.01, 0.25);
const EDGE_POINTS: u32 = 20;
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
const FACE_RATIO_MIN: f32 = 0.02;
const FACE_RATIO_POINTS: u32 = 15;
const BASELINE_POINTS: u32 = 20;

/// Score reported when the heuristics are skipped.
pub const SKIPPED_SCORE: u32 = 50;

#[derive(Debug, Error)]
enum ScoreFailure {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("landmarks: {0}")]
    Mesh(#[from] MeshError),
    #[error("degenerate eye landmarks")]
    DegenerateEye,
}

/// Raw measurements behind a liveness score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivenessMetrics {
    pub eye_aspect_ratio: f32,
    pub texture_variance: f64,
    pub edge_density: f64,
    pub face_ratio: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct LivenessScorer {
    /// Minimum score for `passed`.
    pub pass_score: u32,
    /// Detections below this confidence are ignored.
    pub min_confidence: f32,
}

impl Default for LivenessScorer {
    fn default() -> Self {
        Self {
            pass_score: 40,
            min_confidence: 0.5,
        }
    }
}

impl LivenessScorer {
    /// Score one image. Never fails: internal errors degrade to a pass.
    pub fn score(
        &self,
        frame: &Frame,
        detector: &mut dyn FaceDetect,
        landmarker: &mut dyn LandmarkDetect,
    ) -> LivenessResult {
        let faces: Vec<BoundingBox> = match detector.detect(frame) {
            Ok(faces) => faces
                .into_iter()
                .filter(|f| f.confidence >= self.min_confidence)
                .collect(),
            Err(err) => return Self::skipped(&ScoreFailure::from(err)),
        };
        self.score_face(frame, select_primary(&faces), landmarker)
    }

    /// Score a face the caller has already located. `None` means no face.
    pub fn score_face(
        &self,
        frame: &Frame,
        face: Option<&BoundingBox>,
        landmarker: &mut dyn LandmarkDetect,
    ) -> LivenessResult {
        match self.try_score(frame, face, landmarker) {
            Ok(result) => result,
            Err(err) => Self::skipped(&err),
        }
    }

    /// The pass reported when the heuristics could not run.
    pub fn skipped(cause: &dyn fmt::Display) -> LivenessResult {
        tracing::warn!(error = %cause, "liveness check failed; assuming live");
        LivenessResult {
            passed: true,
            score: SKIPPED_SCORE,
            reasons: vec![LIVENESS_SKIPPED.to_string()],
        }
    }

    fn try_score(
        &self,
        frame: &Frame,
        face: Option<&BoundingBox>,
        landmarker: &mut dyn LandmarkDetect,
    ) -> Result<LivenessResult, ScoreFailure> {
        let Some(face) = face else {
            return Ok(no_face());
        };
        let Some(landmarks) = landmarker.landmarks(frame, face)? else {
            return Ok(no_face());
        };

        let metrics = measure(frame, &landmarks)?;
        let result = self.evaluate(&metrics);

        tracing::info!(
            score = result.score,
            passed = result.passed,
            ear = metrics.eye_aspect_ratio,
            texture = metrics.texture_variance,
            edges = metrics.edge_density,
            face_ratio = metrics.face_ratio,
            "liveness analysis"
        );
        Ok(result)
    }

    /// Turn measurements into a score and the list of failed checks.
    pub fn evaluate(&self, m: &LivenessMetrics) -> LivenessResult {
        let mut score = 0;
        let mut reasons = Vec::new();

        if m.eye_aspect_ratio > EAR_RANGE.0 && m.eye_aspect_ratio < EAR_RANGE.1 {
            score += EAR_POINTS;
        } else {
            reasons.push(format!("Eye ratio: {:.3}", m.eye_aspect_ratio));
        }

        if m.texture_variance > TEXTURE_MIN_VARIANCE {
            score += TEXTURE_POINTS;
        } else {
            reasons.push(format!("Low texture: {:.1}", m.texture_variance));
        }

        if m.edge_density > EDGE_DENSITY_RANGE.0 && m.edge_density < EDGE_DENSITY_RANGE.1 {
            score += EDGE_POINTS;
        } else {
            reasons.push(format!("Edge density: {:.3}", m.edge_density));
        }

        if m.face_ratio > FACE_RATIO_MIN {
            score += FACE_RATIO_POINTS;
        } else {
            reasons.push(format!("Face too small: {:.3}", m.face_ratio));
        }

        score += BASELINE_POINTS;

        LivenessResult {
            passed: score >= self.pass_score,
            score,
            reasons,
        }
    }
}

fn no_face() -> LivenessResult {
    LivenessResult {
        passed: false,
        score: 0,
        reasons: vec![NO_FACE_DETECTED.to_string()],
    }
}

fn measure(frame: &Frame, landmarks: &FaceLandmarks) -> Result<LivenessMetrics, ScoreFailure> {
    let left = eye_aspect_ratio(&landmarks.eye(&LEFT_EYE)).ok_or(ScoreFailure::DegenerateEye)?;
    let right = eye_aspect_ratio(&landmarks.eye(&RIGHT_EYE)).ok_or(ScoreFailure::DegenerateEye)?;

    let (w, h) = (frame.width as usize, frame.height as usize);
    let gray = frame.to_grayscale();

    let (x0, y0, x1, y1) = landmarks.bounds();
    let face_area = (x1 - x0).max(0.0) * (y1 - y0).max(0.0);

    Ok(LivenessMetrics {
        eye_aspect_ratio: (left + right) / 2.0,
        texture_variance: filters::laplacian_variance(&gray, w, h),
        edge_density: filters::edge_density(&gray, w, h, CANNY_LOW, CANNY_HIGH),
        face_ratio: face_area / frame.pixel_count() as f32,
    })
}

/// Eye aspect ratio from six contour points [outer, top, top, inner, bottom, bottom]:
/// (|y1 − y5| + |y2 − y4|) / (2 · |x0 − x3|). `None` for a zero-width eye.
pub fn eye_aspect_ratio(p: &[(f32, f32); 6]) -> Option<f32> {
    let v1 = (p[1].1 - p[5].1).abs();
    let v2 = (p[2].1 - p[4].1).abs();
    let w = (p[0].0 - p[3].0).abs();
    if w <= f32::EPSILON {
        return None;
    }
    Some((v1 + v2) / (2.0 * w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    const POINTS: usize = 468;

    fn metrics(ear: f32, texture: f64, edges: f64, ratio: f32) -> LivenessMetrics {
        LivenessMetrics {
            eye_aspect_ratio: ear,
            texture_variance: texture,
            edge_density: edges,
            face_ratio: ratio,
        }
    }

    /// Landmarks filling the square (10, 10)..(10 + extent, 10 + extent),
    /// with both eyes `eye_w` wide and `eye_h` tall.
    fn landmarks(extent: f32, eye_w: f32, eye_h: f32) -> FaceLandmarks {
        let mut pts = vec![(10.0 + extent / 2.0, 10.0 + extent / 2.0); POINTS];
        pts[0] = (10.0, 10.0);
        pts[1] = (10.0 + extent, 10.0 + extent);
        let cy = 10.0 + extent * 0.4;
        for (eye, cx) in [(LEFT_EYE, 10.0 + extent * 0.3), (RIGHT_EYE, 10.0 + extent * 0.7)] {
            let dx = eye_w / 4.0;
            pts[eye[0]] = (cx - eye_w / 2.0, cy);
            pts[eye[3]] = (cx + eye_w / 2.0, cy);
            pts[eye[1]] = (cx - dx, cy - eye_h / 2.0);
            pts[eye[2]] = (cx + dx, cy - eye_h / 2.0);
            pts[eye[5]] = (cx - dx, cy + eye_h / 2.0);
            pts[eye[4]] = (cx + dx, cy + eye_h / 2.0);
        }
        FaceLandmarks::new(pts).unwrap()
    }

    struct FixedDetector(Result<Vec<BoundingBox>, ()>);

    impl FaceDetect for FixedDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<BoundingBox>, DetectorError> {
            self.0
                .clone()
                .map_err(|_| DetectorError::InferenceFailed("scripted".into()))
        }
    }

    struct FixedMesh(Option<FaceLandmarks>);

    impl LandmarkDetect for FixedMesh {
        fn landmarks(
            &mut self,
            _frame: &Frame,
            _face: &BoundingBox,
        ) -> Result<Option<FaceLandmarks>, MeshError> {
            Ok(self.0.clone())
        }
    }

    fn one_face() -> Vec<BoundingBox> {
        vec![BoundingBox {
            x: 10.0, y: 10.0, width: 50.0, height: 50.0,
            confidence: 0.9, landmarks: None,
        }]
    }

    fn flat_gray(w: u32, h: u32) -> Frame {
        Frame::from_rgb(w, h, vec![128u8; (w * h * 3) as usize]).unwrap()
    }

    /// 16-pixel black/white blocks: rich texture, moderate edge density.
    fn blocks(w: u32, h: u32) -> Frame {
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                let v = if ((x / 16) + (y / 16)) % 2 == 0 { 0 } else { 255 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        Frame::from_rgb(w, h, data).unwrap()
    }

    #[test]
    fn test_eye_aspect_ratio() {
        let p = [(0.0, 0.0), (4.0, -3.0), (6.0, -3.0), (10.0, 0.0), (6.0, 3.0), (4.0, 3.0)];
        assert!((eye_aspect_ratio(&p).unwrap() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_eye_aspect_ratio_zero_width() {
        let p = [(5.0, 0.0), (5.0, -3.0), (5.0, -3.0), (5.0, 0.0), (5.0, 3.0), (5.0, 3.0)];
        assert!(eye_aspect_ratio(&p).is_none());
    }

    #[test]
    fn test_evaluate_all_pass() {
        let r = LivenessScorer::default().evaluate(&metrics(0.3, 500.0, 0.1, 0.2));
        assert_eq!(r.score, 100);
        assert!(r.passed);
        assert!(r.reasons.is_empty());
    }

    #[test]
    fn test_evaluate_all_fail_keeps_baseline() {
        let r = LivenessScorer::default().evaluate(&metrics(0.0, 0.0, 0.0, 0.0));
        assert_eq!(r.score, 20);
        assert!(!r.passed);
        assert_eq!(
            r.reasons,
            vec![
                "Eye ratio: 0.000",
                "Low texture: 0.0",
                "Edge density: 0.000",
                "Face too small: 0.000",
            ]
        );
    }

    #[test]
    fn test_evaluate_bounds_are_strict() {
        let scorer = LivenessScorer::default();
        let r = scorer.evaluate(&metrics(0.50, 40.0, 0.25, 0.02));
        assert_eq!(r.score, 20);
        let r = scorer.evaluate(&metrics(0.08, 40.0, 0.01, 0.02));
        assert_eq!(r.score, 20);
    }

    #[test]
    fn test_evaluate_pass_threshold() {
        let scorer = LivenessScorer::default();
        // Eye (20) + baseline (20) = 40: exactly at the pass line.
        let r = scorer.evaluate(&metrics(0.3, 0.0, 0.0, 0.0));
        assert_eq!(r.score, 40);
        assert!(r.passed);
        // Face ratio (15) + baseline (20) = 35.
        let r = scorer.evaluate(&metrics(0.0, 0.0, 0.0, 0.5));
        assert_eq!(r.score, 35);
        assert!(!r.passed);
    }

    #[test]
    fn test_flat_gray_fails_texture() {
        let frame = flat_gray(100, 100);
        // Closed eyes and a 2×2-pixel face: only the baseline remains.
        let r = LivenessScorer::default().score(
            &frame,
            &mut FixedDetector(Ok(one_face())),
            &mut FixedMesh(Some(landmarks(2.0, 0.5, 0.0))),
        );
        assert!(r.reasons.iter().any(|s| s.starts_with("Low texture")));
        assert_eq!(r.score, 20);
        assert!(!r.passed);
    }

    #[test]
    fn test_flat_gray_with_open_eyes() {
        let frame = flat_gray(100, 100);
        // Open eyes (EAR 0.3) and a 60×60 face: 20 + 15 + 20 baseline.
        let r = LivenessScorer::default().score(
            &frame,
            &mut FixedDetector(Ok(one_face())),
            &mut FixedMesh(Some(landmarks(60.0, 10.0, 3.0))),
        );
        assert_eq!(r.score, 55);
        assert!(r.passed);
        assert_eq!(r.reasons.len(), 2);
    }

    #[test]
    fn test_textured_frame_scores_full() {
        let frame = blocks(128, 128);
        let r = LivenessScorer::default().score(
            &frame,
            &mut FixedDetector(Ok(one_face())),
            &mut FixedMesh(Some(landmarks(60.0, 10.0, 3.0))),
        );
        assert_eq!(r.score, 100, "reasons: {:?}", r.reasons);
        assert!(r.passed);
    }

    #[test]
    fn test_no_face_detected() {
        let r = LivenessScorer::default().score(
            &flat_gray(32, 32),
            &mut FixedDetector(Ok(vec![])),
            &mut FixedMesh(None),
        );
        assert_eq!(r, no_face());
    }

    #[test]
    fn test_mesh_sees_no_face() {
        let r = LivenessScorer::default().score(
            &flat_gray(32, 32),
            &mut FixedDetector(Ok(one_face())),
            &mut FixedMesh(None),
        );
        assert!(!r.passed);
        assert_eq!(r.score, 0);
    }

    #[test]
    fn test_detector_failure_fails_open() {
        let r = LivenessScorer::default().score(
            &flat_gray(32, 32),
            &mut FixedDetector(Err(())),
            &mut FixedMesh(None),
        );
        assert!(r.passed);
        assert!(r.is_skipped());
        assert_eq!(r.score, SKIPPED_SCORE);
    }

    #[test]
    fn test_degenerate_eye_fails_open() {
        let r = LivenessScorer::default().score(
            &flat_gray(32, 32),
            &mut FixedDetector(Ok(one_face())),
            &mut FixedMesh(Some(landmarks(20.0, 0.0, 3.0))),
        );
        assert!(r.is_skipped());
    }
}
