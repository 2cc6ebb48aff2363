use serde::{Deserialize, Serialize};
use std::fmt;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Box area in pixels. Degenerate (negative) extents count as zero.
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance between two embeddings.
    ///
    /// Embeddings of different dimension come from different models and are
    /// never comparable; their distance is `f32::INFINITY`.
    pub fn distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Cosine distance `1 − cos θ`, in [0, 2].
    ///
    /// The metric ArcFace embeddings are trained for. Mismatched dimensions
    /// and zero vectors give `f32::INFINITY`.
    pub fn cosine_distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
        for (a, b) in self.values.iter().zip(other.values.iter()) {
            let (a, b) = (*a as f64, *b as f64);
            dot += a * b;
            na += a * a;
            nb += b * b;
        }
        if na == 0.0 || nb == 0.0 {
            return f32::INFINITY;
        }
        let cos = (dot / (na.sqrt() * nb.sqrt())).clamp(-1.0, 1.0);
        (1.0 - cos) as f32
    }
}

/// An enrolled identity: one name, one aggregated embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrolledIdentity {
    pub name: String,
    pub embedding: Embedding,
    /// Number of images whose embeddings were averaged into `embedding`.
    pub sample_count: usize,
    pub created_at: String,
    pub updated_at: String,
}

/// Reason recorded when the liveness heuristics could not run.
pub const LIVENESS_SKIPPED: &str = "liveness check skipped";

/// Reason recorded when a request failed before liveness could run.
pub const LIVENESS_NOT_EVALUATED: &str = "liveness not evaluated";

/// Reason recorded when no facial landmarks were found.
pub const NO_FACE_DETECTED: &str = "No face detected";

/// Outcome of the liveness heuristics for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessResult {
    pub passed: bool,
    /// Additive score in 0..=100.
    pub score: u32,
    /// One entry per failed sub-check, in evaluation order.
    pub reasons: Vec<String>,
}

impl LivenessResult {
    /// Number of reasons surfaced in [`message`](Self::message).
    pub const SURFACED_REASONS: usize = 2;

    /// True when the heuristics failed internally and the result was
    /// defaulted to a pass.
    pub fn is_skipped(&self) -> bool {
        self.passed && self.reasons.first().map(String::as_str) == Some(LIVENESS_SKIPPED)
    }

    /// Caller-facing summary, e.g. `Live face detected (score: 80/100)`.
    pub fn message(&self) -> String {
        if self.is_skipped() {
            "Liveness check skipped - assuming live".to_string()
        } else if self.passed {
            format!("Live face detected (score: {}/100)", self.score)
        } else if self.score == 0 {
            self.reasons
                .first()
                .cloned()
                .unwrap_or_else(|| NO_FACE_DETECTED.to_string())
        } else {
            let surfaced: Vec<&str> = self
                .reasons
                .iter()
                .take(Self::SURFACED_REASONS)
                .map(String::as_str)
                .collect();
            format!(
                "Possible fake detected (score: {}/100) - {}",
                self.score,
                surfaced.join("; ")
            )
        }
    }
}

/// Coarse label attached to accepted recognitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Low,
    Medium,
    High,
}

impl SecurityLevel {
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence > 0.6 {
            SecurityLevel::High
        } else if confidence > 0.4 {
            SecurityLevel::Medium
        } else {
            SecurityLevel::Low
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SecurityLevel::Low => "low",
            SecurityLevel::Medium => "medium",
            SecurityLevel::High => "high",
        };
        f.write_str(s)
    }
}

/// Structured result of one recognition attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionOutcome {
    /// False when the pipeline could not produce a comparison at all
    /// (no face, empty registry, undecodable image).
    pub ok: bool,
    /// Matched name, or `"Unknown"`.
    pub identity: String,
    /// Clamped to [0, 1].
    pub confidence: f32,
    pub liveness: LivenessResult,
    pub accepted: bool,
    pub security_level: Option<SecurityLevel>,
    pub message: String,
}
