use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::types::{Embedding, EnrolledIdentity};

/// Identity reported when no enrolled face clears the threshold.
pub const UNKNOWN_IDENTITY: &str = "Unknown";

/// Result of matching a probe embedding against the enrolled gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// True when `confidence` strictly exceeds the threshold.
    pub matched: bool,
    /// Matched name, or [`UNKNOWN_IDENTITY`].
    pub identity: String,
    /// `1 − distance`, clamped to [0, 1].
    pub confidence: f32,
    /// Distance to the nearest enrolled embedding.
    pub distance: f32,
    /// Gallery index of the nearest enrolled identity.
    pub nearest: usize,
}

/// Strategy for comparing a probe embedding against a gallery of enrolled faces.
pub trait Matcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &[EnrolledIdentity],
        threshold: f32,
    ) -> Result<MatchResult, PipelineError>;
}

/// Nearest neighbour by cosine distance, so confidence is the cosine
/// similarity. The default for ArcFace embeddings.
pub struct CosineMatcher;

/// Nearest neighbour by Euclidean distance, for extractors whose embeddings
/// are compared in L2 space.
pub struct EuclideanMatcher;

/// Distance metric used for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMetric {
    #[default]
    Cosine,
    Euclidean,
}

impl MatchMetric {
    pub fn matcher(self) -> Box<dyn Matcher + Send + Sync> {
        match self {
            MatchMetric::Cosine => Box::new(CosineMatcher),
            MatchMetric::Euclidean => Box::new(EuclideanMatcher),
        }
    }
}

impl fmt::Display for MatchMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchMetric::Cosine => "cosine",
            MatchMetric::Euclidean => "euclidean",
        })
    }
}

impl FromStr for MatchMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(MatchMetric::Cosine),
            "euclidean" => Ok(MatchMetric::Euclidean),
            other => Err(format!("unknown match metric: {other}")),
        }
    }
}

/// Map a distance to a confidence in [0, 1].
pub fn confidence_from_distance(distance: f32) -> f32 {
    if distance.is_nan() {
        return 0.0;
    }
    (1.0 - distance).clamp(0.0, 1.0)
}

/// Ties keep the earliest gallery entry, so registration order decides.
/// A NaN distance counts as infinitely far.
fn nearest(
    probe: &Embedding,
    gallery: &[EnrolledIdentity],
    threshold: f32,
    distance: impl Fn(&Embedding, &Embedding) -> f32,
) -> Result<MatchResult, PipelineError> {
    let mut best: Option<(usize, f32)> = None;
    for (i, identity) in gallery.iter().enumerate() {
        let mut d = distance(probe, &identity.embedding);
        if d.is_nan() {
            d = f32::INFINITY;
        }
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((i, d)),
        }
    }

    let (nearest, distance) = best.ok_or(PipelineError::EmptyRegistry)?;
    let confidence = confidence_from_distance(distance);
    let matched = confidence > threshold;

    Ok(MatchResult {
        matched,
        identity: if matched {
            gallery[nearest].name.clone()
        } else {
            UNKNOWN_IDENTITY.to_string()
        },
        confidence,
        distance,
        nearest,
    })
}

impl Matcher for CosineMatcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &[EnrolledIdentity],
        threshold: f32,
    ) -> Result<MatchResult, PipelineError> {
        nearest(probe, gallery, threshold, Embedding::cosine_distance)
    }
}

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &[EnrolledIdentity],
        threshold: f32,
    ) -> Result<MatchResult, PipelineError> {
        nearest(probe, gallery, threshold, Embedding::distance)
    }
}
