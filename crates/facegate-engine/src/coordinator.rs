//! Enrollment, recognition and deletion flows.
//!
//! Every pipeline failure stops here and becomes an `ok = false` reply with
//! a human-readable message.

use std::sync::Arc;

use facegate_core::{
    AggregationPolicy, Analysis, Embedding, Frame, LivenessResult, MatchMetric, Matcher,
    MeanAggregation, Pipeline, PipelineError, RecognitionOutcome, SecurityLevel,
    LIVENESS_NOT_EVALUATED, UNKNOWN_IDENTITY,
};
use facegate_store::{timestamp, RecognitionLog};
use serde::Serialize;

use crate::config::Config;
use crate::registry::{Registry, RegistryError};
use crate::source::ImageSource;

/// Decision knobs for the coordinators.
#[derive(Debug, Clone)]
pub struct Policy {
    pub recognition_threshold: f32,
    pub match_metric: MatchMetric,
    pub require_liveness: bool,
    pub replace_on_enroll: bool,
    pub min_enroll_images: usize,
    pub max_enroll_images: usize,
    pub log_source: String,
}

impl Default for Policy {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for Policy {
    fn from(config: &Config) -> Self {
        Self {
            recognition_threshold: config.recognition_threshold,
            match_metric: config.match_metric,
            require_liveness: config.require_liveness,
            replace_on_enroll: config.replace_on_enroll,
            min_enroll_images: config.min_enroll_images,
            max_enroll_images: config.max_enroll_images,
            log_source: config.log_source.clone(),
        }
    }
}

/// Reply for commands that only report success and a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollOutcome {
    pub ok: bool,
    pub message: String,
    pub name: String,
    /// Images run through the pipeline, after padding and capping.
    pub images_processed: usize,
    /// Embeddings that went into the stored average.
    pub samples: usize,
    /// Mean liveness score across processed images.
    pub security_score: Option<f32>,
}

impl EnrollOutcome {
    fn rejected(name: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            name: name.to_string(),
            images_processed: 0,
            samples: 0,
            security_score: None,
        }
    }
}

pub struct Coordinator {
    registry: Arc<Registry>,
    matcher: Box<dyn Matcher + Send + Sync>,
    aggregation: Box<dyn AggregationPolicy + Send + Sync>,
    policy: Policy,
}

impl Coordinator {
    pub fn new(registry: Arc<Registry>, policy: Policy) -> Self {
        let matcher = policy.match_metric.matcher();
        Self::with_strategies(
            registry,
            policy,
            matcher,
            Box::new(MeanAggregation),
        )
    }

    pub fn with_strategies(
        registry: Arc<Registry>,
        policy: Policy,
        matcher: Box<dyn Matcher + Send + Sync>,
        aggregation: Box<dyn AggregationPolicy + Send + Sync>,
    ) -> Self {
        Self {
            registry,
            matcher,
            aggregation,
            policy,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Enroll `name` from `images`, replacing any previous enrollment.
    pub fn enroll(
        &self,
        pipeline: &mut Pipeline,
        name: &str,
        images: Vec<ImageSource>,
    ) -> EnrollOutcome {
        let name = name.trim();
        if name.is_empty() {
            return EnrollOutcome::rejected(name, "Name is required");
        }

        let mut images = images;
        if images.len() > self.policy.max_enroll_images {
            tracing::warn!(
                supplied = images.len(),
                max = self.policy.max_enroll_images,
                "ignoring surplus enrollment images"
            );
            images.truncate(self.policy.max_enroll_images);
        }

        let mut frames = Vec::with_capacity(images.len());
        for (i, image) in images.into_iter().enumerate() {
            match image.into_frame() {
                Ok(frame) => frames.push(frame),
                Err(err) => tracing::warn!(image = i + 1, error = %err, "skipping undecodable image"),
            }
        }
        if frames.is_empty() {
            return EnrollOutcome::rejected(name, "No valid images provided");
        }
        let frames = pad_frames(frames, self.policy.min_enroll_images);

        tracing::info!(name, images = frames.len(), "enrollment started");
        let mut samples: Vec<Embedding> = Vec::with_capacity(frames.len());
        let mut scores: Vec<u32> = Vec::with_capacity(frames.len());
        for (i, frame) in frames.iter().enumerate() {
            let analysis = pipeline.analyze(frame);
            scores.push(analysis.liveness.score);

            match analysis.embedding {
                Ok(embedding) => {
                    tracing::debug!(
                        image = i + 1,
                        security = analysis.liveness.score,
                        "sample extracted"
                    );
                    samples.push(embedding);
                }
                Err(err) => {
                    tracing::warn!(image = i + 1, error = %err, "dropping enrollment sample");
                }
            }
        }

        let security = scores.iter().map(|&s| s as f32).sum::<f32>() / scores.len() as f32;
        let mut outcome = EnrollOutcome {
            ok: false,
            message: String::new(),
            name: name.to_string(),
            images_processed: frames.len(),
            samples: samples.len(),
            security_score: Some(security),
        };

        if samples.is_empty() {
            outcome.message = "Could not extract any valid face encodings".to_string();
            return outcome;
        }

        let embedding = match self.aggregation.aggregate(&samples) {
            Ok(embedding) => embedding,
            Err(err) => {
                outcome.message = format!("Enrollment failed: {err}");
                return outcome;
            }
        };

        match self
            .registry
            .upsert(name, &embedding, samples.len(), self.policy.replace_on_enroll)
        {
            Ok(_) => {
                tracing::info!(name, images = samples.len(), security, "enrolled identity");
                outcome.ok = true;
                outcome.message = format!(
                    "Successfully enrolled {name} with {} images (security: {security:.1}/100)",
                    samples.len()
                );
            }
            Err(RegistryError::Duplicate(dup)) => {
                outcome.message = PipelineError::DuplicateName(dup).to_string();
            }
            Err(err) => {
                tracing::error!(name, error = %err, "enrollment not persisted");
                outcome.message = format!("Enrollment failed: {err}");
            }
        }
        outcome
    }

    /// Identify the face in `image` against the registry.
    pub fn recognize(&self, pipeline: &mut Pipeline, image: ImageSource) -> RecognitionOutcome {
        if self.registry.is_empty() {
            return failed(PipelineError::EmptyRegistry.to_string(), not_scored());
        }

        let frame = match image.into_frame() {
            Ok(frame) => frame,
            Err(err) => {
                return failed(PipelineError::from(err).to_string(), not_scored());
            }
        };

        let Analysis {
            liveness,
            embedding,
        } = pipeline.analyze(&frame);
        let probe = match embedding {
            Ok(probe) => probe,
            Err(err) => return failed(err.to_string(), liveness),
        };

        let threshold = self.policy.recognition_threshold;
        let matched = self
            .registry
            .with_gallery(|gallery| self.matcher.compare(&probe, gallery, threshold));
        let result = match matched {
            Ok(result) => result,
            Err(err) => return failed(err.to_string(), liveness),
        };

        let liveness_ok = liveness.passed || !self.policy.require_liveness;
        let accepted = result.matched && liveness_ok;

        let message = if accepted {
            "Recognition successful".to_string()
        } else if result.matched {
            liveness.message()
        } else {
            format!(
                "Low confidence: {:.2} (need >{threshold})",
                result.confidence
            )
        };

        tracing::info!(
            identity = %result.identity,
            confidence = result.confidence,
            distance = result.distance,
            liveness = liveness.score,
            accepted,
            "recognition decided"
        );

        if accepted {
            self.append_log(&result.identity, result.confidence);
        }

        RecognitionOutcome {
            ok: true,
            identity: if accepted {
                result.identity
            } else {
                UNKNOWN_IDENTITY.to_string()
            },
            confidence: result.confidence,
            liveness,
            accepted,
            security_level: accepted.then(|| SecurityLevel::from_confidence(result.confidence)),
            message,
        }
    }

    pub fn delete(&self, name: &str) -> CommandResult {
        let name = name.trim();
        if name.is_empty() {
            return CommandResult {
                ok: false,
                message: "Name is required".to_string(),
            };
        }
        match self.registry.delete(name) {
            Ok(true) => {
                tracing::info!(name, "deleted identity");
                CommandResult {
                    ok: true,
                    message: format!("Successfully deleted {name}"),
                }
            }
            Ok(false) => CommandResult {
                ok: false,
                message: format!("Face {name} not found"),
            },
            Err(err) => {
                tracing::error!(name, error = %err, "delete failed");
                CommandResult {
                    ok: false,
                    message: format!("Delete failed: {err}"),
                }
            }
        }
    }

    fn append_log(&self, name: &str, confidence: f32) {
        let entry = RecognitionLog {
            name: name.to_string(),
            confidence,
            timestamp: timestamp(),
            source: self.policy.log_source.clone(),
        };
        if let Err(err) = self.registry.log(&entry) {
            tracing::warn!(name, error = %err, "recognition log not written");
        }
    }
}

/// Repeat frames cyclically until there are at least `min`.
fn pad_frames(mut frames: Vec<Frame>, min: usize) -> Vec<Frame> {
    let supplied = frames.len();
    if supplied == 0 {
        return frames;
    }
    for i in 0..min.saturating_sub(supplied) {
        let frame = frames[i % supplied].clone();
        frames.push(frame);
    }
    frames
}

/// Placeholder for requests that never reached the liveness stage.
fn not_scored() -> LivenessResult {
    LivenessResult {
        passed: false,
        score: 0,
        reasons: vec![LIVENESS_NOT_EVALUATED.to_string()],
    }
}

fn failed(message: String, liveness: LivenessResult) -> RecognitionOutcome {
    tracing::info!(reason = %message, "recognition failed");
    RecognitionOutcome {
        ok: false,
        identity: UNKNOWN_IDENTITY.to_string(),
        confidence: 0.0,
        liveness,
        accepted: false,
        security_level: None,
        message,
    }
}
