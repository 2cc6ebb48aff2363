//! End-to-end flows through the engine thread with scripted backends.
//!
//! The fake detector reports one face covering the frame unless the first
//! pixel is black. The fake encoder turns the first pixel into the embedding
//! `[r, g, b] / 100`, so test images pick their embedding direction directly.

use std::sync::Arc;

use facegate_core::{
    BoundingBox, DetectorError, Embedding, FaceDetect, FaceEncode, FaceLandmarks, Frame,
    LandmarkDetect, MatchMetric, MeshError, Pipeline, PipelineSettings, RecognizerError,
    SecurityLevel, LIVENESS_NOT_EVALUATED,
};
use facegate_engine::{
    spawn_with_pipeline, Coordinator, EngineHandle, ImageSource, Policy, Registry,
};
use facegate_store::{MemoryStore, SqliteStore};

struct ScriptedDetector;

impl FaceDetect for ScriptedDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, DetectorError> {
        if frame.data[..3].iter().all(|&v| v == 0) {
            return Ok(Vec::new());
        }
        Ok(vec![BoundingBox {
            x: 0.0,
            y: 0.0,
            width: frame.width as f32,
            height: frame.height as f32,
            confidence: 0.9,
            landmarks: None,
        }])
    }
}

struct PixelEncoder;

impl FaceEncode for PixelEncoder {
    fn encode(&mut self, frame: &Frame, _face: &BoundingBox) -> Result<Embedding, RecognizerError> {
        Ok(Embedding::new(
            frame.data[..3].iter().map(|&v| v as f32 / 100.0).collect(),
        ))
    }
}

struct NoMesh;

impl LandmarkDetect for NoMesh {
    fn landmarks(
        &mut self,
        _frame: &Frame,
        _face: &BoundingBox,
    ) -> Result<Option<FaceLandmarks>, MeshError> {
        Ok(None)
    }
}

fn image(r: u8, g: u8, b: u8) -> ImageSource {
    let data = [r, g, b].repeat(8 * 8);
    ImageSource::Frame(Frame::from_rgb(8, 8, data).unwrap())
}

fn pipeline() -> Pipeline {
    Pipeline::new(
        Box::new(ScriptedDetector),
        Box::new(PixelEncoder),
        Box::new(NoMesh),
        PipelineSettings::default(),
    )
}

fn start(registry: Arc<Registry>, policy: Policy) -> EngineHandle {
    let coordinator = Coordinator::new(Arc::clone(&registry), policy);
    spawn_with_pipeline(pipeline(), coordinator, registry, 50).unwrap()
}

fn engine() -> EngineHandle {
    engine_with(Policy::default())
}

fn engine_with(policy: Policy) -> EngineHandle {
    let registry = Arc::new(Registry::open(Box::new(MemoryStore::new())).unwrap());
    start(registry, policy)
}

#[tokio::test]
async fn test_enroll_then_recognize_alice() {
    let engine = engine();

    let outcome = engine
        .enroll("alice", vec![image(100, 10, 0), image(100, 12, 0)])
        .await
        .unwrap();
    assert!(outcome.ok, "{}", outcome.message);
    assert_eq!(outcome.samples, 2);
    assert_eq!(
        outcome.message,
        "Successfully enrolled alice with 2 images (security: 0.0/100)"
    );

    let stored = engine.extract(image(100, 10, 0)).await.unwrap();
    let other = engine.extract(image(100, 12, 0)).await.unwrap();
    let listed = engine.list_identities();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "alice");
    assert_eq!(listed[0].sample_count, 2);

    let result = engine.recognize(image(100, 10, 0)).await.unwrap();
    assert!(result.ok);
    assert_eq!(result.identity, "alice");
    assert!(result.confidence > 0.75);
    assert!(result.accepted);
    assert_eq!(result.security_level, Some(SecurityLevel::High));
    assert_eq!(result.message, "Recognition successful");
    assert!(stored.distance(&other) < 0.1);

    let logs = engine.recent_logs(None).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].name, "alice");
    assert_eq!(logs[0].source, "cli");
}

#[tokio::test]
async fn test_unknown_person_not_accepted() {
    let engine = engine();
    engine
        .enroll("alice", vec![image(100, 10, 0), image(100, 12, 0)])
        .await
        .unwrap();

    let result = engine.recognize(image(0, 90, 90)).await.unwrap();
    assert!(result.ok);
    assert_eq!(result.identity, "Unknown");
    assert!(result.confidence < 0.25);
    assert!(!result.accepted);
    assert!(result.security_level.is_none());
    assert!(result.message.starts_with("Low confidence: "));
    assert!(result.message.ends_with("(need >0.25)"));
    assert!(engine.recent_logs(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_identical_image_gives_full_confidence() {
    let engine = engine();
    engine.enroll("alice", vec![image(20, 5, 5)]).await.unwrap();
    let result = engine.recognize(image(20, 5, 5)).await.unwrap();
    assert!((result.confidence - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_single_image_enrolls_like_two() {
    let one = engine();
    let two = engine();

    let a = one.enroll("alice", vec![image(10, 0, 0)]).await.unwrap();
    let b = two
        .enroll("alice", vec![image(10, 0, 0), image(10, 0, 0)])
        .await
        .unwrap();
    assert!(a.ok && b.ok);
    assert_eq!(a.images_processed, 2);
    assert_eq!(a.samples, b.samples);
}

#[tokio::test]
async fn test_zero_images_rejected() {
    let engine = engine();
    let outcome = engine.enroll("alice", Vec::new()).await.unwrap();
    assert!(!outcome.ok);
    assert_eq!(outcome.message, "No valid images provided");
    assert!(engine.list_identities().is_empty());
}

#[tokio::test]
async fn test_blank_name_rejected() {
    let engine = engine();
    let outcome = engine.enroll("   ", vec![image(10, 0, 0)]).await.unwrap();
    assert!(!outcome.ok);
    assert_eq!(outcome.message, "Name is required");
}

#[tokio::test]
async fn test_enroll_drops_faceless_samples() {
    let engine = engine();
    let outcome = engine
        .enroll("alice", vec![image(100, 10, 0), image(0, 0, 0), image(100, 12, 0)])
        .await
        .unwrap();
    assert!(outcome.ok);
    assert_eq!(outcome.images_processed, 3);
    assert_eq!(outcome.samples, 2);

    let outcome = engine
        .enroll("bob", vec![image(0, 0, 0), image(0, 0, 0)])
        .await
        .unwrap();
    assert!(!outcome.ok);
    assert_eq!(outcome.message, "Could not extract any valid face encodings");
    assert_eq!(engine.list_identities().len(), 1);
}

#[tokio::test]
async fn test_reenroll_replaces_embedding() {
    let engine = engine();
    engine.enroll("alice", vec![image(10, 0, 0)]).await.unwrap();
    engine.enroll("alice", vec![image(0, 60, 0)]).await.unwrap();

    assert_eq!(engine.list_identities().len(), 1);
    let result = engine.recognize(image(0, 60, 0)).await.unwrap();
    assert!((result.confidence - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_duplicate_name_without_replace() {
    let engine = engine_with(Policy {
        replace_on_enroll: false,
        ..Policy::default()
    });
    assert!(engine.enroll("alice", vec![image(10, 0, 0)]).await.unwrap().ok);
    let second = engine.enroll("alice", vec![image(60, 0, 0)]).await.unwrap();
    assert!(!second.ok);
    assert_eq!(second.message, "Name alice already exists");
}

#[tokio::test]
async fn test_max_enroll_images_caps_input() {
    let engine = engine_with(Policy {
        max_enroll_images: 3,
        ..Policy::default()
    });
    let images = (1..=6).map(|v| image(v * 10, 0, 0)).collect();
    let outcome = engine.enroll("alice", images).await.unwrap();
    assert!(outcome.ok);
    assert_eq!(outcome.images_processed, 3);
}

#[tokio::test]
async fn test_empty_registry() {
    let engine = engine();
    let result = engine.recognize(image(10, 0, 0)).await.unwrap();
    assert!(!result.ok);
    assert!(!result.accepted);
    assert_eq!(result.message, "No enrolled faces in database");
    assert!(!result.liveness.passed);
    assert_eq!(result.liveness.reasons, vec![LIVENESS_NOT_EVALUATED.to_string()]);
}

#[tokio::test]
async fn test_recognize_without_face() {
    let engine = engine();
    engine.enroll("alice", vec![image(10, 0, 0)]).await.unwrap();
    let result = engine.recognize(image(0, 0, 0)).await.unwrap();
    assert!(!result.ok);
    assert_eq!(result.message, "No face found in image");
}

#[tokio::test]
async fn test_require_liveness_rejects_match() {
    let engine = engine_with(Policy {
        require_liveness: true,
        ..Policy::default()
    });
    engine.enroll("alice", vec![image(10, 0, 0)]).await.unwrap();

    let result = engine.recognize(image(10, 0, 0)).await.unwrap();
    assert!(result.ok);
    assert!(!result.liveness.passed);
    assert!(!result.accepted);
    assert_eq!(result.identity, "Unknown");
    assert_eq!(result.message, "No face detected");
    assert!(engine.recent_logs(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_unknown_name() {
    let engine = engine();
    engine.enroll("alice", vec![image(10, 0, 0)]).await.unwrap();

    let result = engine.delete("bob").await.unwrap();
    assert!(!result.ok);
    assert_eq!(result.message, "Face bob not found");
    assert_eq!(engine.list_identities().len(), 1);

    let result = engine.delete("alice").await.unwrap();
    assert!(result.ok);
    assert_eq!(result.message, "Successfully deleted alice");
    assert_eq!(engine.status().enrolled, 0);
}

#[tokio::test]
async fn test_undecodable_image() {
    let engine = engine();
    engine.enroll("alice", vec![image(10, 0, 0)]).await.unwrap();
    let result = engine
        .recognize(ImageSource::Encoded(b"not an image".to_vec()))
        .await
        .unwrap();
    assert!(!result.ok);
    assert!(result.message.starts_with("invalid image"));

    assert!(engine
        .score_liveness(ImageSource::Encoded(Vec::new()))
        .await
        .is_err());
}

#[tokio::test]
async fn test_status_reports_policy() {
    let engine = engine_with(Policy {
        recognition_threshold: 0.4,
        ..Policy::default()
    });
    engine.enroll("alice", vec![image(10, 0, 0)]).await.unwrap();
    let status = engine.status();
    assert_eq!(status.enrolled, 1);
    assert!((status.recognition_threshold - 0.4).abs() < 1e-6);
    assert!(!status.require_liveness);
    assert_eq!(status.match_metric, MatchMetric::Cosine);
}

#[tokio::test]
async fn test_metric_follows_policy() {
    let cosine = engine();
    let euclidean = engine_with(Policy {
        match_metric: MatchMetric::Euclidean,
        ..Policy::default()
    });
    for engine in [&cosine, &euclidean] {
        engine
            .enroll("alice", vec![image(10, 1, 0), image(10, 1, 0)])
            .await
            .unwrap();
    }

    // Same direction, ten times the magnitude.
    let result = cosine.recognize(image(100, 10, 0)).await.unwrap();
    assert!(result.accepted);
    assert!(result.confidence > 0.99);

    let result = euclidean.recognize(image(100, 10, 0)).await.unwrap();
    assert!(!result.accepted);
    assert!(result.confidence < 0.25);
}

#[tokio::test]
async fn test_enrollment_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("faces.db");

    {
        let store = SqliteStore::open(&db).unwrap();
        let registry = Arc::new(Registry::open(Box::new(store)).unwrap());
        let engine = start(registry, Policy::default());
        let outcome = engine
            .enroll("alice", vec![image(100, 10, 0), image(100, 12, 0)])
            .await
            .unwrap();
        assert!(outcome.ok);
    }

    let store = SqliteStore::open(&db).unwrap();
    let registry = Arc::new(Registry::open(Box::new(store)).unwrap());
    let engine = start(registry, Policy::default());
    let result = engine.recognize(image(100, 11, 0)).await.unwrap();
    assert!(result.accepted);
    assert_eq!(result.identity, "alice");
}
