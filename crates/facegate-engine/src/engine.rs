use std::sync::Arc;

use facegate_core::{
    Embedding, LivenessResult, MatchMetric, ModelLoadError, Pipeline, PipelineError, RecognitionOutcome,
};
use facegate_store::{RecognitionLog, SqliteStore, StoreError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::{Config, ConfigError};
use crate::coordinator::{CommandResult, Coordinator, EnrollOutcome, Policy};
use crate::registry::{IdentitySummary, Registry};
use crate::source::ImageSource;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("model load failed: {0}")]
    ModelLoad(#[from] ModelLoadError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Pipeline(#[from] PipelineError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Snapshot of the engine's state and decision settings.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub version: &'static str,
    pub enrolled: usize,
    pub recognition_threshold: f32,
    pub match_metric: MatchMetric,
    pub require_liveness: bool,
}

/// Messages sent from handles to the engine thread.
enum EngineRequest {
    Extract {
        image: ImageSource,
        reply: oneshot::Sender<Result<Embedding, EngineError>>,
    },
    ScoreLiveness {
        image: ImageSource,
        reply: oneshot::Sender<Result<LivenessResult, EngineError>>,
    },
    Enroll {
        name: String,
        images: Vec<ImageSource>,
        reply: oneshot::Sender<EnrollOutcome>,
    },
    Recognize {
        image: ImageSource,
        reply: oneshot::Sender<RecognitionOutcome>,
    },
}

/// Clone-safe handle to the engine thread.
///
/// Inference requests are queued to the thread that owns the models.
/// Registry reads and deletes run on the caller's side.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    coordinator: Arc<Coordinator>,
    registry: Arc<Registry>,
    log_limit: usize,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Embedding of the primary face in `image`.
    pub async fn extract(&self, image: ImageSource) -> Result<Embedding, EngineError> {
        self.request(|reply| EngineRequest::Extract { image, reply })
            .await?
    }

    pub async fn score_liveness(&self, image: ImageSource) -> Result<LivenessResult, EngineError> {
        self.request(|reply| EngineRequest::ScoreLiveness { image, reply })
            .await?
    }

    pub async fn enroll(
        &self,
        name: impl Into<String>,
        images: Vec<ImageSource>,
    ) -> Result<EnrollOutcome, EngineError> {
        let name = name.into();
        self.request(|reply| EngineRequest::Enroll {
            name,
            images,
            reply,
        })
        .await
    }

    pub async fn recognize(&self, image: ImageSource) -> Result<RecognitionOutcome, EngineError> {
        self.request(|reply| EngineRequest::Recognize { image, reply })
            .await
    }

    pub async fn delete(&self, name: impl Into<String>) -> Result<CommandResult, EngineError> {
        let name = name.into();
        let coordinator = Arc::clone(&self.coordinator);
        Ok(tokio::task::spawn_blocking(move || coordinator.delete(&name)).await?)
    }

    pub fn list_identities(&self) -> Vec<IdentitySummary> {
        self.registry.list()
    }

    /// Newest recognition log entries; `None` uses the configured limit.
    pub async fn recent_logs(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<RecognitionLog>, EngineError> {
        let limit = limit.unwrap_or(self.log_limit);
        let registry = Arc::clone(&self.registry);
        let logs = tokio::task::spawn_blocking(move || registry.recent_logs(limit)).await??;
        Ok(logs)
    }

    pub fn status(&self) -> Status {
        let policy = self.coordinator.policy();
        Status {
            version: env!("CARGO_PKG_VERSION"),
            enrolled: self.registry.len(),
            recognition_threshold: policy.recognition_threshold,
            match_metric: policy.match_metric,
            require_liveness: policy.require_liveness,
        }
    }
}

/// Open the database, load the models and start the engine thread.
///
/// Fails fast if the configuration is invalid or any resource is unavailable.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EngineError> {
    config.validate()?;

    let store = SqliteStore::open(&config.db_path)?;
    let registry = Arc::new(Registry::open(Box::new(store))?);
    tracing::info!(path = %config.db_path.display(), "identity database ready");

    let pipeline = Pipeline::load(&config.model_dir, config.pipeline_settings())?;

    let coordinator = Coordinator::new(Arc::clone(&registry), Policy::from(config));
    spawn_with_pipeline(pipeline, coordinator, registry, config.log_limit)
}

/// Start the engine thread around an already-built pipeline.
pub fn spawn_with_pipeline(
    mut pipeline: Pipeline,
    coordinator: Coordinator,
    registry: Arc<Registry>,
    log_limit: usize,
) -> Result<EngineHandle, EngineError> {
    let coordinator = Arc::new(coordinator);
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(8);

    let worker = Arc::clone(&coordinator);
    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Extract { image, reply } => {
                        let result = image
                            .into_frame()
                            .map_err(PipelineError::from)
                            .and_then(|frame| pipeline.extract(&frame))
                            .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::ScoreLiveness { image, reply } => {
                        let result = image
                            .into_frame()
                            .map(|frame| pipeline.score_liveness(&frame))
                            .map_err(|err| EngineError::Pipeline(err.into()));
                        let _ = reply.send(result);
                    }
                    EngineRequest::Enroll {
                        name,
                        images,
                        reply,
                    } => {
                        let _ = reply.send(worker.enroll(&mut pipeline, &name, images));
                    }
                    EngineRequest::Recognize { image, reply } => {
                        let _ = reply.send(worker.recognize(&mut pipeline, image));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle {
        tx,
        coordinator,
        registry,
        log_limit,
    })
}
