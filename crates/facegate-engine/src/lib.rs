//! facegate-engine: Enrollment and recognition on top of `facegate-core`.
//!
//! [`spawn_engine`] moves the inference pipeline onto a dedicated thread and
//! hands back a cloneable [`EngineHandle`]. The identity [`Registry`] is
//! shared between that thread and the handle, so listing and deletion never
//! queue behind inference.

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod registry;
pub mod source;

pub use config::{Config, ConfigError};
pub use coordinator::{CommandResult, Coordinator, EnrollOutcome, Policy};
pub use engine::{spawn_engine, spawn_with_pipeline, EngineError, EngineHandle, Status};
pub use registry::{IdentitySummary, Registry, RegistryError};
pub use source::ImageSource;
