use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facegate_engine::{spawn_engine, Config, Coordinator, ImageSource, Policy, Registry};
use facegate_store::SqliteStore;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "facegate", version, about = "facegate face enrollment and recognition")]
struct Cli {
    /// Treat image files as base64 text (data URLs accepted)
    #[arg(long, global = true)]
    base64: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a face from one or more images
    Enroll {
        /// Name to enroll under
        #[arg(short, long)]
        name: String,
        /// Image files
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Identify the face in an image
    Recognize { image: PathBuf },
    /// Run the liveness heuristics on an image
    Liveness { image: PathBuf },
    /// Print the embedding of the primary face in an image
    Extract { image: PathBuf },
    /// Remove an enrolled face
    Delete { name: String },
    /// List enrolled faces
    List,
    /// Show recent recognitions
    Logs {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show registry size and decision settings
    Status,
}

#[derive(Serialize)]
struct StatusReport<'a> {
    version: &'static str,
    enrolled: usize,
    recognition_threshold: f32,
    match_metric: String,
    require_liveness: bool,
    db_path: &'a Path,
    model_dir: &'a Path,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    tracing::debug!(
        db = %config.db_path.display(),
        models = %config.model_dir.display(),
        "configuration loaded"
    );

    let ok = match cli.command {
        Commands::Enroll { name, images } => {
            let images = images
                .iter()
                .map(|p| read_image(p, cli.base64))
                .collect::<Result<Vec<_>>>()?;
            let engine = spawn_engine(&config)?;
            let outcome = engine.enroll(name, images).await?;
            print_json(&outcome)?;
            outcome.ok
        }
        Commands::Recognize { image } => {
            let image = read_image(&image, cli.base64)?;
            let engine = spawn_engine(&config)?;
            let outcome = engine.recognize(image).await?;
            print_json(&outcome)?;
            outcome.ok
        }
        Commands::Liveness { image } => {
            let image = read_image(&image, cli.base64)?;
            let engine = spawn_engine(&config)?;
            let result = engine.score_liveness(image).await?;
            print_json(&serde_json::json!({
                "passed": result.passed,
                "score": result.score,
                "reasons": result.reasons,
                "message": result.message(),
            }))?;
            true
        }
        Commands::Extract { image } => {
            let image = read_image(&image, cli.base64)?;
            let engine = spawn_engine(&config)?;
            let embedding = engine.extract(image).await?;
            print_json(&serde_json::json!({
                "dim": embedding.dim(),
                "model_version": embedding.model_version,
                "values": embedding.values,
            }))?;
            true
        }
        Commands::Delete { name } => {
            let registry = open_registry(&config)?;
            let result = Coordinator::new(registry, Policy::from(&config)).delete(&name);
            print_json(&result)?;
            result.ok
        }
        Commands::List => {
            let faces = open_registry(&config)?.list();
            print_json(&serde_json::json!({ "faces": faces, "total": faces.len() }))?;
            true
        }
        Commands::Logs { limit } => {
            let logs = open_registry(&config)?.recent_logs(limit.unwrap_or(config.log_limit))?;
            print_json(&serde_json::json!({ "logs": logs }))?;
            true
        }
        Commands::Status => {
            let registry = open_registry(&config)?;
            print_json(&StatusReport {
                version: env!("CARGO_PKG_VERSION"),
                enrolled: registry.len(),
                recognition_threshold: config.recognition_threshold,
                match_metric: config.match_metric.to_string(),
                require_liveness: config.require_liveness,
                db_path: &config.db_path,
                model_dir: &config.model_dir,
            })?;
            true
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Registry access without loading the models.
fn open_registry(config: &Config) -> Result<Arc<Registry>> {
    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    Ok(Arc::new(Registry::open(Box::new(store))?))
}

fn read_image(path: &Path, base64: bool) -> Result<ImageSource> {
    if base64 {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(ImageSource::Base64(text))
    } else {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        Ok(ImageSource::Encoded(bytes))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
