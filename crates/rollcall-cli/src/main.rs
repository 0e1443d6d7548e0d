use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rollcall_core::labels::next_sequential_label;
use rollcall_core::FaceImage;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod frames;

use config::Config;
use engine::{spawn_engine, EngineHandle};

const FACULTY_PREFIX: &str = "FACULTY";

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance identity engine")]
struct Cli {
    /// TOML configuration file (overrides ROLLCALL_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a person from face crops or a directory of frames
    Enroll(EnrollArgs),
    /// Identify the person in each face crop, or watch a directory of frames
    Recognize {
        /// Replay a directory of camera frames until an enrolled face appears
        #[arg(long, conflicts_with = "images")]
        frames: Option<PathBuf>,

        /// Face crop images
        #[arg(required_unless_present = "frames")]
        images: Vec<PathBuf>,
    },
    /// Retrain the model from every stored sample
    Train {
        /// Folder-per-label directory to import before training
        #[arg(long)]
        import: Option<PathBuf>,
    },
    /// List enrolled labels
    List,
    /// Remove an enrolled label and retrain
    Remove {
        label: String,
    },
    /// Show model status
    Status,
}

#[derive(Args)]
struct EnrollArgs {
    /// Identity label (e.g. a student ID)
    #[arg(short, long, conflicts_with = "faculty", required_unless_present = "faculty")]
    label: Option<String>,

    /// Assign the next sequential faculty code (FACULTY01, FACULTY02, …)
    #[arg(long)]
    faculty: bool,

    /// Replay a directory of camera frames instead of reading face crops
    #[arg(long, conflicts_with = "images")]
    frames: Option<PathBuf>,

    /// Face crop images
    #[arg(required_unless_present = "frames")]
    images: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let engine = spawn_engine(&config)?;

    match cli.command {
        Commands::Enroll(args) => {
            let label = match args.label {
                Some(label) => label,
                None => {
                    let status = engine.status().await?;
                    next_sequential_label(FACULTY_PREFIX, status.labels.iter().map(String::as_str))
                        .context("faculty code sequence exhausted")?
                }
            };

            let result = match args.frames {
                Some(dir) => engine.enroll_frames(label, dir).await?,
                None => {
                    let images = args
                        .images
                        .iter()
                        .map(|p| load_face(p))
                        .collect::<Result<Vec<_>>>()?;
                    engine.enroll(label, images).await?
                }
            };
            print_json(&result)?;
        }
        Commands::Recognize { frames: Some(dir), .. } => {
            let outcome = engine.identify(dir).await?;
            print_json(&outcome)?;
        }
        Commands::Recognize { frames: None, images } => recognize_all(&engine, images).await?,
        Commands::Train { import } => {
            let result = engine.rebuild(import).await?;
            print_json(&result)?;
        }
        Commands::List => {
            let status = engine.status().await?;
            for label in status.labels {
                println!("{label}");
            }
        }
        Commands::Remove { label } => {
            if engine.remove(label.clone()).await? {
                println!("removed {label}");
            } else {
                anyhow::bail!("no such label: {label}");
            }
        }
        Commands::Status => {
            let status = engine.status().await?;
            print_json(&status)?;
        }
    }

    Ok(())
}

/// Submit every image concurrently; the engine serializes the matches.
async fn recognize_all(engine: &EngineHandle, images: Vec<PathBuf>) -> Result<()> {
    let mut tasks = Vec::with_capacity(images.len());
    for path in images {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            let outcome = match load_face(&path) {
                Ok(face) => engine.recognize(face).await.map_err(anyhow::Error::from),
                Err(e) => Err(e),
            };
            (path, outcome)
        }));
    }

    for task in tasks {
        let (path, outcome) = task.await.context("recognition task panicked")?;
        let line = match outcome {
            Ok(result) => serde_json::json!({
                "image": path,
                "label": result.label,
                "confidence": result.confidence,
                "distance": result.distance,
            }),
            Err(e) => serde_json::json!({ "image": path, "error": format!("{e:#}") }),
        };
        println!("{line}");
    }
    Ok(())
}

fn load_face(path: &Path) -> Result<FaceImage> {
    let img = image::open(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(FaceImage::from(img.to_luma8()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
