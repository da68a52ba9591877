use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use facematch_core::{BoundingBox, DirectoryGallery, GalleryProvider, OnnxEncoder};
use facematch_tasks::{load_image, Config, SearchRequest, SearchService, TaskResult};

#[derive(Parser)]
#[command(name = "facematch", about = "Facematch face gallery search CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the gallery for the faces in an image
    Search {
        /// Image file (png, jpg or jpeg)
        #[arg(short, long)]
        image: PathBuf,
        /// Face box as x1,y1,x2,y2 (repeat for several faces)
        #[arg(short = 'b', long = "box", required = true)]
        boxes: Vec<BoundingBox>,
        /// Override the match threshold
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// List the person ids in the gallery
    Gallery,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();

    match cli.command {
        Commands::Search {
            image,
            boxes,
            threshold,
        } => {
            if let Some(t) = threshold {
                config.match_threshold = t;
            }
            search(&config, &image, boxes).await?;
        }
        Commands::Gallery => {
            let records = DirectoryGallery::new(&config.gallery_dir).records()?;
            if records.is_empty() {
                println!("No persons in {}", config.gallery_dir.display());
            }
            for record in records {
                println!("{}\t{}-d", record.person_id, record.embedding.values.len());
            }
        }
    }

    Ok(())
}

/// Run one search in-process, printing progress until the result is ready.
async fn search(config: &Config, image: &Path, boxes: Vec<BoundingBox>) -> Result<()> {
    let request = SearchRequest::new(load_image(image)?, boxes)?;
    let encoder = OnnxEncoder::load(&config.arcface_model_path())?;
    let gallery = DirectoryGallery::new(&config.gallery_dir);
    let service = SearchService::new(config, Arc::new(gallery), Arc::new(encoder))?;

    let token = service.submit(request)?;
    tracing::debug!(token = %token, "search queued");

    let outcome = loop {
        match service.result(token.as_str())? {
            TaskResult::Pending => {
                let progress = service.progress(token.as_str())?;
                eprint!("\rSearching... {:>5.1}%", progress * 100.0);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            done => break done,
        }
    };
    eprintln!("\rSearching... 100.0%");
    service.delete(token.as_str());
    service.shutdown();

    match outcome {
        TaskResult::Ready(results) => {
            println!("{}", serde_json::to_string_pretty(&results[..])?);
            Ok(())
        }
        TaskResult::Failed(reason) => bail!("search failed: {reason}"),
        TaskResult::Pending => unreachable!("loop exits only on a finished task"),
    }
}
