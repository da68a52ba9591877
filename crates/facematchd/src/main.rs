use std::sync::Arc;

use anyhow::Result;
use facematch_core::{DirectoryGallery, OnnxEncoder};
use facematch_tasks::{Config, SearchService};
use tracing_subscriber::EnvFilter;

mod dbus_interface;

use dbus_interface::{FaceMatchService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facematchd starting");

    let config = Config::from_env();

    // Load the encoder synchronously (fail-fast)
    let model_path = config.arcface_model_path();
    let encoder = OnnxEncoder::load(&model_path)?;
    let gallery = DirectoryGallery::new(&config.gallery_dir);
    tracing::info!(dir = %config.gallery_dir.display(), "using gallery directory");

    let service = Arc::new(SearchService::new(
        &config,
        Arc::new(gallery),
        Arc::new(encoder),
    )?);

    let _conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(
            OBJECT_PATH,
            FaceMatchService::new(Arc::clone(&service), config.match_threshold),
        )?
        .build()
        .await?;

    if let Some(ttl) = config.result_ttl {
        let service = Arc::clone(&service);
        let mut interval = tokio::time::interval(config.evict_interval);
        tracing::info!(ttl_secs = ttl.as_secs(), "finished-task eviction enabled");
        tokio::spawn(async move {
            loop {
                interval.tick().await;
                service.evict_completed(ttl);
            }
        });
    }

    tracing::info!(
        bus = BUS_NAME,
        workers = service.workers(),
        threshold = config.match_threshold,
        "facematchd ready"
    );

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("facematchd shutting down");

    // Joining workers blocks until queued searches finish.
    tokio::task::spawn_blocking(move || service.shutdown()).await?;

    Ok(())
}
