// Clearscribe worker binary
//
// Wires the store, the two remote clients, and the slicer into the worker
// loop, then runs until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info};

use clearscribe::asr::WhisperApiClient;
use clearscribe::audio::FfmpegSlicer;
use clearscribe::config::WorkerConfig;
use clearscribe::corrector::MultimodalClient;
use clearscribe::database::DatabaseManager;
use clearscribe::notify::Notifier;
use clearscribe::worker::Worker;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize env_logger to output to stderr (reads RUST_LOG env var)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let config = WorkerConfig::from_env();
    info!("Starting Clearscribe worker");

    std::fs::create_dir_all(&config.upload_dir)
        .context("Failed to create upload directory")?;

    let db = Arc::new(
        DatabaseManager::new(config.database_path.clone())
            .context("Database initialization failed")?,
    );

    let recognizer = Arc::new(WhisperApiClient::new(&config.asr_url, &config.asr_model));
    let corrector = Arc::new(MultimodalClient::new(
        &config.multimodal_url,
        &config.multimodal_model,
    ));
    let slicer = Arc::new(FfmpegSlicer::new().context("ffmpeg is required for clip slicing")?);
    let notifier = Notifier::new(config.webhook_url.clone());

    let worker = Arc::new(Worker::new(
        db,
        recognizer,
        corrector,
        slicer,
        notifier,
        config,
    ));

    let loop_handle = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run().await })
    };

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Interrupt received, finishing in-flight work"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    worker.request_stop();
    loop_handle.await.context("Worker loop panicked")?;

    info!("Clearscribe worker stopped");
    Ok(())
}
