//! Crosswatch - Roadside Pedestrian-Crossing Monitor
//!
//! Main entry point: load calibration, then run the metadata pipeline until
//! the camera stream closes.

use crosswatch::{
    board_protocol::BoardController,
    calibration::{Calibration, CalibrationRepository},
    evidence_capture::{DetectionRepository, EvidenceCapture},
    ingestion::{MetadataSource, MonitorPipeline, MonitorState},
    risk_engine::{BoardAlertResponder, RiskEngine},
    state::AppConfig,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crosswatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Crosswatch v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    config.validate()?;
    tracing::info!(
        database_url = %config.database_url,
        boards = config.board_ports.len(),
        board_retries = config.board_retries,
        board_timeout_ms = config.board_timeout_ms,
        dwell_ms = config.alert_dwell.as_millis() as u64,
        approach_threshold = config.risk.approach_threshold,
        parallelism_threshold = config.risk.parallelism_threshold,
        "Configuration loaded"
    );

    // Create database pool
    let connect_options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(connect_options)
        .await?;

    tracing::info!("Database connected");

    // Calibration is the only fatal precondition
    let calibration = match Calibration::load(
        &CalibrationRepository::new(pool.clone()),
        config.calibration_scale,
    )
    .await
    {
        Ok(calibration) => Arc::new(calibration),
        Err(e) => {
            tracing::error!(error = %e, "Calibration geometry unavailable, exiting");
            std::process::exit(1);
        }
    };

    let detections = DetectionRepository::new(pool.clone());
    detections.ensure_table().await?;

    match EvidenceCapture::check_ffmpeg().await {
        Ok(version) => tracing::info!(version = %version, "ffmpeg available"),
        Err(e) => tracing::warn!(error = %e, "ffmpeg check failed, capture and metadata will not work"),
    }

    let capture = Arc::new(EvidenceCapture::new(
        config.rtsp_url.clone(),
        config.capture_timeout_sec,
        detections,
    ));
    let boards = Arc::new(BoardController::new(config.board_ports.clone(), config.serial_baud));
    let responder = BoardAlertResponder::new(
        boards,
        capture,
        config.board_retries,
        config.board_timeout_ms,
        config.alert_dwell,
    );
    let engine = Arc::new(RiskEngine::new(calibration, config.risk));
    let pipeline = MonitorPipeline::new(
        MonitorState::new(config.frame_cache_size, config.history_size),
        engine,
        responder,
    );
    tracing::info!("Pipeline initialized");

    let mut source = match MetadataSource::spawn(&config.rtsp_url) {
        Ok(source) => source,
        Err(e) => {
            tracing::error!(error = %e, "Metadata stream unavailable, nothing to monitor");
            return Ok(());
        }
    };
    let summary = pipeline.run(source.reader()).await;
    source.shutdown().await;

    tracing::info!(
        blocks = summary.blocks,
        alerts = summary.alerts,
        "Shutting down"
    );

    Ok(())
}
