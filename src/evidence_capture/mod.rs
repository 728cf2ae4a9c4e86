//! EvidenceCapture - Frame Grab and Persistence for Alerts
//!
//! ## Responsibilities
//!
//! - One-frame JPEG grab from the camera RTSP stream via ffmpeg
//! - UTC event time to KST timestamp (`%Y-%m-%dT%H:%M:%SKST`)
//! - `detections` table access (insert, time range query)
//!
//! Failures never propagate to the ingestion loop: `capture_and_persist`
//! logs and returns.

mod repository;

pub use repository::{DetectionRepository, DetectionRow};

use crate::error::{Error, Result};
use chrono::{NaiveDateTime, TimeZone, Utc};
use chrono_tz::Asia::Seoul;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Default ffmpeg frame-grab timeout in seconds
pub const DEFAULT_CAPTURE_TIMEOUT_SEC: u64 = 10;

/// Stored timestamp format
pub const KST_FORMAT: &str = "%Y-%m-%dT%H:%M:%SKST";

/// Convert a frame UtcTime (`2025-06-01T03:00:00.000Z`) to KST
///
/// Fractional seconds and the zone suffix are ignored.
pub fn utc_to_kst(utc_time: &str) -> Result<String> {
    let seconds = utc_time
        .get(..19)
        .ok_or_else(|| Error::Parse(format!("UTC time too short: {}", utc_time)))?;
    let naive = NaiveDateTime::parse_from_str(seconds, "%Y-%m-%dT%H:%M:%S")
        .map_err(|e| Error::Parse(format!("invalid UTC time {}: {}", utc_time, e)))?;

    Ok(Utc
        .from_utc_datetime(&naive)
        .with_timezone(&Seoul)
        .format(KST_FORMAT)
        .to_string())
}

/// EvidenceCapture instance
pub struct EvidenceCapture {
    rtsp_url: String,
    timeout_secs: u64,
    repository: DetectionRepository,
}

impl EvidenceCapture {
    /// Create new EvidenceCapture
    ///
    /// # Arguments
    /// * `rtsp_url` - camera stream to grab from
    /// * `timeout_secs` - ffmpeg timeout per grab
    /// * `repository` - `detections` table access
    pub fn new(rtsp_url: String, timeout_secs: u64, repository: DetectionRepository) -> Self {
        Self {
            rtsp_url,
            timeout_secs,
            repository,
        }
    }

    /// Grab one frame and store it under the KST form of `timestamp`
    pub async fn capture_and_persist(&self, timestamp: &str) {
        if timestamp.is_empty() {
            tracing::error!("Cannot capture evidence, event UTC time is empty");
            return;
        }

        let kst = match utc_to_kst(timestamp) {
            Ok(kst) => kst,
            Err(e) => {
                tracing::error!(timestamp = %timestamp, error = %e, "Cannot capture evidence");
                return;
            }
        };

        tracing::info!(timestamp = %kst, "Capturing evidence frame");

        let image = match self.capture_frame().await {
            Ok(image) => image,
            Err(e) => {
                tracing::error!(timestamp = %kst, error = %e, "Evidence capture failed");
                return;
            }
        };

        match self.repository.insert(&image, &kst).await {
            Ok(id) => {
                tracing::info!(id, timestamp = %kst, size = image.len(), "Evidence stored");
            }
            Err(e) => {
                tracing::error!(timestamp = %kst, error = %e, "Failed to store evidence");
            }
        }
    }

    /// Capture one MJPEG frame from the RTSP stream
    ///
    /// kill_on_drop(true) reaps ffmpeg when the timeout cancels the wait.
    pub async fn capture_frame(&self) -> Result<Vec<u8>> {
        let child = Command::new("ffmpeg")
            .args([
                "-i",
                self.rtsp_url.as_str(),
                "-vframes",
                "1",
                "-c:v",
                "mjpeg",
                "-f",
                "image2pipe",
                "-loglevel",
                "error",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Capture(format!("ffmpeg spawn failed: {}", e)))?;

        let timeout = Duration::from_secs(self.timeout_secs);

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(Error::Capture(format!("ffmpeg failed: {}", stderr.trim())));
                }
                if output.stdout.is_empty() {
                    return Err(Error::Capture("ffmpeg returned empty output".to_string()));
                }
                Ok(output.stdout)
            }
            Ok(Err(e)) => Err(Error::Capture(format!("ffmpeg execution failed: {}", e))),
            Err(_) => {
                tracing::warn!(
                    timeout_sec = self.timeout_secs,
                    "ffmpeg timeout, process killed via kill_on_drop"
                );
                Err(Error::Capture(format!("ffmpeg timeout ({}s)", self.timeout_secs)))
            }
        }
    }

    /// Check if ffmpeg is available
    pub async fn check_ffmpeg() -> Result<String> {
        let output = Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await
            .map_err(|e| Error::Capture(format!("ffmpeg not found: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Capture("ffmpeg version check failed".to_string()));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        Ok(version.lines().next().unwrap_or("unknown").to_string())
    }
}
