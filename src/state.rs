//! Application configuration
//!
//! Environment-driven settings, read once at startup

use crate::board_protocol::{
    BoardPortMap, DEFAULT_BAUD_RATE, DEFAULT_RETRIES, DEFAULT_TIMEOUT_MS,
};
use crate::error::Result;
use crate::evidence_capture::DEFAULT_CAPTURE_TIMEOUT_SEC;
use crate::frame_cache::DEFAULT_FRAME_CACHE_SIZE;
use crate::models::ScaleFactor;
use crate::risk_engine::{RiskConfig, DEFAULT_APPROACH_THRESHOLD, DEFAULT_PARALLELISM_THRESHOLD};
use crate::trajectory_store::DEFAULT_HISTORY_SIZE;
use std::str::FromStr;
use std::time::Duration;

/// Default camera stream (metadata on stream 1, video on stream 0)
pub const DEFAULT_RTSP_URL: &str =
    "rtsp://admin:admin123@@192.168.0.137:554/0/onvif/profile2/media.smp";

/// Default persistence store
pub const DEFAULT_DATABASE_URL: &str = "sqlite://../server_log.db";

/// Default dwell between board ON and OFF
pub const DEFAULT_ALERT_DWELL_MS: u64 = 5000;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Database URL
    pub database_url: String,
    /// Camera RTSP URL (metadata source and evidence capture)
    pub rtsp_url: String,
    /// Board id to UART device
    pub board_ports: BoardPortMap,
    pub serial_baud: u32,
    /// Attempts per board command
    pub board_retries: u32,
    /// ACK window per attempt
    pub board_timeout_ms: u64,
    /// Time the warning board stays on
    pub alert_dwell: Duration,
    /// Stored calibration resolution to working resolution
    pub calibration_scale: ScaleFactor,
    pub risk: RiskConfig,
    pub frame_cache_size: usize,
    pub history_size: usize,
    /// ffmpeg frame-grab timeout
    pub capture_timeout_sec: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            rtsp_url: std::env::var("RTSP_URL").unwrap_or_else(|_| DEFAULT_RTSP_URL.to_string()),
            board_ports: std::env::var("BOARD_PORTS")
                .ok()
                .and_then(|json| match BoardPortMap::from_json(&json) {
                    Ok(ports) => Some(ports),
                    Err(e) => {
                        tracing::warn!(error = %e, "Invalid BOARD_PORTS, using default mapping");
                        None
                    }
                })
                .unwrap_or_default(),
            serial_baud: env_or("SERIAL_BAUD", DEFAULT_BAUD_RATE),
            board_retries: env_or("BOARD_RETRIES", DEFAULT_RETRIES),
            board_timeout_ms: env_or("BOARD_TIMEOUT_MS", DEFAULT_TIMEOUT_MS),
            alert_dwell: Duration::from_millis(env_or("ALERT_DWELL_MS", DEFAULT_ALERT_DWELL_MS)),
            calibration_scale: ScaleFactor {
                x: env_or("CALIBRATION_SCALE_X", ScaleFactor::WORKING_TO_ANALYTICS.x),
                y: env_or("CALIBRATION_SCALE_Y", ScaleFactor::WORKING_TO_ANALYTICS.y),
            },
            risk: RiskConfig {
                approach_threshold: env_or("APPROACH_THRESHOLD", DEFAULT_APPROACH_THRESHOLD),
                parallelism_threshold: env_or("PARALLELISM_THRESHOLD", DEFAULT_PARALLELISM_THRESHOLD),
            },
            frame_cache_size: env_or("FRAME_CACHE_SIZE", DEFAULT_FRAME_CACHE_SIZE),
            history_size: env_or("HISTORY_SIZE", DEFAULT_HISTORY_SIZE),
            capture_timeout_sec: env_or("CAPTURE_TIMEOUT_SEC", DEFAULT_CAPTURE_TIMEOUT_SEC),
        }
    }
}

impl AppConfig {
    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        use crate::error::Error;

        if self.board_retries == 0 {
            return Err(Error::Config("BOARD_RETRIES must be at least 1".to_string()));
        }
        if self.frame_cache_size == 0 || self.history_size == 0 {
            return Err(Error::Config(
                "FRAME_CACHE_SIZE and HISTORY_SIZE must be at least 1".to_string(),
            ));
        }
        if self.board_ports.is_empty() {
            return Err(Error::Config("BOARD_PORTS maps no boards".to_string()));
        }
        Ok(())
    }
}

/// Parse an environment variable, falling back on absence or bad value
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_falls_back() {
        assert_eq!(env_or("CROSSWATCH_TEST_UNSET_VARIABLE", 42u32), 42);
        std::env::set_var("CROSSWATCH_TEST_BAD_NUMBER", "abc");
        assert_eq!(env_or("CROSSWATCH_TEST_BAD_NUMBER", 7u64), 7);
        std::env::set_var("CROSSWATCH_TEST_GOOD_NUMBER", " 0.5 ");
        assert_eq!(env_or("CROSSWATCH_TEST_GOOD_NUMBER", 0.75f64), 0.5);
    }

    #[test]
    fn test_validate() {
        let mut config = AppConfig::default();
        config.board_ports = BoardPortMap::default();
        config.board_retries = 3;
        config.frame_cache_size = 15;
        config.history_size = 10;
        assert!(config.validate().is_ok());

        config.board_retries = 0;
        assert!(config.validate().is_err());

        config.board_retries = 3;
        config.board_ports = BoardPortMap::from_pairs(Vec::<(u8, String)>::new());
        assert!(config.validate().is_err());
    }
}
