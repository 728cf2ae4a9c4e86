//! Crosswatch Library
//!
//! Roadside pedestrian-crossing monitor: ONVIF analytics metadata in,
//! warning-board actuation out
//!
//! ## Architecture (8 Components)
//!
//! 1. MetadataParser - Block classification and record extraction
//! 2. FrameCache - Recent frames for dropout debounce and human confirmation
//! 3. TrajectoryStore - Per-vehicle position history
//! 4. Calibration - Anchor pairs, reference center, rule lines
//! 5. RiskEngine - Approach and parallelism decision, alert response
//! 6. BoardProtocol - Framed serial commands with ACK/retry
//! 7. EvidenceCapture - Frame grab and `detections` persistence
//! 8. Ingestion - Metadata transport and pipeline orchestration
//!
//! ## Design Principles
//!
//! - Calibration is loaded once and shared immutably
//! - Mutable tracking state is owned by the pipeline, locked only to mutate
//! - Per-block and per-command failures are logged, never fatal

pub mod board_protocol;
pub mod calibration;
pub mod error;
pub mod evidence_capture;
pub mod frame_cache;
pub mod ingestion;
pub mod metadata_parser;
pub mod models;
pub mod risk_engine;
pub mod state;
pub mod trajectory_store;

pub use error::{Error, Result};
pub use state::AppConfig;
