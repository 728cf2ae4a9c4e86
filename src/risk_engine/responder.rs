//! Alert response
//!
//! Actuation that follows a positive [`AlertDecision`]: warning board ON,
//! dwell, warning board OFF, then an evidence frame for the event timestamp.

use super::AlertDecision;
use crate::board_protocol::{BoardController, LinkOpener, SerialOpener};
use crate::evidence_capture::EvidenceCapture;
use crate::models::BoardCommand;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Receiver of alert decisions
///
/// The ingestion pipeline awaits each response before reading the next
/// metadata block.
pub trait AlertResponder: Send + Sync {
    fn respond(&self, decision: &AlertDecision, timestamp: &str) -> impl Future<Output = ()> + Send;
}

/// Drives the partner board and records evidence
pub struct BoardAlertResponder<O: LinkOpener = SerialOpener> {
    boards: Arc<BoardController<O>>,
    capture: Arc<EvidenceCapture>,
    retries: u32,
    timeout_ms: u64,
    dwell: Duration,
}

impl<O: LinkOpener> BoardAlertResponder<O> {
    /// Create new BoardAlertResponder
    pub fn new(
        boards: Arc<BoardController<O>>,
        capture: Arc<EvidenceCapture>,
        retries: u32,
        timeout_ms: u64,
        dwell: Duration,
    ) -> Self {
        Self {
            boards,
            capture,
            retries,
            timeout_ms,
            dwell,
        }
    }
}

impl<O: LinkOpener> AlertResponder for BoardAlertResponder<O> {
    async fn respond(&self, decision: &AlertDecision, timestamp: &str) {
        tracing::info!(
            vehicle_id = decision.vehicle_id,
            human_id = decision.human_id,
            board_id = decision.board_id,
            similarity = decision.similarity,
            "Activating warning board"
        );

        // A failed ON still runs the OFF and capture steps
        self.boards
            .command_board(decision.board_id, BoardCommand::LcdOn, self.retries, self.timeout_ms)
            .await;
        tokio::time::sleep(self.dwell).await;
        self.boards
            .command_board(decision.board_id, BoardCommand::LcdOff, self.retries, self.timeout_ms)
            .await;

        self.capture.capture_and_persist(timestamp).await;
    }
}
