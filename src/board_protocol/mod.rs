//! BoardProtocol - Warning Board Actuation over Serial
//!
//! ## Responsibilities
//!
//! - Frame commands (`DLE STX [mask, cmd, crc_hi, crc_lo] DLE ETX`, DLE stuffing)
//! - Decode board responses byte by byte and validate their CRC
//! - Reliable send: flush, transmit, poll for ACK, back off and retry
//! - Map board ids to UART devices; open the device fresh per command
//!
//! ## Timing
//!
//! Each attempt listens for the full timeout window unless an ACK arrives,
//! even when the write itself failed. A NACK is logged and listening
//! continues in the same window.

mod codec;
mod link;

pub use codec::{
    crc16, decode_response, destination_mask, encode_frame, frame_payload, BoardResponse,
    FrameError, FrameReceiver, RxState, ACK, DLE, ETX, NACK, STX,
};
pub use link::{LinkOpener, SerialLink, SerialOpener, SerialPortLink, DEFAULT_BAUD_RATE};

use crate::error::Result;
use crate::models::BoardCommand;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Polling step while waiting for a response
pub const POLL_STEP_MS: u64 = 10;

/// Pause after an attempt that ended without ACK
pub const RETRY_BACKOFF_MS: u64 = 100;

/// Default attempts per command
pub const DEFAULT_RETRIES: u32 = 3;

/// Default ACK window per attempt
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Reliable send pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub poll_step: Duration,
    pub backoff: Duration,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            poll_step: Duration::from_millis(POLL_STEP_MS),
            backoff: Duration::from_millis(RETRY_BACKOFF_MS),
        }
    }
}

#[cfg(test)]
impl SendOptions {
    pub(crate) fn fast() -> Self {
        Self {
            poll_step: Duration::from_millis(2),
            backoff: Duration::from_millis(5),
        }
    }
}

/// Send a frame and wait for an ACK, retrying up to `retries` times
///
/// Blocks the calling thread. Returns `true` on the first valid ACK.
pub fn send_with_ack<L: SerialLink + ?Sized>(
    link: &mut L,
    frame: &[u8],
    retries: u32,
    timeout: Duration,
    options: &SendOptions,
) -> bool {
    let mut buf = [0u8; 64];

    for attempt in 1..=retries {
        if let Err(e) = link.clear_input() {
            tracing::warn!(attempt, error = %e, "Failed to flush serial input");
        }

        if let Err(e) = link.write_frame(frame) {
            tracing::warn!(attempt, error = %e, "Failed to write frame");
        }

        let mut receiver = FrameReceiver::new();
        let deadline = Instant::now() + timeout;

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait = options.poll_step.min(deadline - now);

            let received = match link.read_available(&mut buf, wait) {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Serial read failed");
                    std::thread::sleep(wait);
                    0
                }
            };

            for &byte in &buf[..received] {
                let Some(payload) = receiver.push(byte) else {
                    continue;
                };
                match decode_response(&payload) {
                    Ok(BoardResponse::Ack) => {
                        tracing::info!(attempt, "ACK received");
                        return true;
                    }
                    Ok(BoardResponse::Nack) => {
                        tracing::warn!(attempt, "NACK received, still listening");
                    }
                    Ok(BoardResponse::Other(code)) => {
                        tracing::warn!(attempt, code, "Unknown response code");
                    }
                    Err(e) => {
                        tracing::warn!(attempt, error = %e, "Invalid response frame");
                    }
                }
            }
        }

        tracing::warn!(
            attempt,
            retries,
            timeout_ms = timeout.as_millis() as u64,
            "No ACK within timeout"
        );
        std::thread::sleep(options.backoff);
    }

    tracing::error!(retries, "No ACK after all attempts");
    false
}

/// Board id to serial device mapping
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct BoardPortMap(BTreeMap<u8, String>);

impl BoardPortMap {
    /// Parse `{"1":"/dev/ttyAMA0", ...}`
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u8, S)>,
        S: Into<String>,
    {
        Self(pairs.into_iter().map(|(id, path)| (id, path.into())).collect())
    }

    pub fn get(&self, board_id: u8) -> Option<&str> {
        self.0.get(&board_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for BoardPortMap {
    fn default() -> Self {
        Self::from_pairs([
            (1, "/dev/ttyAMA0"),
            (2, "/dev/ttyAMA2"),
            (3, "/dev/ttyAMA1"),
            (4, "/dev/ttyAMA3"),
        ])
    }
}

/// BoardController instance
pub struct BoardController<O: LinkOpener = SerialOpener> {
    ports: BoardPortMap,
    opener: Arc<O>,
    options: SendOptions,
}

impl BoardController<SerialOpener> {
    /// Create new BoardController over real UARTs
    pub fn new(ports: BoardPortMap, baud_rate: u32) -> Self {
        Self::with_opener(ports, SerialOpener::new(baud_rate), SendOptions::default())
    }
}

impl<O: LinkOpener> BoardController<O> {
    pub fn with_opener(ports: BoardPortMap, opener: O, options: SendOptions) -> Self {
        Self {
            ports,
            opener: Arc::new(opener),
            options,
        }
    }

    /// Send one command to one board and wait for its ACK
    ///
    /// The device is opened for this command only. Serial I/O runs on the
    /// blocking pool. Every failure, including an id outside 1..=8, is
    /// logged and reported as `false`.
    pub async fn command_board(
        &self,
        board_id: i64,
        command: BoardCommand,
        retries: u32,
        timeout_ms: u64,
    ) -> bool {
        let code = format!("0x{:02X}", command.code());

        let addressed = u8::try_from(board_id)
            .ok()
            .and_then(|board| Some((board, encode_frame(board, command.code())?)));
        let Some((board, frame)) = addressed else {
            tracing::warn!(board_id, command = %code, "Board id out of range");
            return false;
        };
        let Some(path) = self.ports.get(board).map(str::to_string) else {
            tracing::warn!(board_id, command = %code, "No serial port mapped for board");
            return false;
        };

        let opener = self.opener.clone();
        let options = self.options;
        let device = path.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<bool> {
            let mut link = opener.open(&device)?;
            Ok(send_with_ack(
                &mut link,
                &frame,
                retries,
                Duration::from_millis(timeout_ms),
                &options,
            ))
        })
        .await;

        match result {
            Ok(Ok(true)) => {
                tracing::info!(board_id, command = %code, port = %path, "Board command acknowledged");
                true
            }
            Ok(Ok(false)) => {
                tracing::error!(board_id, command = %code, port = %path, retries, "Board command failed");
                false
            }
            Ok(Err(e)) => {
                tracing::error!(board_id, port = %path, error = %e, "Failed to open serial port");
                false
            }
            Err(e) => {
                tracing::error!(board_id, error = %e, "Board command task failed");
                false
            }
        }
    }
}
