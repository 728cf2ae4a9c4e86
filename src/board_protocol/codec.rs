//! Wire codec
//!
//! `DLE STX <payload> DLE ETX` framing with DLE-only byte stuffing and the
//! reflected CRC16 (poly 0x8005) the boards check.

/// Data link escape
pub const DLE: u8 = 0x10;
/// Start of text
pub const STX: u8 = 0x02;
/// End of text
pub const ETX: u8 = 0x03;

/// Positive acknowledgement response code
pub const ACK: u8 = 0xAA;
/// Negative acknowledgement response code
pub const NACK: u8 = 0x55;

const CRC16_POLY: u16 = 0x8005;

/// CRC16 over `data`
///
/// Each input byte is bit-reversed before entering the register and the
/// final register is bit-reversed on output.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte.reverse_bits() as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC16_POLY
            } else {
                crc << 1
            };
        }
    }
    crc.reverse_bits()
}

/// Single-bit destination mask for a board id in 1..=8
pub fn destination_mask(board_id: u8) -> Option<u8> {
    match board_id {
        1..=8 => Some(1u8 << (board_id - 1)),
        _ => None,
    }
}

/// Append CRC, escape and wrap a payload
pub fn frame_payload(payload: &[u8]) -> Vec<u8> {
    let crc = crc16(payload);
    let mut body = payload.to_vec();
    body.extend_from_slice(&crc.to_be_bytes());

    let mut frame = Vec::with_capacity(body.len() * 2 + 4);
    frame.extend_from_slice(&[DLE, STX]);
    for byte in body {
        if byte == DLE {
            frame.extend_from_slice(&[DLE, DLE]);
        } else {
            frame.push(byte);
        }
    }
    frame.extend_from_slice(&[DLE, ETX]);
    frame
}

/// Encode a command frame for one board
///
/// Returns `None` for a board id outside 1..=8.
pub fn encode_frame(board_id: u8, command_code: u8) -> Option<Vec<u8>> {
    let mask = destination_mask(board_id)?;
    Some(frame_payload(&[mask, command_code]))
}

/// Receiver states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RxState {
    #[default]
    WaitDle,
    WaitStx,
    InFrame,
    WaitEtx,
}

/// Byte-at-a-time frame decoder
#[derive(Debug, Default)]
pub struct FrameReceiver {
    state: RxState,
    payload: Vec<u8>,
}

impl FrameReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RxState {
        self.state
    }

    /// Feed one byte; returns the unescaped payload when a frame completes
    pub fn push(&mut self, byte: u8) -> Option<Vec<u8>> {
        match self.state {
            RxState::WaitDle => {
                if byte == DLE {
                    self.state = RxState::WaitStx;
                }
            }
            RxState::WaitStx => match byte {
                STX => {
                    self.payload.clear();
                    self.state = RxState::InFrame;
                }
                DLE => {}
                _ => self.state = RxState::WaitDle,
            },
            RxState::InFrame => {
                if byte == DLE {
                    self.state = RxState::WaitEtx;
                } else {
                    self.payload.push(byte);
                }
            }
            RxState::WaitEtx => match byte {
                ETX => {
                    self.state = RxState::WaitDle;
                    return Some(std::mem::take(&mut self.payload));
                }
                DLE => {
                    self.payload.push(DLE);
                    self.state = RxState::InFrame;
                }
                _ => {
                    tracing::warn!(byte, "Unexpected byte after DLE, frame dropped");
                    self.payload.clear();
                    self.state = RxState::WaitDle;
                }
            },
        }
        None
    }
}

/// Decoded board response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardResponse {
    Ack,
    Nack,
    Other(u8),
}

/// Invalid response frame
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("bad response size: {0} bytes")]
    BadSize(usize),

    #[error("CRC mismatch: received 0x{received:04X}, computed 0x{computed:04X}")]
    BadCrc { received: u16, computed: u16 },
}

/// Validate a `[resp_code, crc_hi, crc_lo]` payload
pub fn decode_response(payload: &[u8]) -> std::result::Result<BoardResponse, FrameError> {
    let [code, crc_hi, crc_lo] = payload else {
        return Err(FrameError::BadSize(payload.len()));
    };

    let received = u16::from_be_bytes([*crc_hi, *crc_lo]);
    let computed = crc16(&[*code]);
    if received != computed {
        return Err(FrameError::BadCrc { received, computed });
    }

    Ok(match *code {
        ACK => BoardResponse::Ack,
        NACK => BoardResponse::Nack,
        other => BoardResponse::Other(other),
    })
}
