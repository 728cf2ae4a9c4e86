//! Serial line access
//!
//! The reliable send only needs three primitives from the line; the UART
//! implementation sits behind [`SerialLink`] so the protocol runs against a
//! scripted line in tests.

use crate::error::{Error, Result};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// Default UART speed of the boards
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Byte-level serial line
pub trait SerialLink {
    /// Discard unread input
    fn clear_input(&mut self) -> Result<()>;

    /// Transmit a whole frame
    fn write_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Read whatever arrives within `wait`; `Ok(0)` when nothing did
    fn read_available(&mut self, buf: &mut [u8], wait: Duration) -> Result<usize>;
}

/// Opens a fresh link per command
pub trait LinkOpener: Send + Sync + 'static {
    type Link: SerialLink;

    fn open(&self, path: &str) -> Result<Self::Link>;
}

/// UART opened raw 8N1 without flow control
pub struct SerialPortLink {
    port: Box<dyn SerialPort>,
}

impl SerialPortLink {
    /// Open and configure the device
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(super::POLL_STEP_MS))
            .open()?;

        tracing::debug!(path = %path, baud_rate, "Serial port opened");

        Ok(Self { port })
    }
}

impl SerialLink for SerialPortLink {
    fn clear_input(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.port.write_all(frame)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8], wait: Duration) -> Result<usize> {
        self.port.set_timeout(wait)?;
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Opens [`SerialPortLink`]s at a fixed baud rate
#[derive(Debug, Clone, Copy)]
pub struct SerialOpener {
    baud_rate: u32,
}

impl SerialOpener {
    pub fn new(baud_rate: u32) -> Self {
        Self { baud_rate }
    }
}

impl Default for SerialOpener {
    fn default() -> Self {
        Self::new(DEFAULT_BAUD_RATE)
    }
}

impl LinkOpener for SerialOpener {
    type Link = SerialPortLink;

    fn open(&self, path: &str) -> Result<SerialPortLink> {
        SerialPortLink::open(path, self.baud_rate)
    }
}
