//! A byte-stream stand-in for the controller's serial link.
//!
//! Driver code that talks to the hardware with `write_all` followed by a read loop can be
//! pointed at a [`SimulatedPort`] instead of a real port.

use std::io::{self, Read, Write};

use tracing::{trace, warn};

use crate::Simulator;

/// Longest line buffered before it is dispatched without waiting for a terminator.
pub const MAX_LINE_LEN: usize = 256;

/// Serial port double backed by a [`Simulator`].
///
/// Written bytes are collected until `\n` or `\r`; each completed line is dispatched and its
/// reply queued for reading. A line reaching [`MAX_LINE_LEN`] bytes is dispatched as is, so a
/// peer that never terminates its lines cannot grow the buffer without bound. Reading with
/// nothing queued fails with [`io::ErrorKind::TimedOut`], the same way an idle `serialport`
/// port does.
#[derive(Debug, Default)]
pub struct SimulatedPort {
    simulator: Simulator,
    inbound: Vec<u8>,
    outbound: Vec<u8>,
}

impl SimulatedPort {
    pub fn new(simulator: Simulator) -> Self {
        Self {
            simulator,
            inbound: Vec::new(),
            outbound: Vec::new(),
        }
    }

    pub fn simulator(&self) -> &Simulator {
        &self.simulator
    }

    pub fn simulator_mut(&mut self) -> &mut Simulator {
        &mut self.simulator
    }

    pub fn into_inner(self) -> Simulator {
        self.simulator
    }

    /// Number of reply bytes waiting to be read.
    pub fn pending_output(&self) -> usize {
        self.outbound.len()
    }

    /// Drains every queued reply byte at once.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbound)
    }

    fn dispatch_line(&mut self, line: &[u8]) {
        let command = String::from_utf8_lossy(line);
        if command.trim().is_empty() {
            return;
        }
        let response = self.simulator.send_command(&command);
        trace!(command = %command.escape_default(), response = %response.escape_default(), "port exchange");
        self.outbound.extend_from_slice(response.as_bytes());
    }
}

impl Write for SimulatedPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            if byte == b'\n' || byte == b'\r' {
                let line = std::mem::take(&mut self.inbound);
                self.dispatch_line(&line);
            } else {
                self.inbound.push(byte);
                if self.inbound.len() >= MAX_LINE_LEN {
                    warn!(
                        len = self.inbound.len(),
                        "line exceeds limit, dispatching unterminated"
                    );
                    let line = std::mem::take(&mut self.inbound);
                    self.dispatch_line(&line);
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for SimulatedPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.outbound.is_empty() {
            if buf.is_empty() {
                return Ok(0);
            }
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no response pending"));
        }
        let n = buf.len().min(self.outbound.len());
        buf[..n].copy_from_slice(&self.outbound[..n]);
        self.outbound.drain(..n);
        Ok(n)
    }
}
