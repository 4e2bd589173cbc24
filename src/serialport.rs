//! Serial port transport built on the `serialport` crate.

use crate::protocol::Command;
use crate::transport::{exchange, Transport, MAX_FRAME_LEN};
use crate::Error;
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

pub const DEFAULT_BAUD_RATE: u32 = 115_200;
/// Device paths tried by [`discover`].
pub const USB_PORT_PREFIX: &str = "/dev/ttyUSB";

const READ_CHUNK: usize = 64;

#[derive(Debug)]
pub struct SerialTransport {
    serial: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open `port` as 8N1 without flow control, assert RTS and clear DTR.
    pub fn open(port: &str, baud_rate: u32) -> Result<Self, Error> {
        let mut serial = serialport::new(port, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_secs(1))
            .open()?;
        serial.write_request_to_send(true)?;
        serial.write_data_terminal_ready(false)?;
        log::debug!("Opened serial port '{}' at {} baud", port, baud_rate);
        Ok(Self { serial })
    }

    pub fn name(&self) -> Option<String> {
        self.serial.name()
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, frame: &[u8]) -> io::Result<()> {
        // drop stale bytes of an earlier, late response
        self.serial.clear(ClearBuffer::Input)?;
        self.serial.write_all(frame)?;
        self.serial.flush()
    }

    fn read_until(&mut self, terminator: u8, timeout: Duration) -> io::Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut frame = Vec::with_capacity(MAX_FRAME_LEN);
        let mut chunk = [0u8; READ_CHUNK];
        while frame.len() < MAX_FRAME_LEN {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                break;
            };
            if remaining.is_zero() {
                break;
            }
            self.serial.set_timeout(remaining)?;
            let want = READ_CHUNK.min(MAX_FRAME_LEN - frame.len());
            match self.serial.read(&mut chunk[..want]) {
                Ok(0) => break,
                Ok(n) => {
                    frame.extend_from_slice(&chunk[..n]);
                    if let Some(end) = frame.iter().position(|&b| b == terminator) {
                        frame.truncate(end + 1);
                        return Ok(frame);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if !frame.is_empty() {
            log::debug!("Incomplete response after {:?}: {} bytes", timeout, frame.len());
        }
        Ok(frame)
    }
}

/// Serial ports whose path starts with `prefix`.
pub fn candidate_ports(prefix: &str) -> Result<Vec<String>, Error> {
    let mut ports: Vec<String> = serialport::available_ports()?
        .into_iter()
        .map(|info| info.port_name)
        .filter(|name| name.starts_with(prefix))
        .collect();
    ports.sort();
    Ok(ports)
}

/// Open the first candidate port that answers `command` with a non-empty response.
pub fn discover(
    prefix: &str,
    baud_rate: u32,
    command: &Command,
    settle_delay: Duration,
    timeout: Duration,
) -> Result<(String, SerialTransport), Error> {
    for port in candidate_ports(prefix)? {
        let mut transport = match SerialTransport::open(&port, baud_rate) {
            Ok(transport) => transport,
            Err(e) => {
                log::debug!("Skipping '{port}': {e}");
                continue;
            }
        };
        if exchange(&mut transport, command, settle_delay, timeout).is_empty() {
            log::debug!("No response on '{port}'");
            continue;
        }
        log::info!("Found responding BMS on '{port}'");
        return Ok((port, transport));
    }
    Err(Error::NoPortFound)
}
