use crate::codec;
use crate::protocol::Command;
use std::io;
use std::time::Duration;

/// Upper bound for a single response frame.
pub const MAX_FRAME_LEN: usize = 512;

/// Byte-oriented half-duplex channel to the BMS.
pub trait Transport {
    /// Send a complete request frame.
    fn write(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Read until `terminator` is seen, [`MAX_FRAME_LEN`] bytes were read or
    /// `timeout` elapsed. A timeout returns the bytes received so far.
    fn read_until(&mut self, terminator: u8, timeout: Duration) -> io::Result<Vec<u8>>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, frame: &[u8]) -> io::Result<()> {
        (**self).write(frame)
    }

    fn read_until(&mut self, terminator: u8, timeout: Duration) -> io::Result<Vec<u8>> {
        (**self).read_until(terminator, timeout)
    }
}

/// Write `command`, wait `settle_delay`, then read one response frame.
///
/// Write and read failures are logged and yield an empty response.
pub fn exchange<T: Transport + ?Sized>(
    transport: &mut T,
    command: &Command,
    settle_delay: Duration,
    read_timeout: Duration,
) -> Vec<u8> {
    if let Err(e) = transport.write(&command.to_wire()) {
        log::warn!("Cannot send request: {e}");
        return Vec::new();
    }
    std::thread::sleep(settle_delay);
    match transport.read_until(codec::TERMINATOR, read_timeout) {
        Ok(raw) => raw,
        Err(e) => {
            log::warn!("Cannot read response: {e}");
            Vec::new()
        }
    }
}
