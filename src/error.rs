/// Errors raised outside the page decoders.
///
/// Decoding never produces an `Error`: a page that cannot be parsed simply
/// contributes nothing to the current telemetry record.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error, typically from the serial port communication.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The serial port could not be opened or configured.
    #[cfg(feature = "serialport")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
    /// A configured command is not valid hex text.
    #[error("Invalid command '{0}'")]
    InvalidCommand(String),
    /// Port discovery did not find any device answering the summary command.
    #[error("No responding BMS found on any candidate port")]
    NoPortFound,
}
