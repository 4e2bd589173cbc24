//! Poll cycle: request every page of the connected model in a fixed order
//! and merge the decoded pages into one [`TelemetryRecord`].

use crate::codec;
use crate::config::DecoderConfig;
use crate::protocol::{self, CommandPage, Page};
use crate::telemetry::TelemetryRecord;
use crate::temperature;
use crate::transport::{exchange, Transport};
use crate::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Time the device needs to answer after a request was written.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Destination of completed records.
pub trait TelemetrySink {
    type Error: fmt::Display;

    fn publish(&mut self, record: &TelemetryRecord) -> Result<(), Self::Error>;
}

/// Owns the transport and sequences one exchange at a time.
#[derive(Debug)]
pub struct Poller<T: Transport> {
    transport: T,
    config: DecoderConfig,
    pages: Vec<CommandPage>,
    settle_delay: Duration,
    read_timeout: Duration,
}

impl<T: Transport> Poller<T> {
    pub fn new(transport: T, config: DecoderConfig) -> Result<Self, Error> {
        let pages = config.command_pages()?;
        Ok(Self {
            transport,
            config,
            pages,
            settle_delay: DEFAULT_SETTLE_DELAY,
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    pub fn set_settle_delay(&mut self, delay: Duration) {
        self.settle_delay = delay;
    }

    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Release the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Run a single poll cycle.
    pub fn poll(&mut self) -> TelemetryRecord {
        let mut record = TelemetryRecord::new(chrono::Local::now());
        for CommandPage { page, command } in &self.pages {
            let raw = exchange(
                &mut self.transport,
                command,
                self.settle_delay,
                self.read_timeout,
            );
            log::debug!("{} page: {} bytes", page.name(), raw.len());
            match page {
                Page::Summary => record.summary = protocol::decode_summary(&codec::decode(&raw)),
                Page::Status => record.status = protocol::decode_status(&codec::decode(&raw)),
                Page::Cells1To8 => record
                    .cells
                    .extend(protocol::decode_cells(&codec::decode(&raw), 1)),
                Page::Cells9To16 => record
                    .cells
                    .extend(protocol::decode_cells(&codec::decode(&raw), 9)),
                Page::Temperature => {
                    record.temperatures = temperature::calibrated_temperatures(
                        &temperature::decode_temperatures(&raw),
                        &self.config,
                    )
                }
            }
        }
        record
    }

    /// Poll and publish every `interval` until `running` is cleared or
    /// `max_cycles` cycles completed. Returns the number of cycles run.
    pub fn run<S: TelemetrySink>(
        &mut self,
        sink: &mut S,
        interval: Duration,
        running: &AtomicBool,
        max_cycles: Option<usize>,
    ) -> usize {
        let mut cycles = 0;
        while running.load(Ordering::SeqCst) && max_cycles.map_or(true, |max| cycles < max) {
            let record = self.poll();
            if record.is_empty() {
                log::warn!("No data or incomplete responses received this cycle");
            }
            if let Err(e) = sink.publish(&record) {
                log::error!("Failed to publish telemetry: {e}");
            }
            cycles += 1;
            if max_cycles.map_or(true, |max| cycles < max) {
                sleep_while_running(interval, running);
            }
        }
        cycles
    }
}

fn sleep_while_running(duration: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + duration;
    while running.load(Ordering::SeqCst) {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            break;
        };
        if remaining.is_zero() {
            break;
        }
        std::thread::sleep(remaining.min(SLEEP_SLICE));
    }
}
