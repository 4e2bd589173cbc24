#![cfg_attr(docsrs, feature(doc_cfg))]
//! # qdbms_lib
//!
//! Decoder and poller for battery management units speaking an ASCII-hex
//! framed request/response protocol over a serial line.
//!
//! A poll cycle requests the summary, status, two cell voltage pages and the
//! NTC temperature page, decodes each of them independently and merges the
//! results into one [`telemetry::TelemetryRecord`]. A page that cannot be
//! decoded contributes no fields; it never fails the cycle.
//!
//! ## Features
//!
//! - `default`: Enables `bin-dependencies`, which is intended for compiling the `qdbms` command-line tool.
//! - `serialport`: Enables the serial port transport using the `serialport` crate.
//! - `bin-dependencies`: Enables all features required by the `qdbms` binary executable.

/// ASCII-hex frame codec.
pub mod codec;
/// Decoder configuration: device model, thermistor and calibration constants.
pub mod config;
mod error;
/// Poll cycle orchestration.
pub mod poll;
/// Command pages and page decoders.
pub mod protocol;
pub mod telemetry;
pub mod temperature;
/// Transport boundary.
pub mod transport;

pub use error::Error;

/// Serial port transport and port discovery.
#[cfg_attr(docsrs, doc(cfg(feature = "serialport")))]
#[cfg(feature = "serialport")]
pub mod serialport;
