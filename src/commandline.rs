use crate::mqtt;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use qdbms_lib::config::DeviceModel;
use std::{path::PathBuf, time::Duration};

/// Device value that triggers port auto-discovery.
pub const AUTO_DEVICE: &str = "auto";

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Run a single poll cycle and print the telemetry record as JSON
    Read,
    /// List serial ports considered by auto-discovery
    Ports,
    /// Run in daemon mode, periodically polling the BMS and publishing the records
    Daemon {
        /// Output destination for telemetry records
        #[command(subcommand)]
        output: DaemonOutput,
        /// Interval between poll cycles (e.g., "2s", "1m")
        #[clap(long, short, value_parser = humantime::parse_duration, default_value = "2s")]
        interval: Duration,
        /// Stop after this many poll cycles instead of running until interrupted
        #[clap(long, short)]
        count: Option<usize>,
    },
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq)]
pub enum MqttFormat {
    /// Each field on its own sub-topic
    Simple,
    /// The whole record as one JSON object
    Json,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq)]
pub enum ModelArg {
    /// Summary, status, cell voltages and temperatures
    Full,
    /// Summary page only
    SummaryOnly,
}

impl From<ModelArg> for DeviceModel {
    fn from(model: ModelArg) -> Self {
        match model {
            ModelArg::Full => DeviceModel::Full,
            ModelArg::SummaryOnly => DeviceModel::SummaryOnly,
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum DaemonOutput {
    /// Continuously poll and print each record to the standard output (console).
    Console,
    /// Continuously poll and publish each record to an MQTT broker.
    Mqtt {
        /// The configuration file for the MQTT broker
        #[arg(long, default_value_t = mqtt::MqttConfig::DEFAULT_CONFIG_FILE.to_string())]
        config_file: String,
        /// Output format for MQTT messages
        #[arg(long, value_enum, default_value_t = MqttFormat::Json)]
        format: MqttFormat,
    },
}

const fn about_text() -> &'static str {
    "ASCII-hex BMS telemetry poller"
}

#[derive(Parser, Debug)]
#[command(version, about=about_text(), long_about = None)]
pub struct CliArgs {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// Serial port device path (e.g., /dev/ttyUSB0), or "auto" to scan /dev/ttyUSB* ports
    #[arg(short, long, default_value = AUTO_DEVICE)]
    pub device: String,

    /// Serial baud rate
    #[arg(short, long, default_value_t = qdbms_lib::serialport::DEFAULT_BAUD_RATE)]
    pub baud_rate: u32,

    #[command(subcommand)]
    pub command: CliCommands,

    /// Timeout for reading one response (e.g., "500ms", "1s")
    #[arg(value_parser = humantime::parse_duration, long, default_value = "1s")]
    pub timeout: Duration,

    /// Delay between writing a request and reading the response (e.g., "100ms")
    #[arg(value_parser = humantime::parse_duration, long, default_value = "100ms")]
    pub delay: Duration,

    /// Connected device model, overrides the decoder configuration file
    #[arg(long, value_enum)]
    pub model: Option<ModelArg>,

    /// YAML file with thermistor, calibration and command settings
    #[arg(long)]
    pub decoder_config: Option<PathBuf>,
}
