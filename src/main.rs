use anyhow::{Context, Result};
use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use qdbms_lib::poll::Poller;
use qdbms_lib::protocol::Page;
use qdbms_lib::serialport::{self as serial, SerialTransport};
use std::{ops::Deref, panic};

mod commandline;
mod daemon;
mod mqtt;
mod settings;

use commandline::{CliArgs, CliCommands, AUTO_DEVICE};

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown>", 0, 0));
        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref);
        let cause = cause.unwrap_or_else(|| {
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .unwrap_or("<cause unknown>")
        });

        error!(
            "Thread '{}' panicked at {}:{}:{}: {}",
            std::thread::current().name().unwrap_or("<unknown>"),
            filename,
            line,
            column,
            cause
        );
    }));
    log_handle
}

fn open_transport(args: &CliArgs) -> Result<SerialTransport> {
    if args.device != AUTO_DEVICE {
        return SerialTransport::open(&args.device, args.baud_rate)
            .with_context(|| format!("Cannot open serial port '{}'", args.device));
    }
    let (port, transport) = serial::discover(
        serial::USB_PORT_PREFIX,
        args.baud_rate,
        &Page::Summary.default_command(),
        args.delay,
        args.timeout,
    )
    .with_context(|| format!("No working {}* port found", serial::USB_PORT_PREFIX))?;
    info!("Using serial port '{port}'");
    Ok(transport)
}

fn build_poller(args: &CliArgs) -> Result<Poller<SerialTransport>> {
    let mut config = settings::load_decoder_config(args.decoder_config.as_deref())?;
    if let Some(model) = args.model {
        config.model = model.into();
    }
    debug!("Decoder config: {config:?}");

    let transport = open_transport(args)?;
    let mut poller = Poller::new(transport, config).with_context(|| "Invalid decoder config")?;
    poller.set_read_timeout(args.timeout);
    poller.set_settle_delay(args.delay);
    Ok(poller)
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());

    match &args.command {
        CliCommands::Ports => {
            for port in serial::candidate_ports(serial::USB_PORT_PREFIX)
                .with_context(|| "Cannot list serial ports")?
            {
                println!("{port}");
            }
        }
        CliCommands::Read => {
            let record = build_poller(&args)?.poll();
            println!(
                "{}",
                serde_json::to_string_pretty(&record).with_context(|| "Cannot serialize record")?
            );
        }
        CliCommands::Daemon {
            output,
            interval,
            count,
        } => daemon::run(build_poller(&args)?, output.clone(), *interval, *count)?,
    }

    Ok(())
}
