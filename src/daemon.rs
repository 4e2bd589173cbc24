use anyhow::{Context, Result};
use log::{error, info};
use qdbms_lib::poll::{Poller, TelemetrySink};
use qdbms_lib::telemetry::TelemetryRecord;
use qdbms_lib::transport::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::{commandline, mqtt};

/// Prints one JSON line per record.
struct ConsoleSink;

impl TelemetrySink for ConsoleSink {
    type Error = anyhow::Error;

    fn publish(&mut self, record: &TelemetryRecord) -> Result<()> {
        let line = serde_json::to_string(record).with_context(|| "Cannot serialize record")?;
        println!("{line}");
        Ok(())
    }
}

struct MqttSink {
    publisher: mqtt::MqttPublisher,
    format: commandline::MqttFormat,
}

impl TelemetrySink for MqttSink {
    type Error = anyhow::Error;

    fn publish(&mut self, record: &TelemetryRecord) -> Result<()> {
        let base_topic = self.publisher.topic().to_string();
        match self.format {
            commandline::MqttFormat::Json => {
                let json_payload =
                    serde_json::to_string(record).with_context(|| "Cannot serialize record")?;
                self.publisher.publish(&base_topic, &json_payload)
            }
            commandline::MqttFormat::Simple => {
                for (topic, payload) in simple_messages(&base_topic, &record.to_json()) {
                    if let Err(e) = self.publisher.publish(&topic, &payload) {
                        error!("Failed to publish message to topic {topic}: {e}");
                    }
                }
                Ok(())
            }
        }
    }
}

/// One `(topic, payload)` pair per field, nested values on deeper sub-topics.
fn simple_messages(base_topic: &str, value: &serde_json::Value) -> Vec<(String, String)> {
    fn collect(topic: &str, val: &serde_json::Value, out: &mut Vec<(String, String)>) {
        match val {
            serde_json::Value::Object(map) => {
                for (k, v) in map {
                    collect(&format!("{topic}/{k}"), v, out);
                }
            }
            serde_json::Value::Array(arr) => {
                for (i, v) in arr.iter().enumerate() {
                    collect(&format!("{topic}/{i}"), v, out);
                }
            }
            serde_json::Value::String(s) => out.push((topic.to_string(), s.clone())),
            serde_json::Value::Number(n) => out.push((topic.to_string(), n.to_string())),
            serde_json::Value::Bool(b) => out.push((topic.to_string(), b.to_string())),
            serde_json::Value::Null => {
                // Do not publish null values
            }
        }
    }
    let mut messages = Vec::new();
    collect(base_topic, value, &mut messages);
    messages
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .with_context(|| "Cannot install interrupt handler")
}

pub fn run<T: Transport>(
    mut poller: Poller<T>,
    output: commandline::DaemonOutput,
    interval: Duration,
    count: Option<usize>,
) -> Result<()> {
    info!("Starting daemon mode: output={output:?}, interval={interval:?}, count={count:?}");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let cycles = match output {
        commandline::DaemonOutput::Console => {
            poller.run(&mut ConsoleSink, interval, &running, count)
        }
        commandline::DaemonOutput::Mqtt {
            config_file,
            format,
        } => {
            let config = mqtt::MqttConfig::load(&config_file)
                .with_context(|| format!("Failed to open MQTT config file at '{config_file}'"))?;
            info!("Successfully loaded MQTT config from {config_file}: {config:?}");
            let publisher = mqtt::MqttPublisher::new(config)
                .with_context(|| "Failed to create MQTT publisher")?;
            let mut sink = MqttSink { publisher, format };
            poller.run(&mut sink, interval, &running, count)
        }
    };

    info!("Stopped after {cycles} poll cycles, closing transport");
    drop(poller.into_transport());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simple_messages_flatten_record() {
        let value = json!({
            "timestamp": "2024-05-01T12:30:00+02:00",
            "voltage": 53.2,
            "warning": false,
            "cell_3": 3301,
            "ignored": null,
        });
        let mut messages = simple_messages("bms", &value);
        messages.sort();
        assert_eq!(
            messages,
            vec![
                ("bms/cell_3".to_string(), "3301".to_string()),
                (
                    "bms/timestamp".to_string(),
                    "2024-05-01T12:30:00+02:00".to_string()
                ),
                ("bms/voltage".to_string(), "53.2".to_string()),
                ("bms/warning".to_string(), "false".to_string()),
            ]
        );
    }

    #[test]
    fn test_simple_messages_nested() {
        let value = json!({ "a": { "b": [1, 2] } });
        assert_eq!(
            simple_messages("t", &value),
            vec![
                ("t/a/b/0".to_string(), "1".to_string()),
                ("t/a/b/1".to_string(), "2".to_string()),
            ]
        );
    }
}
