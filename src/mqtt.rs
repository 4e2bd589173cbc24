use anyhow::{bail, Context, Result};
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct MqttConfig {
    host: String,
    #[serde(default = "MqttConfig::default_port")]
    port: u16,
    username: Option<String>,
    password: Option<String>,
    #[serde(default = "MqttConfig::default_topic")]
    topic: String,
    #[serde(default = "MqttConfig::default_qos")]
    qos: u8,
    #[serde(default = "MqttConfig::default_client_id")]
    client_id: String,
    #[serde(
        default = "MqttConfig::default_keep_alive_interval",
        with = "humantime_serde"
    )]
    keep_alive_interval: Duration,
    #[serde(
        default = "MqttConfig::default_reconnect_interval",
        with = "humantime_serde"
    )]
    reconnect_interval: Duration,
    #[serde(default = "MqttConfig::default_channel_capacity")]
    channel_capacity: usize,
}

impl MqttConfig {
    fn default_port() -> u16 {
        1883
    }

    fn default_topic() -> String {
        "qdbms".into()
    }

    fn default_qos() -> u8 {
        0
    }

    fn generate_random_string(len: usize) -> String {
        use rand::distributions::Alphanumeric;
        use rand::Rng;

        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    fn default_client_id() -> String {
        format!("qdbms-{}", Self::generate_random_string(8))
    }

    fn default_keep_alive_interval() -> Duration {
        Duration::from_secs(30)
    }

    fn default_reconnect_interval() -> Duration {
        Duration::from_secs(5)
    }

    fn default_channel_capacity() -> usize {
        64
    }

    pub const DEFAULT_CONFIG_FILE: &str = "mqtt.yaml";

    pub fn load(config_file_path: &str) -> Result<Self> {
        log::debug!("Loading config file from {config_file_path:?}");
        let config_file = std::fs::File::open(config_file_path)
            .with_context(|| format!("Cannot open MQTT config file {config_file_path:?}"))?;
        let config: Self = serde_yaml::from_reader(&config_file)
            .with_context(|| format!("Cannot read MQTT config from file: {config_file_path:?}"))?;
        Ok(config)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn qos(&self) -> Result<QoS> {
        Ok(match self.qos {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            other => bail!("Invalid MQTT QoS {other}, expected 0, 1 or 2"),
        })
    }

    pub fn create_client(&self) -> Result<(Client, Connection)> {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options
            .set_keep_alive(self.keep_alive_interval)
            .set_clean_session(true);
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => {
                options.set_credentials(username, password);
            }
            (Some(username), None) => {
                options.set_credentials(username, "");
            }
            (None, Some(_)) => bail!("MQTT password given without username"),
            (None, None) => {}
        }

        log::info!(
            "Connecting to MQTT broker: {}:{} with client_id: {}",
            self.host,
            self.port,
            self.client_id
        );
        Ok(Client::new(options, self.channel_capacity))
    }
}

/// Publishes on a `rumqttc` client whose connection is driven by a background thread.
pub struct MqttPublisher {
    client: Client,
    config: MqttConfig,
    qos: QoS,
}

impl MqttPublisher {
    pub fn new(config: MqttConfig) -> Result<Self> {
        let qos = config.qos()?;
        let (client, connection) = config.create_client()?;
        let reconnect_interval = config.reconnect_interval;
        std::thread::Builder::new()
            .name("mqtt-event-loop".into())
            .spawn(move || drive_connection(connection, reconnect_interval))
            .with_context(|| "Cannot spawn MQTT event loop")?;
        Ok(Self {
            client,
            config,
            qos,
        })
    }

    pub fn topic(&self) -> &str {
        self.config.topic()
    }

    /// Queue a message; delivery happens on the event loop thread.
    pub fn publish(&mut self, topic: &str, payload: &str) -> Result<()> {
        log::debug!(
            "Publishing to MQTT: Topic='{}', Payload='{payload}', QoS={:?}",
            topic,
            self.qos
        );

        self.client
            .try_publish(topic, self.qos, false, payload.as_bytes().to_vec())
            .with_context(|| format!("Failed to publish message to MQTT topic: {}", topic))?;

        Ok(())
    }
}

fn drive_connection(mut connection: Connection, reconnect_interval: Duration) {
    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(_))) => log::info!("Connected to MQTT broker."),
            Ok(event) => log::trace!("MQTT event: {event:?}"),
            Err(e) => {
                log::warn!("MQTT connection error: {e}, retrying in {reconnect_interval:?}");
                std::thread::sleep(reconnect_interval);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_minimal_config() {
        let file = write_config("host: broker.local\n");
        let config = MqttConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.host, "broker.local");
        assert_eq!(config.port, 1883);
        assert_eq!(config.topic(), "qdbms");
        assert_eq!(config.qos().unwrap(), QoS::AtMostOnce);
        assert!(config.client_id.starts_with("qdbms-"));
        assert_eq!(config.client_id.len(), "qdbms-".len() + 8);
        assert_eq!(config.keep_alive_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_load_full_config() {
        let file = write_config(
            "host: 10.0.0.2\nport: 8883\nusername: bms\npassword: secret\ntopic: home/battery\nqos: 1\nclient_id: rack-1\nkeep_alive_interval: 1m\n",
        );
        let config = MqttConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.port, 8883);
        assert_eq!(config.username.as_deref(), Some("bms"));
        assert_eq!(config.topic(), "home/battery");
        assert_eq!(config.qos().unwrap(), QoS::AtLeastOnce);
        assert_eq!(config.client_id, "rack-1");
        assert_eq!(config.keep_alive_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_qos() {
        let file = write_config("host: broker.local\nqos: 3\n");
        let config = MqttConfig::load(file.path().to_str().unwrap()).unwrap();
        assert!(config.qos().is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(MqttConfig::load("/nonexistent/mqtt.yaml").is_err());
    }
}
