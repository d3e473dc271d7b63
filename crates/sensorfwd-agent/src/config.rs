//! Agent configuration.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// MQTT configuration
    pub mqtt: MqttConfig,

    /// InfluxDB configuration
    pub influx: InfluxConfig,

    /// Path of the topic rules file
    pub rules_path: PathBuf,

    /// Also write every record to the log
    pub log_sink: bool,

    /// Bound on a single sink write
    pub write_timeout: Duration,
}

/// MQTT configuration.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// MQTT broker URL
    pub broker: String,

    /// Client identifier
    pub client_id: String,

    /// Nodes to subscribe to
    pub nodes: Vec<String>,
}

/// InfluxDB configuration.
#[derive(Debug, Clone)]
pub struct InfluxConfig {
    /// Write to InfluxDB
    pub enabled: bool,

    /// Server URL
    pub url: String,

    /// Username
    pub username: Option<String>,

    /// File holding the password
    pub password_file: Option<PathBuf>,

    /// Target database
    pub database: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig {
                broker: "tcp://localhost:1883".to_string(),
                client_id: format!("sensorfwd-{}", Uuid::new_v4()),
                nodes: vec!["sensors".to_string()],
            },
            influx: InfluxConfig {
                enabled: true,
                url: "http://localhost:8086".to_string(),
                username: None,
                password_file: None,
                database: "sensors".to_string(),
            },
            rules_path: PathBuf::from("./rules.json"),
            log_sink: false,
            write_timeout: Duration::from_secs(5),
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SENSORFWD_MQTT_BROKER`: MQTT broker URL
    /// - `SENSORFWD_MQTT_CLIENT_ID`: MQTT client identifier
    /// - `SENSORFWD_NODES`: Comma-separated nodes to subscribe to
    /// - `SENSORFWD_RULES_PATH`: Topic rules file (JSON)
    /// - `SENSORFWD_INFLUX_ENABLED`: "true" or "false"
    /// - `SENSORFWD_INFLUX_URL`: InfluxDB URL
    /// - `SENSORFWD_INFLUX_USERNAME`: InfluxDB username
    /// - `SENSORFWD_INFLUX_PASSWORD_FILE`: File holding the InfluxDB password
    /// - `SENSORFWD_INFLUX_DATABASE`: Target database
    /// - `SENSORFWD_LOG_SINK`: "true" to log every record
    /// - `SENSORFWD_WRITE_TIMEOUT_SECS`: Per-write timeout in seconds
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an invalid value or no sink is enabled.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(broker) = lookup("SENSORFWD_MQTT_BROKER") {
            config.mqtt.broker = broker;
        }

        if let Some(client_id) = lookup("SENSORFWD_MQTT_CLIENT_ID") {
            config.mqtt.client_id = client_id;
        }

        if let Some(nodes) = lookup("SENSORFWD_NODES") {
            config.mqtt.nodes = nodes
                .split(',')
                .map(str::trim)
                .filter(|node| !node.is_empty())
                .map(ToString::to_string)
                .collect();
        }

        if let Some(path) = lookup("SENSORFWD_RULES_PATH") {
            config.rules_path = PathBuf::from(path);
        }

        if let Some(enabled) = lookup("SENSORFWD_INFLUX_ENABLED") {
            config.influx.enabled =
                parse_bool(&enabled).context("Invalid SENSORFWD_INFLUX_ENABLED")?;
        }

        if let Some(url) = lookup("SENSORFWD_INFLUX_URL") {
            config.influx.url = url;
        }

        if let Some(username) = lookup("SENSORFWD_INFLUX_USERNAME") {
            config.influx.username = Some(username);
        }

        if let Some(path) = lookup("SENSORFWD_INFLUX_PASSWORD_FILE") {
            config.influx.password_file = Some(PathBuf::from(path));
        }

        if let Some(database) = lookup("SENSORFWD_INFLUX_DATABASE") {
            config.influx.database = database;
        }

        if let Some(log_sink) = lookup("SENSORFWD_LOG_SINK") {
            config.log_sink = parse_bool(&log_sink).context("Invalid SENSORFWD_LOG_SINK")?;
        }

        if let Some(secs) = lookup("SENSORFWD_WRITE_TIMEOUT_SECS") {
            let secs =
                u64::from_str(secs.trim()).context("Invalid SENSORFWD_WRITE_TIMEOUT_SECS")?;
            if secs == 0 {
                bail!("SENSORFWD_WRITE_TIMEOUT_SECS must be greater than zero");
            }
            config.write_timeout = Duration::from_secs(secs);
        }

        if !config.influx.enabled && !config.log_sink {
            bail!("No sink enabled; enable SENSORFWD_INFLUX_ENABLED or SENSORFWD_LOG_SINK");
        }

        Ok(config)
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got '{other}'"),
    }
}
