//! Agent runtime orchestration.

use crate::config::AgentConfig;
use anyhow::{Context, Result};
use sensorfwd_adapter_influx::{InfluxSink, InfluxSinkConfig};
use sensorfwd_adapter_mqtt::{BusListener, BusListenerConfig};
use sensorfwd_core::{Dispatcher, Forwarder, LogSink, RuleTable};
use std::sync::Arc;

/// The main agent runtime.
pub struct Agent {
    forwarder: Forwarder,
    listener: BusListener,
}

impl Agent {
    /// Create a new agent: load rules, create sinks and the bus listener.
    ///
    /// # Errors
    ///
    /// Returns error if no rule can be loaded or a sink or the listener
    /// cannot be created.
    pub async fn new(config: AgentConfig) -> Result<Self> {
        let rules = RuleTable::from_path(&config.rules_path)
            .and_then(RuleTable::require_non_empty)
            .with_context(|| {
                format!("Failed to load rules from {}", config.rules_path.display())
            })?;

        for topic in rules.topics() {
            tracing::debug!(topic, "Forwarding topic");
        }
        tracing::info!(rules = rules.len(), "Topic rules loaded");

        let mut dispatcher = Dispatcher::new(config.write_timeout);

        if config.influx.enabled {
            let sink = InfluxSink::connect(InfluxSinkConfig {
                base_url: config.influx.url.clone(),
                database: config.influx.database.clone(),
                username: config.influx.username.clone(),
                password_file: config.influx.password_file.clone(),
                timeout: config.write_timeout,
            })
            .await
            .context("Failed to create InfluxDB sink")?;
            dispatcher.register(Box::new(sink));
        }

        if config.log_sink {
            dispatcher.register(Box::new(LogSink::new()));
        }

        let listener = BusListener::new(BusListenerConfig {
            mqtt_broker: config.mqtt.broker.clone(),
            client_id: config.mqtt.client_id.clone(),
            nodes: config.mqtt.nodes.clone(),
            ..BusListenerConfig::default()
        })
        .context("Failed to create MQTT listener")?;

        Ok(Self {
            forwarder: Forwarder::new(Arc::new(rules), dispatcher),
            listener,
        })
    }

    /// Run the agent's main loop.
    ///
    /// # Errors
    ///
    /// Returns error if the initial connection to the broker fails.
    pub async fn run(self) -> Result<()> {
        let Self {
            forwarder,
            mut listener,
        } = self;

        listener
            .connect()
            .await
            .context("Failed to connect to MQTT broker")?;

        let mut events = listener.start();

        tracing::info!("Agent running, press Ctrl+C to stop");

        tokio::select! {
            () = forwarder.run(&mut events) => {
                tracing::warn!("MQTT listener stopped");
            }

            // Handle shutdown
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
            }
        }

        tracing::info!("Agent stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn config_with_rules(rules: &str) -> (AgentConfig, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(rules.as_bytes()).unwrap();

        let mut config = AgentConfig::default();
        config.rules_path = file.path().to_path_buf();
        config.influx.enabled = false;
        config.log_sink = true;
        (config, file)
    }

    #[tokio::test]
    async fn missing_rules_file_is_fatal() {
        let mut config = AgentConfig::default();
        config.rules_path = PathBuf::from("/nonexistent/rules.json");

        assert!(Agent::new(config).await.is_err());
    }

    #[tokio::test]
    async fn empty_rules_are_fatal() {
        let (config, _file) = config_with_rules(r#"{"sensors/#": {"type": "float"}}"#);

        let err = Agent::new(config).await.err().unwrap();
        assert!(format!("{err:#}").contains("no topic rules configured"));
    }

    #[tokio::test]
    async fn agent_builds_with_rules() {
        let (config, _file) =
            config_with_rules(r#"{"sensors/outside/humidity": {"type": "float"}}"#);

        let agent = Agent::new(config).await.unwrap();
        assert_eq!(agent.forwarder.rules().len(), 1);
    }
}
