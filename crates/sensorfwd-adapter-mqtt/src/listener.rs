//! MQTT listener producing bus events.

use crate::topics::{node_wildcard, validate_node};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeReasonCode};
use sensorfwd_core::BusEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

/// Configuration for the bus listener.
#[derive(Debug, Clone)]
pub struct BusListenerConfig {
    /// MQTT broker URL (e.g., <tcp://localhost:1883>)
    pub mqtt_broker: String,
    /// Client ID for MQTT connection
    pub client_id: String,
    /// Nodes to subscribe to, one `{node}/#` subscription each
    pub nodes: Vec<String>,
    /// Keep-alive interval
    pub keep_alive: Duration,
    /// Pause between reconnection attempts
    pub reconnect_delay: Duration,
    /// Bound on establishing the initial connection
    pub connect_timeout: Duration,
    /// Capacity of the event channel handed to the consumer
    pub channel_capacity: usize,
}

impl Default for BusListenerConfig {
    fn default() -> Self {
        Self {
            mqtt_broker: "tcp://localhost:1883".to_string(),
            client_id: "sensorfwd".to_string(),
            nodes: vec!["sensors".to_string()],
            keep_alive: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            channel_capacity: 100,
        }
    }
}

/// Connection state of the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session with the broker
    Disconnected,
    /// Session established and subscriptions requested
    Connected,
}

/// MQTT listener for sensor readings.
pub struct BusListener {
    client: AsyncClient,
    eventloop: EventLoop,
    config: BusListenerConfig,
    state: ConnectionState,
}

impl BusListener {
    /// Create a new listener. No connection is made until [`BusListener::connect`].
    ///
    /// # Errors
    ///
    /// Returns error if the broker URL or a node name is invalid, or no node is configured.
    pub fn new(config: BusListenerConfig) -> Result<Self, SubscriberError> {
        let (host, port) = parse_broker_url(&config.mqtt_broker)?;

        if config.nodes.is_empty() {
            return Err(SubscriberError::NoNodes);
        }
        for node in &config.nodes {
            validate_node(node).map_err(|e| SubscriberError::InvalidNode(e.to_string()))?;
        }

        let mut mqtt_options = MqttOptions::new(&config.client_id, host, port);
        mqtt_options.set_keep_alive(config.keep_alive);

        let (client, eventloop) = AsyncClient::new(mqtt_options, config.channel_capacity);

        Ok(Self {
            client,
            eventloop,
            config,
            state: ConnectionState::Disconnected,
        })
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Establish the initial connection and subscribe to every node.
    ///
    /// # Errors
    ///
    /// Returns error if the broker cannot be reached or refuses the
    /// connection within the connect timeout.
    pub async fn connect(&mut self) -> Result<(), SubscriberError> {
        tracing::info!(broker = %self.config.mqtt_broker, "Connecting to MQTT broker");

        let connect_timeout = self.config.connect_timeout;
        tokio::time::timeout(connect_timeout, self.await_connack())
            .await
            .map_err(|_| {
                SubscriberError::Connection(format!(
                    "no CONNACK within {connect_timeout:?}"
                ))
            })??;

        self.set_state(ConnectionState::Connected);
        self.subscribe_all()
    }

    async fn await_connack(&mut self) -> Result<(), SubscriberError> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(SubscriberError::Connection(e.to_string())),
            }
        }
    }

    /// Request a wildcard subscription for every node.
    fn subscribe_all(&self) -> Result<(), SubscriberError> {
        for node in &self.config.nodes {
            let topic = node_wildcard(node);

            tracing::info!(topic, node, "Subscribing to node topics");

            self.client
                .try_subscribe(&topic, QoS::AtMostOnce)
                .map_err(|e| SubscriberError::Subscribe(e.to_string()))?;
        }
        Ok(())
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::info!(from = ?self.state, to = ?state, "MQTT connection state changed");
            self.state = state;
        }
    }

    /// Start receiving events.
    ///
    /// Returns a channel receiver for incoming messages. The background task
    /// reconnects after errors and stops when the receiver is dropped.
    pub fn start(mut self) -> mpsc::Receiver<BusEvent> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);

        tokio::spawn(async move {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let event = BusEvent::new(publish.topic.clone(), publish.payload.to_vec());

                        tracing::debug!(
                            topic = %event.topic,
                            payload_len = event.payload.len(),
                            "Received MQTT message"
                        );

                        if tx.send(event).await.is_err() {
                            tracing::warn!("Event receiver dropped, stopping listener");
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        self.set_state(ConnectionState::Connected);
                        if let Err(err) = self.subscribe_all() {
                            tracing::error!(error = %err, "Failed to re-subscribe after reconnect");
                        }
                    }
                    Ok(Event::Incoming(Packet::SubAck(ack))) => {
                        if ack
                            .return_codes
                            .iter()
                            .any(|code| matches!(code, SubscribeReasonCode::Failure))
                        {
                            tracing::warn!(pkid = ack.pkid, "Subscription rejected by broker");
                        } else {
                            tracing::info!(pkid = ack.pkid, "Subscription acknowledged");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        self.set_state(ConnectionState::Disconnected);
                        tracing::error!(error = %e, "MQTT error");
                        // Try to reconnect after a delay
                        tokio::time::sleep(self.config.reconnect_delay).await;
                    }
                }
            }
        });

        rx
    }
}

/// Parse an MQTT broker URL (`tcp://`, `mqtt://` or bare `host[:port]`) into
/// host and port. The port defaults to 1883.
///
/// # Errors
///
/// Returns error on an unsupported scheme, a missing host or a bad port.
pub fn parse_broker_url(input: &str) -> Result<(String, u16), SubscriberError> {
    if input.contains("://") {
        let url =
            Url::parse(input).map_err(|e| SubscriberError::InvalidUrl(format!("{input}: {e}")))?;

        match url.scheme() {
            "tcp" | "mqtt" => {}
            scheme => {
                return Err(SubscriberError::InvalidUrl(format!(
                    "{input}: unsupported scheme '{scheme}'"
                )));
            }
        }

        let host = url
            .host_str()
            .ok_or_else(|| SubscriberError::InvalidUrl(format!("{input}: missing host")))?;
        let port = url.port().unwrap_or(1883);

        return Ok((host.to_string(), port));
    }

    let mut parts = input.split(':');
    let host = parts
        .next()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| SubscriberError::InvalidUrl(format!("{input}: missing host")))?;
    let port = match parts.next() {
        None => 1883,
        Some(port) => port
            .parse()
            .map_err(|_| SubscriberError::InvalidUrl(format!("{input}: invalid port '{port}'")))?,
    };
    if parts.next().is_some() {
        return Err(SubscriberError::InvalidUrl(format!(
            "{input}: too many ':' separators"
        )));
    }

    Ok((host.to_string(), port))
}

/// Errors that can occur with the listener.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubscriberError {
    /// Invalid MQTT URL
    #[error("invalid MQTT URL: {0}")]
    InvalidUrl(String),
    /// Invalid node name
    #[error("{0}")]
    InvalidNode(String),
    /// No node to subscribe to
    #[error("no nodes configured to subscribe to")]
    NoNodes,
    /// Subscription failed
    #[error("subscription error: {0}")]
    Subscribe(String),
    /// Connection error
    #[error("connection error: {0}")]
    Connection(String),
}
