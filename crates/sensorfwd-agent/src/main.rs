//! # sensorfwd Agent
//!
//! Forwards sensor readings from an MQTT broker to InfluxDB.
//!
//! ## Architecture
//!
//! 1. **Listener**: subscribes to `{node}/#` for every configured node and
//!    reconnects on its own after transport errors
//! 2. **Forwarder**: looks up the rule for each topic, coerces the payload and
//!    builds a record
//! 3. **Sinks**: each record is written to every enabled sink (InfluxDB, log)
//!
//! Exit status is non-zero if the rules fail to load or the broker cannot be
//! reached at startup.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod runtime;

pub use config::AgentConfig;
pub use runtime::Agent;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting sensorfwd agent");

    // Load configuration
    let config = AgentConfig::from_env()?;

    let agent = Agent::new(config).await?;

    // Run agent
    agent.run().await?;

    Ok(())
}
