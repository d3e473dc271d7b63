//! # MQTT Adapter
//!
//! Bus listener that turns MQTT publishes into [`sensorfwd_core::BusEvent`]s.
//!
//! ## Subscriptions
//!
//! One wildcard subscription is made per configured node: `{node}/#`.
//! Every topic below a node is delivered; the rule table decides which ones
//! are forwarded.
//!
//! The listener owns the connection lifecycle. It reconnects after transport
//! errors and re-subscribes on every new session, so the consumer only sees
//! an event stream that pauses and resumes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod listener;
pub mod topics;

pub use listener::{
    parse_broker_url, BusListener, BusListenerConfig, ConnectionState, SubscriberError,
};
pub use topics::{node_wildcard, validate_node};
