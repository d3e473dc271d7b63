//! # sensorfwd Core
//!
//! Message routing and transformation pipeline for sensorfwd.
//!
//! This crate provides:
//! - The topic rule table that decides which bus topics are forwarded
//! - Payload coercion into typed field values
//! - Record construction (measurement, tags, fields)
//! - The `Sink` interface and fan-out dispatch with per-sink failure isolation
//! - The `Forwarder` that drives the pipeline from a stream of bus events
//!
//! ## Pipeline
//!
//! `bus event -> rule lookup -> coercion -> record -> every registered sink`
//!
//! Topics without a rule are dropped silently. Nothing inside the pipeline
//! can abort the process: coercion failures fall back to the raw payload and
//! sink failures are logged and contained.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coerce;
pub mod dispatch;
pub mod forwarder;
pub mod record;
pub mod rules;
pub mod sink;

pub use coerce::{coerce, Coercion};
pub use dispatch::Dispatcher;
pub use forwarder::{BusEvent, Forwarder};
pub use record::{build_record, FieldValue, Record, VALUE_FIELD};
pub use rules::{ConfigError, RuleTable, TopicRule, ValueType};
pub use sink::{LogSink, Sink, SinkError};
