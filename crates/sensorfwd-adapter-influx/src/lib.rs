//! # InfluxDB Adapter
//!
//! Sink that writes records to an InfluxDB 1.x server over its HTTP API.
//!
//! ## Encoding Rules (InfluxDB line protocol)
//!
//! - **Measurement**: commas and spaces escaped
//! - **Tag keys, tag values, field keys**: commas, equals signs and spaces escaped
//! - **String field values**: double-quoted, with `"` and `\` escaped
//! - **Integers**: suffixed with `i`
//! - **Timestamp**: nanoseconds since the Unix epoch, omitted when unknown

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod line_protocol;
pub mod sink;

pub use line_protocol::encode_record;
pub use sink::{InfluxSink, InfluxSinkConfig};
