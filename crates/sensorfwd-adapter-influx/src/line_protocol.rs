//! InfluxDB line protocol encoding.

use sensorfwd_core::{FieldValue, Record};
use std::fmt::Write;

/// Encode a record as a single line protocol point (no trailing newline).
///
/// Tags with an empty key or value are left out, since the store rejects
/// them, as are tags ending in a backslash, which would escape the separator
/// that follows.
#[must_use]
pub fn encode_record(record: &Record) -> String {
    let mut line = escape_measurement(&record.measurement);

    for (key, value) in &record.tags {
        if !is_encodable_tag(key) || !is_encodable_tag(value) {
            continue;
        }
        line.push(',');
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&escape_key(value));
    }

    line.push(' ');
    let mut first = true;
    for (key, value) in &record.fields {
        if !first {
            line.push(',');
        }
        first = false;
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&encode_field_value(value));
    }

    if let Some(nanos) = record.timestamp.and_then(|ts| ts.timestamp_nanos_opt()) {
        let _ = write!(line, " {nanos}");
    }

    line
}

/// Encode a field value.
fn encode_field_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Float(v) => format!("{v}"),
        FieldValue::Integer(v) => format!("{v}i"),
        FieldValue::String(v) => {
            let mut out = String::with_capacity(v.len() + 2);
            out.push('"');
            for c in v.chars() {
                match c {
                    '"' | '\\' => {
                        out.push('\\');
                        out.push(c);
                    }
                    _ => out.push(c),
                }
            }
            out.push('"');
            out
        }
    }
}

fn is_encodable_tag(s: &str) -> bool {
    !s.is_empty() && !s.ends_with('\\')
}

fn escape_measurement(name: &str) -> String {
    escape(name, &[',', ' '])
}

/// Escape a tag key, tag value or field key.
fn escape_key(key: &str) -> String {
    escape(key, &[',', '=', ' '])
}

fn escape(input: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c == '\n' {
            out.push_str("\\n");
            continue;
        }
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sensorfwd_core::{build_record, coerce, TopicRule, ValueType};

    fn record(rule: &TopicRule, value: FieldValue) -> Record {
        build_record(&rule.topic, rule, value)
    }

    #[test]
    fn encode_float_with_tags() {
        let rule = TopicRule::new("sensors/outside/humidity").with_tag("loc", "outside");
        let line = encode_record(&record(&rule, FieldValue::Float(54.3)));
        assert_eq!(line, "sensors/outside/humidity,loc=outside value=54.3");
    }

    #[test]
    fn encode_integer_and_timestamp() {
        let rule = TopicRule::new("counter");
        let ts = Utc.timestamp_opt(1_700_000_000, 5).unwrap();
        let line = encode_record(&record(&rule, FieldValue::Integer(-3)).with_timestamp(ts));
        assert_eq!(line, "counter value=-3i 1700000000000000005");
    }

    #[test]
    fn encode_string_field_escapes_quotes() {
        let rule = TopicRule::new("door");
        let line = encode_record(&record(&rule, FieldValue::from(r#"say "hi" \ bye"#)));
        assert_eq!(line, r#"door value="say \"hi\" \\ bye""#);
    }

    #[test]
    fn newline_in_fallback_string_is_kept() {
        let rule = TopicRule::new("m").with_value_type(ValueType::Float);
        let value = coerce(b"bad\nreading", rule.value_type).into_value();
        let line = encode_record(&record(&rule, value));
        assert_eq!(line, "m value=\"bad\nreading\"");
    }

    #[test]
    fn tag_with_trailing_backslash_is_left_out() {
        let rule = TopicRule::new("m")
            .with_tag("path", "C:\\")
            .with_tag("dir\\", "x")
            .with_tag("loc", "a\\b");
        let line = encode_record(&record(&rule, FieldValue::Integer(1)));
        assert_eq!(line, "m,loc=a\\b value=1i");
    }

    #[test]
    fn escape_special_characters() {
        let rule = TopicRule::new("living room,1")
            .with_tag("room name", "a=b")
            .with_tag("empty", "");
        let line = encode_record(&record(&rule, FieldValue::Float(1.0)));
        assert_eq!(line, r"living\ room\,1,room\ name=a\=b value=1");
    }

    #[test]
    fn tags_are_sorted_by_key() {
        let rule = TopicRule::new("m").with_tag("z", "1").with_tag("a", "2");
        let line = encode_record(&record(&rule, FieldValue::Float(0.5)));
        assert_eq!(line, "m,a=2,z=1 value=0.5");
    }
}
