//! Payload coercion.
//!
//! Coercion never drops a reading: when the payload does not match the
//! declared type the raw text is kept and forwarded as a string.

use crate::record::FieldValue;
use crate::rules::ValueType;

/// Outcome of coercing a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Coercion {
    /// Payload matched the declared type
    Coerced(FieldValue),
    /// Payload did not match; `raw` is forwarded instead
    Failed {
        /// Payload as text
        raw: String,
        /// Why the payload did not match
        reason: String,
    },
}

impl Coercion {
    /// Whether the payload matched its declared type.
    #[must_use]
    pub fn is_coerced(&self) -> bool {
        matches!(self, Self::Coerced(_))
    }

    /// The value to emit: the coerced value, or the raw text on failure.
    #[must_use]
    pub fn into_value(self) -> FieldValue {
        match self {
            Self::Coerced(value) => value,
            Self::Failed { raw, .. } => FieldValue::String(raw),
        }
    }
}

/// Coerce a raw payload to its declared type.
///
/// A missing declared type is treated as [`ValueType::String`].
#[must_use]
pub fn coerce(payload: &[u8], declared: Option<ValueType>) -> Coercion {
    let raw = String::from_utf8_lossy(payload).into_owned();
    let text = raw.trim();

    match declared.unwrap_or(ValueType::String) {
        ValueType::String => Coercion::Coerced(FieldValue::String(raw)),
        ValueType::Float => match text.parse::<f64>() {
            Ok(v) if v.is_finite() => Coercion::Coerced(FieldValue::Float(v)),
            Ok(v) => Coercion::Failed {
                reason: format!("non-finite float {v}"),
                raw,
            },
            Err(e) => Coercion::Failed {
                reason: e.to_string(),
                raw,
            },
        },
        ValueType::Integer => match text.parse::<i64>() {
            Ok(v) => Coercion::Coerced(FieldValue::Integer(v)),
            Err(e) => Coercion::Failed {
                reason: e.to_string(),
                raw,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_parses() {
        let outcome = coerce(b"54.3", Some(ValueType::Float));
        assert_eq!(outcome, Coercion::Coerced(FieldValue::Float(54.3)));
    }

    #[test]
    fn float_tolerates_surrounding_whitespace() {
        let outcome = coerce(b" -1.5e2\n", Some(ValueType::Float));
        assert_eq!(outcome.into_value(), FieldValue::Float(-150.0));
    }

    #[test]
    fn float_failure_keeps_raw_payload() {
        let outcome = coerce(b"not-a-number", Some(ValueType::Float));
        assert!(!outcome.is_coerced());
        assert_eq!(
            outcome.into_value(),
            FieldValue::String("not-a-number".to_string())
        );
    }

    #[test]
    fn non_finite_float_is_a_failure() {
        for payload in [&b"NaN"[..], b"inf", b"-infinity"] {
            let outcome = coerce(payload, Some(ValueType::Float));
            assert!(!outcome.is_coerced());
        }
    }

    #[test]
    fn integer_parses() {
        assert_eq!(
            coerce(b"+42", Some(ValueType::Integer)).into_value(),
            FieldValue::Integer(42)
        );
        assert_eq!(
            coerce(b"-7\r\n", Some(ValueType::Integer)).into_value(),
            FieldValue::Integer(-7)
        );
    }

    #[test]
    fn integer_failure_keeps_raw_payload() {
        let outcome = coerce(b"4.5", Some(ValueType::Integer));
        assert_eq!(outcome.into_value(), FieldValue::String("4.5".to_string()));

        let outcome = coerce(b"99999999999999999999", Some(ValueType::Integer));
        assert!(!outcome.is_coerced());
    }

    #[test]
    fn string_always_succeeds() {
        let outcome = coerce(b" open ", Some(ValueType::String));
        assert_eq!(outcome, Coercion::Coerced(FieldValue::String(" open ".to_string())));
    }

    #[test]
    fn missing_type_is_string() {
        assert_eq!(
            coerce(b"12", None).into_value(),
            FieldValue::String("12".to_string())
        );
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let outcome = coerce(&[0x31, 0xff], Some(ValueType::Float));
        assert_eq!(
            outcome.into_value(),
            FieldValue::String("1\u{fffd}".to_string())
        );
    }
}
