//! Flat field responses and tolerant typed decoding
//!
//! Responses are stored flat: one `(field, group, value)` triple per
//! answered field, values serialized as strings. Typed interpretation
//! happens at read time and never fails — malformed historical data
//! falls back to the raw string rather than blocking rendering.

use crate::{DuplicateGroupId, FieldId, FieldType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ── Request Identifier ───────────────────────────────────────────────

/// Unique identifier for a submitted request
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Response ─────────────────────────────────────────────────────────

/// One recorded field answer.
///
/// For a field in a non-duplicatable section `group` is always `None`;
/// for a duplicatable section every response carries the group id of
/// exactly one live section instance.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Response {
    /// The answered field
    pub field_id: FieldId,
    /// The section instance this answer belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<DuplicateGroupId>,
    /// The serialized value
    pub value: String,
}

impl Response {
    /// Create a response for an original section instance
    pub fn new(field_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field_id: FieldId::new(field_id),
            group: None,
            value: value.into(),
        }
    }

    /// Create a response for a duplicate section instance
    pub fn in_group(
        field_id: impl Into<String>,
        group: DuplicateGroupId,
        value: impl Into<String>,
    ) -> Self {
        Self {
            field_id: FieldId::new(field_id),
            group: Some(group),
            value: value.into(),
        }
    }
}

// ── Typed Values ─────────────────────────────────────────────────────

/// A typed view of a serialized response value.
///
/// Decoding is tolerant by design: a value that does not parse as its
/// field's declared type is kept as [`FieldValue::Text`] so that old or
/// hand-migrated data still renders.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Plain text, or the raw fallback for unparseable typed values
    Text(String),
    /// A parsed numeric value
    Number(f64),
    /// A parsed calendar date
    Date(NaiveDate),
    /// A parsed boolean toggle
    Switch(bool),
    /// A file attachment reference (opaque to the core)
    FileRef(String),
}

impl FieldValue {
    /// Decode a serialized value according to its field type.
    ///
    /// Never fails: parse failures fall back to `Text` with the raw
    /// input preserved.
    pub fn decode(field_type: FieldType, raw: &str) -> Self {
        match field_type {
            FieldType::Number => match raw.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => Self::Number(n),
                _ => Self::Text(raw.to_string()),
            },
            FieldType::Date => match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
                Ok(d) => Self::Date(d),
                Err(_) => Self::Text(raw.to_string()),
            },
            FieldType::Switch => match raw.trim() {
                "true" | "1" => Self::Switch(true),
                "false" | "0" => Self::Switch(false),
                _ => Self::Text(raw.to_string()),
            },
            FieldType::File => Self::FileRef(raw.to_string()),
            _ => Self::Text(raw.to_string()),
        }
    }

    /// Serialize back to the stored string form
    pub fn encode(&self) -> String {
        match self {
            Self::Text(s) | Self::FileRef(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Switch(b) => b.to_string(),
        }
    }

    /// Check if this value decoded to its field's declared type
    pub fn is_typed(&self) -> bool {
        !matches!(self, Self::Text(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_number() {
        assert_eq!(
            FieldValue::decode(FieldType::Number, "42.5"),
            FieldValue::Number(42.5)
        );
        assert_eq!(
            FieldValue::decode(FieldType::Number, " 10 "),
            FieldValue::Number(10.0)
        );
    }

    #[test]
    fn test_decode_number_fallback() {
        let v = FieldValue::decode(FieldType::Number, "ten-ish");
        assert_eq!(v, FieldValue::Text("ten-ish".into()));
        assert!(!v.is_typed());

        // Infinity is not a storable amount
        let v = FieldValue::decode(FieldType::Number, "inf");
        assert!(!v.is_typed());
    }

    #[test]
    fn test_decode_date() {
        let v = FieldValue::decode(FieldType::Date, "2024-03-01");
        assert_eq!(
            v,
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(v.encode(), "2024-03-01");

        let bad = FieldValue::decode(FieldType::Date, "03/01/2024");
        assert_eq!(bad, FieldValue::Text("03/01/2024".into()));
    }

    #[test]
    fn test_decode_switch() {
        assert_eq!(
            FieldValue::decode(FieldType::Switch, "true"),
            FieldValue::Switch(true)
        );
        assert_eq!(
            FieldValue::decode(FieldType::Switch, "0"),
            FieldValue::Switch(false)
        );
        assert_eq!(
            FieldValue::decode(FieldType::Switch, "yes"),
            FieldValue::Text("yes".into())
        );
    }

    #[test]
    fn test_decode_text_and_file() {
        assert_eq!(
            FieldValue::decode(FieldType::ShortText, "hello"),
            FieldValue::Text("hello".into())
        );
        assert_eq!(
            FieldValue::decode(FieldType::File, "blob://abc"),
            FieldValue::FileRef("blob://abc".into())
        );
    }

    #[test]
    fn test_encode_round_trip() {
        for (ty, raw) in [
            (FieldType::Number, "5"),
            (FieldType::Number, "5.5"),
            (FieldType::Date, "2023-12-31"),
            (FieldType::Switch, "true"),
            (FieldType::ShortText, "free text"),
        ] {
            assert_eq!(FieldValue::decode(ty, raw).encode(), raw);
        }
    }

    #[test]
    fn test_response_constructors() {
        let r = Response::new("title", "Buy bolts");
        assert!(r.group.is_none());

        let g = DuplicateGroupId::generate();
        let r = Response::in_group("amount", g.clone(), "5");
        assert_eq!(r.group, Some(g));
    }
}
