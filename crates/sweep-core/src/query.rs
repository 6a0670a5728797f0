//! Query results returned by the registry search.

use crate::types::SearchKey;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One physician row in a search response.
///
/// Rows are opaque apart from their identifier and phone fields, so the
/// full JSON object is kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetailRecord(pub Map<String, Value>);

impl DetailRecord {
    /// Unique identifier under `id_field`, rendered as a string.
    #[must_use]
    pub fn id(&self, id_field: &str) -> Option<String> {
        match self.0.get(id_field)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Borrow a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Replace a field value.
    pub fn set(&mut self, field: &str, value: Value) {
        self.0.insert(field.to_string(), value);
    }

    /// Field names in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Result of one registry query for one key.
///
/// Serialises to the raw record format: the server payload with the
/// searched key attached under `postal_code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Key that was searched
    pub postal_code: SearchKey,
    /// Number of matches, `-1` when the server capped the result
    #[serde(default, deserialize_with = "null_as_default")]
    pub totalcount: i64,
    /// Returned rows
    #[serde(default, deserialize_with = "null_as_default")]
    pub results: Vec<DetailRecord>,
    /// Any other payload fields, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QueryResult {
    /// Build a result from a decoded server payload.
    #[must_use]
    pub fn from_payload(key: SearchKey, mut payload: Map<String, Value>) -> Self {
        let totalcount = payload
            .remove("totalcount")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let results = match payload.remove("results") {
            Some(Value::Array(rows)) => rows
                .into_iter()
                .filter_map(|row| match row {
                    Value::Object(map) => Some(DetailRecord(map)),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        payload.remove("postal_code");

        Self {
            postal_code: key,
            totalcount,
            results,
            extra: payload,
        }
    }

    /// Searched key.
    #[must_use]
    pub fn key(&self) -> &SearchKey {
        &self.postal_code
    }
}

/// Explicit `null` reads as the field's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test payload must be an object"),
        }
    }

    #[test]
    fn test_from_payload_attaches_key() {
        let key = SearchKey::parse("K1A0").expect("valid key");
        let result = QueryResult::from_payload(
            key.clone(),
            payload(json!({
                "totalcount": 2,
                "results": [{"cpsonumber": "1"}, {"cpsonumber": "2"}, "junk"],
                "pagesize": 100
            })),
        );

        assert_eq!(result.key(), &key);
        assert_eq!(result.totalcount, 2);
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.extra.get("pagesize"), Some(&json!(100)));

        let raw = serde_json::to_value(&result).expect("serialize result");
        assert_eq!(raw["postal_code"], json!("K1A0"));
        assert_eq!(raw["pagesize"], json!(100));
    }

    #[test]
    fn test_from_payload_defaults() {
        let key = SearchKey::parse("K1A").expect("valid key");
        let result = QueryResult::from_payload(key, payload(json!({"postal_code": "X"})));
        assert_eq!(result.totalcount, 0);
        assert!(result.results.is_empty());
        assert!(result.extra.is_empty());
    }

    #[test]
    fn test_detail_record_id_rendering() {
        let record = DetailRecord(payload(json!({"cpsonumber": 12345, "name": "A"})));
        assert_eq!(record.id("cpsonumber").as_deref(), Some("12345"));
        assert_eq!(record.id("missing"), None);

        let record = DetailRecord(payload(json!({"cpsonumber": "CPSO-1"})));
        assert_eq!(record.id("cpsonumber").as_deref(), Some("CPSO-1"));
    }

    #[test]
    fn test_record_with_null_fields_deserializes() {
        let result: QueryResult = serde_json::from_str(
            r#"{"postal_code": "K1A+0", "totalcount": null, "results": null, "page": 1}"#,
        )
        .expect("null fields are accepted");
        assert_eq!(result.key().as_str(), "K1A0");
        assert_eq!(result.totalcount, 0);
        assert!(result.results.is_empty());
        assert_eq!(result.extra.get("page"), Some(&json!(1)));

        let result: QueryResult =
            serde_json::from_str(r#"{"postal_code": "K1A0", "totalcount": -1}"#).expect("parse");
        assert_eq!(result.totalcount, -1);
        assert!(result.results.is_empty());
    }
}
