//! Queue message envelope: `{"data": <payload>}`.

use std::fmt;

use serde_json::Value;

use super::params::{Parameters, parse_params};
use crate::error::ConsumerError;

/// Decoded message body.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    payload: Payload,
}

impl Envelope {
    /// UTF-8 → JSON object → `data` field. Anything else is a malformed envelope.
    pub fn decode(body: &[u8]) -> Result<Self, ConsumerError> {
        let text = std::str::from_utf8(body)
            .map_err(|e| ConsumerError::MalformedEnvelope(format!("utf-8 decode: {e}")))?;
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ConsumerError::MalformedEnvelope(format!("json decode: {e}")))?;
        let Value::Object(mut object) = value else {
            return Err(ConsumerError::MalformedEnvelope(
                "envelope is not a JSON object".to_string(),
            ));
        };
        let data = object
            .remove("data")
            .ok_or_else(|| ConsumerError::MalformedEnvelope("missing field `data`".to_string()))?;
        Ok(Self {
            payload: Payload::new(data),
        })
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

}

/// What a task expects to find in `data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// JSON array, one element per record.
    Records,
    /// `key=value` string.
    Params,
}

impl fmt::Display for PayloadShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Records => f.write_str("a record list"),
            Self::Params => f.write_str("a parameter string"),
        }
    }
}

/// Business payload carried in `data`.
///
/// Its shape depends on the task: batch handlers read it as an ordered list
/// of records, others as a `key=value` parameter string.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload(Value);

impl Payload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn records(&self) -> Option<&[Value]> {
        self.0.as_array().map(Vec::as_slice)
    }

    pub fn params(&self) -> Option<Parameters> {
        self.0.as_str().map(parse_params)
    }

    /// A wrong shape is reported as a malformed envelope.
    pub fn check_shape(&self, shape: PayloadShape) -> Result<(), ConsumerError> {
        let matches = match shape {
            PayloadShape::Records => self.0.is_array(),
            PayloadShape::Params => self.0.is_string(),
        };
        if matches {
            Ok(())
        } else {
            Err(ConsumerError::MalformedEnvelope(format!("`data` is not {shape}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_record_list() {
        let env = Envelope::decode(br#"{"data": [{"sku": "A"}, {"sku": "B"}]}"#).unwrap();
        let records = env.payload().records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], json!({"sku": "B"}));
    }

    #[test]
    fn decodes_param_string() {
        let env = Envelope::decode(br#"{"data": "date=2024-07-23 shop=7"}"#).unwrap();
        let params = env.payload().params().unwrap();
        assert_eq!(params.get("shop").map(String::as_str), Some("7"));
        assert!(env.payload().records().is_none());
    }

    #[test]
    fn extra_fields_are_ignored() {
        let env = Envelope::decode(br#"{"data": [], "trace": "x"}"#).unwrap();
        assert_eq!(env.payload().records().map(<[Value]>::len), Some(0));
    }

    #[test]
    fn rejects_invalid_utf8() {
        let err = Envelope::decode(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, ConsumerError::MalformedEnvelope(msg) if msg.contains("utf-8")));
    }

    #[test]
    fn rejects_invalid_json() {
        let err = Envelope::decode(b"{data: nope").unwrap_err();
        assert!(matches!(err, ConsumerError::MalformedEnvelope(msg) if msg.contains("json")));
    }

    #[test]
    fn rejects_non_object() {
        let err = Envelope::decode(b"[1, 2]").unwrap_err();
        assert!(matches!(err, ConsumerError::MalformedEnvelope(_)));
    }

    #[test]
    fn shape_check_accepts_matching_data() {
        let records = Payload::new(json!([{"sku": "A"}]));
        let params = Payload::new(json!("shop=7"));
        assert!(records.check_shape(PayloadShape::Records).is_ok());
        assert!(params.check_shape(PayloadShape::Params).is_ok());
    }

    #[test]
    fn shape_check_names_the_expected_shape() {
        let err = Payload::new(json!({"sku": "A"}))
            .check_shape(PayloadShape::Records)
            .unwrap_err();
        assert!(
            matches!(err, ConsumerError::MalformedEnvelope(msg) if msg == "`data` is not a record list")
        );

        let err = Payload::new(json!([1])).check_shape(PayloadShape::Params).unwrap_err();
        assert!(matches!(err, ConsumerError::MalformedEnvelope(msg) if msg.contains("parameter")));
    }

    #[test]
    fn rejects_missing_data() {
        let err = Envelope::decode(br#"{"payload": []}"#).unwrap_err();
        assert!(matches!(err, ConsumerError::MalformedEnvelope(msg) if msg.contains("data")));
    }
}
