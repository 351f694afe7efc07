//! Response shapes.
//!
//! The backend answers either with the bare payload or wrapped as
//! `{ "success": bool, "data": ..., "error": "..." }`. Some endpoints drop
//! `success` and send only `{ "data": ... }`. All three are decoded
//! explicitly here; anything else is a [`ClientError::MalformedResponse`].

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::{ClientError, Result};

/// A decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<T> {
    /// `{success: true, data}` or `{data}`
    Enveloped(T),
    /// The payload itself.
    Bare(T),
}

impl<T> Payload<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Enveloped(data) | Self::Bare(data) => data,
        }
    }
}

/// A JSON object counts as an envelope when it carries a boolean `success`.
fn envelope_parts(value: &Value) -> Option<(bool, Option<&Value>, Option<&Value>)> {
    let object = value.as_object()?;
    let success = object.get("success")?.as_bool()?;
    Some((success, object.get("data"), object.get("error")))
}

/// Decode `value` as either shape.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<Payload<T>> {
    if let Some((success, data, error)) = envelope_parts(&value) {
        if !success {
            let message = error
                .and_then(Value::as_str)
                .unwrap_or("request was not successful")
                .to_string();
            return Err(ClientError::EnvelopeFailure(message));
        }

        return match data {
            Some(data) if !data.is_null() => serde_json::from_value(data.clone())
                .map(Payload::Enveloped)
                .map_err(ClientError::from),
            _ => Err(ClientError::MalformedResponse(
                "envelope is missing `data`".to_string(),
            )),
        };
    }

    // `{data}` without `success`: prefer `data`, fall back to the whole object.
    if let Some(data) = value.get("data").filter(|data| !data.is_null()) {
        if let Ok(inner) = serde_json::from_value(data.clone()) {
            return Ok(Payload::Enveloped(inner));
        }
    }

    serde_json::from_value(value)
        .map(Payload::Bare)
        .map_err(ClientError::from)
}

/// Decode a raw body string as either shape and unwrap it.
pub fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    let value: Value = serde_json::from_str(body)?;
    decode(value).map(Payload::into_inner)
}

/// Best human-readable message out of an error body.
///
/// Looks at `error`, then `message`, then `details`, and falls back to the
/// raw text (truncated) when the body is not JSON.
pub fn error_message(body: &str, status: u16) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for field in ["error", "message", "details", "title"] {
            if let Some(text) = value.get(field).and_then(Value::as_str) {
                return text.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("Request failed: {}", status)
    } else {
        trimmed.chars().take(200).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: String,
    }

    #[test]
    fn bare_object_decodes() {
        let payload: Payload<Item> = decode(json!({ "id": "n1" })).unwrap();
        assert_eq!(payload, Payload::Bare(Item { id: "n1".into() }));
    }

    #[test]
    fn wrapped_object_decodes() {
        let payload: Payload<Item> =
            decode(json!({ "success": true, "data": { "id": "n1" } })).unwrap();
        assert_eq!(payload, Payload::Enveloped(Item { id: "n1".into() }));
    }

    #[test]
    fn data_only_wrapper_decodes() {
        let payload: Payload<Vec<Item>> = decode(json!({ "data": [{ "id": "n1" }] })).unwrap();
        assert_eq!(payload, Payload::Enveloped(vec![Item { id: "n1".into() }]));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Blob {
        data: String,
    }

    #[test]
    fn payload_with_its_own_data_field_stays_bare() {
        let payload: Payload<Blob> = decode(json!({ "data": "raw" })).unwrap();
        assert_eq!(payload, Payload::Bare(Blob { data: "raw".into() }));
    }

    #[test]
    fn bare_array_decodes() {
        let items: Vec<Item> = decode_body(r#"[{"id":"a"},{"id":"b"}]"#).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn failed_envelope_surfaces_its_error() {
        let err = decode::<Item>(json!({ "success": false, "error": "nope" })).unwrap_err();
        assert!(matches!(err, ClientError::EnvelopeFailure(msg) if msg == "nope"));
    }

    #[rstest]
    #[case(json!({ "success": true }))]
    #[case(json!({ "success": true, "data": null }))]
    #[case(json!({ "unexpected": 1 }))]
    #[case(json!("just a string"))]
    fn unrecognised_shapes_are_malformed(#[case] value: Value) {
        assert!(matches!(
            decode::<Item>(value),
            Err(ClientError::MalformedResponse(_))
        ));
    }

    #[rstest]
    #[case(r#"{"error":"bad token"}"#, "bad token")]
    #[case(r#"{"message":"not allowed"}"#, "not allowed")]
    #[case("plain text failure", "plain text failure")]
    #[case("", "Request failed: 500")]
    fn error_message_picks_best_field(#[case] body: &str, #[case] expected: &str) {
        assert_eq!(error_message(body, 500), expected);
    }
}
