use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed token: expected 3 segments, found {segments}")]
    MalformedStructure { segments: usize },

    #[error("Invalid token payload: {0}")]
    InvalidPayload(String),
}

/// Claims carried in the payload segment of an access credential.
///
/// Only `sub` and `exp` are interpreted locally. Anything else the
/// server adds is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Claims {
    #[serde(
        default,
        deserialize_with = "deserialize_subject",
        skip_serializing_if = "Option::is_none"
    )]
    pub sub: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub exp: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }

    /// `iat` claim, when the server issues one
    pub fn issued_at(&self) -> Option<i64> {
        self.extra.get("iat").and_then(numeric_date)
    }
}

fn numeric_date(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.floor() as i64))
}

// Expiration is a JSON number; some issuers send fractional seconds.
fn deserialize_numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(numeric_date))
}

// Subjects are strings by RFC 7519, but numeric user ids show up in the
// wild. Other shapes are ignored rather than failing the whole payload.
fn deserialize_subject<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Decode the claims of a `header.payload.signature` credential.
///
/// The signature is not checked. The server already verified the
/// credential when it issued it; this decode only feeds local expiry
/// bookkeeping.
pub fn decode(token: &str) -> Result<Claims, DecodeError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(DecodeError::MalformedStructure {
            segments: segments.len(),
        });
    }

    let payload = segments[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| DecodeError::InvalidPayload(format!("base64: {}", e)))?;

    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| DecodeError::InvalidPayload(format!("json: {}", e)))?;
    if !value.is_object() {
        return Err(DecodeError::InvalidPayload("payload is not a JSON object".to_string()));
    }

    serde_json::from_value(value).map_err(|e| DecodeError::InvalidPayload(format!("claims: {}", e)))
}

#[cfg(test)]
pub(crate) fn encode_unsigned(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.c2lnbmF0dXJl", header, body)
}
