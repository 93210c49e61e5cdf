//! Unverified JWT inspection
//!
//! Structural checks only: nothing here verifies a signature, so decoded
//! claims must never be used for authorization decisions.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};

use crate::error::{SsoError, SsoResult};

/// Decode the payload segment of a compact JWT without verifying it
///
/// # Errors
/// Returns `SsoError::Serialization` if the token does not have three
/// segments or the payload is not a base64url JSON object.
pub fn decode_claims(token: &str) -> SsoResult<Map<String, Value>> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(SsoError::Serialization("JWT must have three segments".to_string()));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| SsoError::Serialization(format!("JWT payload is not base64url: {e}")))?;

    match serde_json::from_slice::<Value>(&bytes)? {
        Value::Object(claims) => Ok(claims),
        _ => Err(SsoError::Serialization("JWT payload is not a JSON object".to_string())),
    }
}

/// Check a token is a three-part JWT whose payload carries `exp` and `iat`
#[must_use]
pub fn validate_token_structure(token: &str) -> bool {
    decode_claims(token)
        .map(|claims| claims.contains_key("exp") && claims.contains_key("iat"))
        .unwrap_or(false)
}

/// Encode `claims` as an unsigned compact JWT
///
/// Used by the mock provider to hand out structurally valid ID tokens.
#[must_use]
pub fn encode_unsigned(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    let signature = URL_SAFE_NO_PAD.encode(b"mock-signature");
    format!("{header}.{payload}.{signature}")
}
