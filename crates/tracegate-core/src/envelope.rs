use serde::Deserialize;
use serde_json::Value;

use crate::constants::CODE_OK;
use crate::error::ApiError;
use crate::transport::HttpReply;

/// Business response wrapper every API answer is expected to follow.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub message: Option<String>,
}

/// Maps a reply to its payload or a failure kind.
///
/// The envelope `code` decides. A body that is not an envelope falls back to
/// the HTTP status with the same code table; a 2xx without an envelope is a
/// decode failure.
pub fn interpret(reply: &HttpReply) -> Result<Value, ApiError> {
    match serde_json::from_str::<Envelope>(&reply.body) {
        Ok(envelope) if envelope.code == CODE_OK => Ok(envelope.data),
        Ok(envelope) => Err(ApiError::from_code(envelope.code, envelope.message)),
        Err(err) => {
            if (200..300).contains(&reply.status) {
                let snippet: String = reply.body.chars().take(512).collect();
                return Err(ApiError::Decode(format!("{err} body: {snippet}")));
            }
            let message = reply.body.chars().take(512).collect::<String>();
            Err(ApiError::from_code(
                i64::from(reply.status),
                Some(message).filter(|m| !m.is_empty()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn success_returns_data_unchanged() {
        let reply = HttpReply::envelope(200, json!({"items": [1, 2]}), Some("success"));
        assert_eq!(interpret(&reply), Ok(json!({"items": [1, 2]})));
    }

    #[test]
    fn business_code_wins_over_http_status() {
        let reply = HttpReply::new(200, r#"{"code": 401, "message": "expired"}"#);
        assert_eq!(interpret(&reply), Err(ApiError::AuthExpired));

        let reply = HttpReply::new(200, r#"{"code": 403, "message": "nope"}"#);
        assert_eq!(interpret(&reply), Err(ApiError::Forbidden("nope".into())));

        let reply = HttpReply::new(200, r#"{"success": false, "code": 200, "data": 3}"#);
        assert_eq!(interpret(&reply), Ok(Value::from(3)));
    }

    #[test]
    fn non_envelope_bodies_fall_back_to_status() {
        let reply = HttpReply::new(502, "<html>bad gateway</html>");
        assert_eq!(interpret(&reply).map_err(|e| e.kind()), Err(ErrorKind::Server));

        let reply = HttpReply::new(401, "");
        assert_eq!(interpret(&reply), Err(ApiError::AuthExpired));

        let reply = HttpReply::new(200, "not json");
        assert_eq!(interpret(&reply).map_err(|e| e.kind()), Err(ErrorKind::Decode));
    }

    #[test]
    fn missing_data_is_null() {
        let reply = HttpReply::new(200, r#"{"code": 200}"#);
        assert_eq!(interpret(&reply), Ok(Value::Null));
    }
}
