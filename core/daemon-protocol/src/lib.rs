//! Wire types and validation for the gatehouse daemon.
//!
//! This crate is shared by the daemon and the proxy-side adapter to prevent
//! schema drift. The daemon remains the authority on validation, but clients
//! can reuse the same types to construct valid requests.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 64 * 1024; // requests carry at most one event

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetHealth,
    CheckAdmission,
    Event,
    ListAllowed,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

/// One allow-listed player: a stable opaque id plus the display name it was
/// registered under. Both fields participate in the admission match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Identity {
    pub stable_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum EventType {
    ServerConnected,
    ServerDisconnected,
}

/// A post-connect or disconnect notification reported by the proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventEnvelope {
    pub recorded_at: String,
    pub event_type: EventType,
    pub stable_id: String,
    pub display_name: String,
    pub server: String,
}

impl EventEnvelope {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if DateTime::parse_from_rfc3339(&self.recorded_at).is_err() {
            return Err(ErrorInfo::new(
                "invalid_timestamp",
                "recorded_at must be RFC3339",
            ));
        }
        require_field(&self.stable_id, "stable_id")?;
        require_field(&self.display_name, "display_name")?;
        require_field(&self.server, "server")?;
        Ok(())
    }

    /// Event timestamp as unix epoch seconds, the storage representation.
    pub fn recorded_at_epoch(&self) -> Option<i64> {
        DateTime::parse_from_rfc3339(&self.recorded_at)
            .ok()
            .map(|dt| dt.timestamp())
    }
}

/// A connection attempt awaiting an admission verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdmissionParams {
    pub stable_id: String,
    pub display_name: String,
    pub server: String,
}

impl AdmissionParams {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        require_field(&self.stable_id, "stable_id")?;
        require_field(&self.display_name, "display_name")?;
        require_field(&self.server, "server")?;
        Ok(())
    }

    pub fn identity(&self) -> Identity {
        Identity {
            stable_id: self.stable_id.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// Verdict for a connection attempt. On denial the proxy must cancel the
/// destination connect and disconnect the player with `message`; `notify`,
/// when present, is a broadcast the proxy should deliver to every connected
/// player holding the named permission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionOutcome {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify: Option<DenialNotification>,
}

impl AdmissionOutcome {
    pub fn granted() -> Self {
        Self {
            allowed: true,
            message: None,
            notify: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenialNotification {
    pub permission: String,
    pub message: String,
}

pub fn parse_event(params: Value) -> Result<EventEnvelope, ErrorInfo> {
    let envelope: EventEnvelope = serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("event payload is invalid: {}", err),
        )
    })?;
    envelope.validate()?;
    Ok(envelope)
}

pub fn parse_admission(params: Value) -> Result<AdmissionParams, ErrorInfo> {
    let parsed: AdmissionParams = serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("admission payload is invalid: {}", err),
        )
    })?;
    parsed.validate()?;
    Ok(parsed)
}

fn require_field(value: &str, field: &str) -> Result<(), ErrorInfo> {
    if value.trim().is_empty() {
        return Err(ErrorInfo::new(
            "missing_field",
            format!("{} is required", field),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_event(event_type: EventType) -> EventEnvelope {
        EventEnvelope {
            recorded_at: "2026-08-05T12:00:00Z".to_string(),
            event_type,
            stable_id: "abc".to_string(),
            display_name: "Alice".to_string(),
            server: "lobby".to_string(),
        }
    }

    #[test]
    fn validates_connect_event() {
        let event = base_event(EventType::ServerConnected);
        assert!(event.validate().is_ok());
    }

    #[test]
    fn rejects_bad_timestamp() {
        let mut event = base_event(EventType::ServerDisconnected);
        event.recorded_at = "not-a-time".to_string();
        assert!(event.validate().is_err());
    }

    #[test]
    fn rejects_blank_stable_id() {
        let mut event = base_event(EventType::ServerConnected);
        event.stable_id = "  ".to_string();
        assert!(event.validate().is_err());
    }

    #[test]
    fn recorded_at_epoch_converts_to_unix_seconds() {
        let mut event = base_event(EventType::ServerConnected);
        event.recorded_at = "1970-01-01T00:01:40Z".to_string();
        assert_eq!(event.recorded_at_epoch(), Some(100));
    }

    #[test]
    fn parse_event_rejects_unknown_fields() {
        let params = json!({
            "recorded_at": "2026-08-05T12:00:00Z",
            "event_type": "server_connected",
            "stable_id": "abc",
            "display_name": "Alice",
            "server": "lobby",
            "extra": true,
        });
        assert!(parse_event(params).is_err());
    }

    #[test]
    fn parse_admission_accepts_complete_params() {
        let params = json!({
            "stable_id": "abc",
            "display_name": "Alice",
            "server": "lobby",
        });
        let parsed = parse_admission(params).expect("parse admission");
        assert_eq!(parsed.identity().display_name, "Alice");
    }

    #[test]
    fn parse_admission_rejects_missing_display_name() {
        let params = json!({
            "stable_id": "abc",
            "server": "lobby",
        });
        assert!(parse_admission(params).is_err());
    }
}
