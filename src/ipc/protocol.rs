//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.
//! The web front end forwards each provider webhook as one request and
//! renders the returned instructions into provider markup.

use serde::{Deserialize, Serialize};

use crate::flow::{Instruction, StatsSnapshot};

/// Acknowledgement returned for a completion callback
pub const SUMMARY_RECEIVED: &str = "Call summary received";

/// Requests from the webhook front end to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Call connected (call-start webhook)
    CallStarted,

    /// Result of a collect instruction
    ProcessInput {
        /// Raw `attempt` query parameter
        attempt: Option<String>,
        /// Raw `Digits` form field
        digits: Option<String>,
    },

    /// Provider's call status callback
    CallStatus {
        call_duration: Option<String>,
        call_sid: Option<String>,
        call_status: Option<String>,
    },

    /// Request current counters
    GetStats,

    /// Ping to check connectivity
    Ping,
}

/// Responses from daemon to the front end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Ordered voice instructions for the provider
    Instructions { instructions: Vec<Instruction> },

    /// Completion callback accepted
    Ack { message: String },

    /// Counters snapshot
    Stats(DaemonStats),

    /// Pong response to ping
    Pong,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Full daemon stats snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStats {
    /// Daemon version
    pub version: String,

    /// Uptime in seconds
    pub uptime_secs: u64,

    /// Current call counters
    #[serde(flatten)]
    pub call: StatsSnapshot,
}

impl Default for DaemonStats {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: 0,
            call: StatsSnapshot::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialization() {
        let json = r#"{"type":"process_input","attempt":"2"}"#;
        let request: Request = serde_json::from_str(json).unwrap();
        match request {
            Request::ProcessInput { attempt, digits } => {
                assert_eq!(attempt.as_deref(), Some("2"));
                assert!(digits.is_none());
            }
            other => panic!("unexpected request: {:?}", other),
        }

        let json = r#"{"type":"call_status","call_sid":"CA1","call_status":"completed"}"#;
        let request: Request = serde_json::from_str(json).unwrap();
        assert!(matches!(
            request,
            Request::CallStatus {
                call_duration: None,
                ..
            }
        ));
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Stats(DaemonStats::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""type":"stats""#));
        assert!(json.contains(r#""silence_events":0"#));

        let resp = Response::Ack {
            message: SUMMARY_RECEIVED.to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"type":"ack","message":"Call summary received"}"#);
    }
}
