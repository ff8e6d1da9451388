//! Events module for call-flow progress
//!
//! Every handled invocation publishes one of these on a broadcast channel
//! so the daemon can log call progress independently of the responses.

use serde::{Deserialize, Serialize};

use crate::flow::CallSummary;

/// Events emitted by the call flow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEvent {
    /// Call connected and the greeting went out
    CallStarted,

    /// A collect instruction was issued
    PromptIssued {
        /// Attempt encoded in the continuation URL
        attempt: u32,
    },

    /// Caller pressed a key
    DigitsReceived { attempt: u32, digits: String },

    /// A prompt timed out without input
    SilenceRecorded {
        attempt: u32,
        /// Cumulative silence count after this event
        silence_events: u32,
    },

    /// Retry budget spent; the call is being ended
    PromptsExhausted { attempts: u32 },

    /// Provider reported the call finished
    CallCompleted(CallSummary),
}

impl std::fmt::Display for CallEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallEvent::CallStarted => write!(f, "CALL_STARTED"),
            CallEvent::PromptIssued { attempt } => write!(f, "PROMPT_ISSUED (attempt {})", attempt),
            CallEvent::DigitsReceived { attempt, digits } => {
                write!(f, "DIGITS_RECEIVED ({} at attempt {})", digits, attempt)
            }
            CallEvent::SilenceRecorded {
                attempt,
                silence_events,
            } => write!(
                f,
                "SILENCE_RECORDED (attempt {}, total {})",
                attempt, silence_events
            ),
            CallEvent::PromptsExhausted { attempts } => {
                write!(f, "PROMPTS_EXHAUSTED ({} attempts)", attempts)
            }
            CallEvent::CallCompleted(summary) => write!(
                f,
                "CALL_COMPLETED ({} {} {}s)",
                summary.call_sid, summary.status, summary.duration_secs
            ),
        }
    }
}
