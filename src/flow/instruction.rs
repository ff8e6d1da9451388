//! Voice instructions handed to the markup collaborator
//!
//! Each invocation produces an ordered list of these; serialization into
//! the provider's markup happens outside this daemon.

use serde::{Deserialize, Serialize};

/// Path the provider posts input results to
pub const PROCESS_INPUT_PATH: &str = "/process-input";

/// HTTP method the provider uses for a continuation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
}

impl Default for HttpMethod {
    fn default() -> Self {
        Self::Post
    }
}

/// A single voice-control instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Instruction {
    /// Speak text to the caller
    Speak { text: String },

    /// Collect keypresses, then post the result to `action`
    CollectInput {
        num_digits: u32,
        action: String,
        method: HttpMethod,
        timeout_secs: u32,
        /// Text spoken while waiting for input
        prompt: String,
    },

    /// Continue the call at `url`
    Redirect { url: String, method: HttpMethod },

    /// End the call
    HangUp,
}

impl Instruction {
    pub fn speak(text: impl Into<String>) -> Self {
        Instruction::Speak { text: text.into() }
    }

    pub fn redirect(url: impl Into<String>) -> Self {
        Instruction::Redirect {
            url: url.into(),
            method: HttpMethod::Post,
        }
    }

    /// Whether this instruction ends the call
    pub fn is_hang_up(&self) -> bool {
        matches!(self, Instruction::HangUp)
    }
}

/// Build the continuation URL that carries `attempt` to the next invocation
pub fn continuation_url(base_url: &str, attempt: u32) -> String {
    format!(
        "{}{}?attempt={}",
        base_url.trim_end_matches('/'),
        PROCESS_INPUT_PATH,
        attempt
    )
}
