//! Pure call-flow state machine
//!
//! Maps the current call state and one webhook input to the next state and
//! the instructions to emit. No I/O and no counters are touched here; the
//! caller applies `record_silence` to the shared stats.

use thiserror::Error;

use super::instruction::{continuation_url, HttpMethod, Instruction};
use crate::config::FlowConfig;

pub const WELCOME_TEXT: &str = "Hello, welcome! Please hold while we connect you.";
pub const FIRST_PROMPT_TEXT: &str = "Please press any key to continue.";
pub const RETRY_PROMPT_TEXT: &str =
    "We did not receive your input. Please press any key to continue.";
pub const CLOSING_TEXT: &str = "We will now proceed with your request.";
pub const EXHAUSTED_TEXT: &str = "No input received multiple times. Goodbye.";

/// Progress of one call through the prompt/retry flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    /// The call has just connected
    Greeting,
    /// A prompt is out; waiting for a keypress or a timeout
    AwaitingInput { attempt: u32 },
    /// A keypress was received
    Answered { digits: String },
    /// The retry budget ran out without input
    Exhausted { attempts: u32 },
}

impl CallState {
    /// Whether no further prompt transitions can occur
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Answered { .. } | CallState::Exhausted { .. })
    }
}

impl Default for CallState {
    fn default() -> Self {
        Self::Greeting
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallState::Greeting => write!(f, "Greeting"),
            CallState::AwaitingInput { attempt } => write!(f, "AwaitingInput({})", attempt),
            CallState::Answered { .. } => write!(f, "Answered"),
            CallState::Exhausted { attempts } => write!(f, "Exhausted({})", attempts),
        }
    }
}

/// What a webhook invocation brings to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowInput {
    /// The call connected
    Start,
    /// A collect instruction finished, with or without digits
    Input { digits: Option<String> },
}

impl FlowInput {
    /// Build an input result, treating an empty digit field as no input
    pub fn input(digits: Option<&str>) -> Self {
        FlowInput::Input {
            digits: digits.filter(|d| !d.is_empty()).map(str::to_owned),
        }
    }
}

/// Per-invocation attempt counter threaded through the continuation URL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptContext {
    pub attempt: u32,
}

impl AttemptContext {
    /// Parse the raw `attempt` query value; absent or malformed means 0
    pub fn from_query(raw: Option<&str>) -> Self {
        let attempt = raw
            .and_then(|value| value.trim().parse::<u32>().ok())
            .unwrap_or(0);
        Self { attempt }
    }

    /// State this context resumes
    pub fn state(&self) -> CallState {
        CallState::AwaitingInput {
            attempt: self.attempt,
        }
    }
}

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: CallState,
    pub instructions: Vec<Instruction>,
    /// An unanswered prompt must be counted
    pub record_silence: bool,
}

impl TransitionResult {
    fn new(state: CallState) -> Self {
        Self {
            new_state: state,
            instructions: vec![],
            record_silence: false,
        }
    }

    fn with(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    fn with_all(mut self, instructions: impl IntoIterator<Item = Instruction>) -> Self {
        self.instructions.extend(instructions);
        self
    }

    fn counting_silence(mut self) -> Self {
        self.record_silence = true;
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("call already ended in state {0}")]
    CallEnded(CallState),
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
pub fn transition(
    state: &CallState,
    input: FlowInput,
    config: &FlowConfig,
) -> Result<TransitionResult, TransitionError> {
    match (state, input) {
        (CallState::Greeting, FlowInput::Start) => Ok(TransitionResult::new(
            CallState::AwaitingInput { attempt: 0 },
        )
        .with(Instruction::speak(WELCOME_TEXT))
        .with_all(prompt(config, 0, FIRST_PROMPT_TEXT))),

        (CallState::AwaitingInput { .. }, FlowInput::Input { digits: Some(digits) }) => {
            Ok(TransitionResult::new(CallState::Answered {
                digits: digits.clone(),
            })
            .with(Instruction::speak(format!(
                "You pressed {}. Thank you for your response!",
                digits
            )))
            .with(Instruction::speak(CLOSING_TEXT))
            .with(Instruction::HangUp))
        }

        (CallState::AwaitingInput { attempt }, FlowInput::Input { digits: None }) => {
            let next = attempt.saturating_add(1);
            if next >= config.max_attempts {
                Ok(TransitionResult::new(CallState::Exhausted { attempts: next })
                    .with(Instruction::speak(EXHAUSTED_TEXT))
                    .with(Instruction::HangUp)
                    .counting_silence())
            } else {
                Ok(TransitionResult::new(CallState::AwaitingInput { attempt: next })
                    .with_all(prompt(config, next, RETRY_PROMPT_TEXT))
                    .counting_silence())
            }
        }

        (terminal, _) if terminal.is_terminal() => {
            Err(TransitionError::CallEnded(terminal.clone()))
        }

        (CallState::Greeting, FlowInput::Input { .. }) => Err(
            TransitionError::InvalidTransition("input received before greeting".to_string()),
        ),

        (CallState::AwaitingInput { attempt }, FlowInput::Start) => {
            Err(TransitionError::InvalidTransition(format!(
                "call start while awaiting input at attempt {}",
                attempt
            )))
        }

        (state, input) => Err(TransitionError::InvalidTransition(format!(
            "{:?} in state {}",
            input, state
        ))),
    }
}

/// Collect instruction plus the fallback redirect, both targeting `attempt`
fn prompt(config: &FlowConfig, attempt: u32, text: &str) -> [Instruction; 2] {
    let action = continuation_url(&config.base_url, attempt);
    [
        Instruction::CollectInput {
            num_digits: config.num_digits,
            action: action.clone(),
            method: HttpMethod::Post,
            timeout_secs: config.timeout_secs,
            prompt: text.to_string(),
        },
        Instruction::redirect(action),
    ]
}
