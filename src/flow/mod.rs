//! Call-flow module for the IVR prompt/retry logic
//!
//! Provides an explicit state machine with four states:
//! - Greeting: the call has just connected
//! - AwaitingInput: a prompt is out, carrying its attempt number
//! - Answered: a keypress arrived (terminal)
//! - Exhausted: the retry budget ran out (terminal)

mod instruction;
mod machine;
mod service;
mod stats;

pub use instruction::Instruction;
pub use machine::AttemptContext;
pub use service::{CallFlow, CompletionReport};
pub use stats::{CallSummary, StatsSnapshot};
