//! Call-flow service shared by all connections
//!
//! Applies the pure state machine to each invocation and owns the
//! process-wide [`CallStats`]. One call at a time is assumed: every
//! invocation updates the same counters.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use super::instruction::Instruction;
use super::machine::{transition, AttemptContext, CallState, FlowInput, TransitionResult};
use super::stats::{CallStats, CallSummary, StatsSnapshot};
use crate::config::FlowConfig;
use crate::events::CallEvent;

/// Spoken when the state machine refuses an invocation
const FALLBACK_TEXT: &str = "This call has already ended. Goodbye.";

/// Errors surfaced by the completion callback
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("call duration is not a whole number of seconds: {0:?}")]
    InvalidDuration(String),
}

/// Raw fields of the provider's final status callback
#[derive(Debug, Clone, Default)]
pub struct CompletionReport {
    pub call_duration: Option<String>,
    pub call_sid: Option<String>,
    pub call_status: Option<String>,
}

/// Validated completion callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallCompletion {
    pub duration_secs: u64,
    pub call_sid: String,
    pub call_status: String,
}

impl CompletionReport {
    /// Check required fields; the provider guarantees them, so absence is fatal
    pub fn validate(self) -> Result<CallCompletion, FlowError> {
        let raw_duration = required(self.call_duration, "CallDuration")?;
        let call_sid = required(self.call_sid, "CallSid")?;
        let call_status = required(self.call_status, "CallStatus")?;

        let duration_secs = raw_duration
            .trim()
            .parse::<u64>()
            .map_err(|_| FlowError::InvalidDuration(raw_duration.clone()))?;

        Ok(CallCompletion {
            duration_secs,
            call_sid,
            call_status,
        })
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, FlowError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(FlowError::MissingField(name))
}

/// Drives calls through the prompt/retry flow
pub struct CallFlow {
    config: FlowConfig,
    stats: Arc<RwLock<CallStats>>,
    event_tx: broadcast::Sender<CallEvent>,
}

impl CallFlow {
    /// Create a call flow with zeroed stats
    pub fn new(config: FlowConfig, event_tx: broadcast::Sender<CallEvent>) -> Self {
        Self {
            config,
            stats: Arc::new(RwLock::new(CallStats::default())),
            event_tx,
        }
    }

    /// Handle the call-start webhook: greet and issue the first prompt
    pub async fn start_call(&self) -> Vec<Instruction> {
        self.stats.write().await.call_start_time = Some(Instant::now());
        self.emit(CallEvent::CallStarted);

        self.step(&CallState::Greeting, FlowInput::Start).await
    }

    /// Handle an input result posted to the continuation URL
    pub async fn process_input(
        &self,
        context: AttemptContext,
        digits: Option<&str>,
    ) -> Vec<Instruction> {
        self.step(&context.state(), FlowInput::input(digits)).await
    }

    /// Handle the final status callback: log the summary and reset the stats
    pub async fn complete_call(&self, report: CompletionReport) -> Result<CallSummary, FlowError> {
        let completion = report.validate()?;

        let summary = {
            let mut stats = self.stats.write().await;
            stats.call_duration_secs = completion.duration_secs;

            let summary = CallSummary {
                call_sid: completion.call_sid,
                status: completion.call_status,
                duration_secs: stats.call_duration_secs,
                observed_secs: stats.call_start_time.map(|t| t.elapsed().as_secs()),
                silence_events: stats.silence_events,
                unanswered_prompts: stats.unanswered_prompts,
            };
            stats.reset();
            summary
        };

        info!(
            call_sid = %summary.call_sid,
            status = %summary.status,
            duration_secs = summary.duration_secs,
            observed_secs = ?summary.observed_secs,
            silence_events = summary.silence_events,
            unanswered_prompts = summary.unanswered_prompts,
            "call summary"
        );
        self.emit(CallEvent::CallCompleted(summary.clone()));

        Ok(summary)
    }

    /// Current counters
    pub async fn snapshot(&self) -> StatsSnapshot {
        self.stats.read().await.snapshot()
    }

    /// Apply one transition and its side effects
    async fn step(&self, state: &CallState, input: FlowInput) -> Vec<Instruction> {
        let TransitionResult {
            new_state,
            instructions,
            record_silence,
        } = match transition(state, input, &self.config) {
            Ok(result) => result,
            Err(e) => {
                warn!(?e, %state, "rejected call-flow input");
                return vec![Instruction::speak(FALLBACK_TEXT), Instruction::HangUp];
            }
        };

        debug!(from = %state, to = %new_state, "call-flow transition");

        let silence_events = if record_silence {
            let mut stats = self.stats.write().await;
            stats.record_silence();
            Some(stats.silence_events)
        } else {
            None
        };

        if let (Some(silence_events), CallState::AwaitingInput { attempt }) =
            (silence_events, state)
        {
            self.emit(CallEvent::SilenceRecorded {
                attempt: *attempt,
                silence_events,
            });
        }

        match &new_state {
            CallState::AwaitingInput { attempt } => {
                self.emit(CallEvent::PromptIssued { attempt: *attempt });
            }
            CallState::Answered { digits } => {
                let attempt = match state {
                    CallState::AwaitingInput { attempt } => *attempt,
                    _ => 0,
                };
                self.emit(CallEvent::DigitsReceived {
                    attempt,
                    digits: digits.clone(),
                });
            }
            CallState::Exhausted { attempts } => {
                self.emit(CallEvent::PromptsExhausted {
                    attempts: *attempts,
                });
            }
            CallState::Greeting => {}
        }

        instructions
    }

    fn emit(&self, event: CallEvent) {
        debug!(%event, "emitting call event");
        // No subscribers is fine; events are advisory
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::machine::EXHAUSTED_TEXT;

    fn create_call_flow() -> (CallFlow, broadcast::Receiver<CallEvent>) {
        let (tx, rx) = broadcast::channel(16);
        let config = FlowConfig {
            base_url: "https://ivr.example.com".to_string(),
            ..FlowConfig::default()
        };
        (CallFlow::new(config, tx), rx)
    }

    fn report(duration: &str) -> CompletionReport {
        CompletionReport {
            call_duration: Some(duration.to_string()),
            call_sid: Some("CA123".to_string()),
            call_status: Some("completed".to_string()),
        }
    }

    fn collect_action(instructions: &[Instruction]) -> Option<String> {
        instructions.iter().find_map(|i| match i {
            Instruction::CollectInput { action, .. } => Some(action.clone()),
            _ => None,
        })
    }

    #[tokio::test]
    async fn test_start_call_greets_and_prompts() {
        let (flow, mut rx) = create_call_flow();
        let instructions = flow.start_call().await;
        let url = "https://ivr.example.com/process-input?attempt=0";

        assert!(matches!(instructions[0], Instruction::Speak { .. }));
        assert_eq!(collect_action(&instructions).as_deref(), Some(url));
        assert_eq!(instructions.last(), Some(&Instruction::redirect(url)));
        assert!(flow.snapshot().await.call_in_progress);

        assert!(matches!(rx.recv().await.unwrap(), CallEvent::CallStarted));
        assert!(matches!(
            rx.recv().await.unwrap(),
            CallEvent::PromptIssued { attempt: 0 }
        ));
    }

    #[tokio::test]
    async fn test_digit_answers_without_counting() {
        let (flow, _rx) = create_call_flow();
        let instructions = flow
            .process_input(AttemptContext { attempt: 1 }, Some("5"))
            .await;

        assert_eq!(
            instructions[0],
            Instruction::speak("You pressed 5. Thank you for your response!")
        );
        assert_eq!(instructions.last(), Some(&Instruction::HangUp));

        let stats = flow.snapshot().await;
        assert_eq!(stats.silence_events, 0);
        assert_eq!(stats.unanswered_prompts, 0);
    }

    #[tokio::test]
    async fn test_silence_reprompts_and_counts() {
        let (flow, _rx) = create_call_flow();
        let instructions = flow.process_input(AttemptContext { attempt: 0 }, None).await;

        assert_eq!(
            collect_action(&instructions).as_deref(),
            Some("https://ivr.example.com/process-input?attempt=1")
        );
        assert!(!instructions.iter().any(Instruction::is_hang_up));

        let stats = flow.snapshot().await;
        assert_eq!(stats.silence_events, 1);
        assert_eq!(stats.unanswered_prompts, 1);
    }

    #[tokio::test]
    async fn test_last_attempt_says_goodbye() {
        let (flow, mut rx) = create_call_flow();
        let instructions = flow.process_input(AttemptContext { attempt: 2 }, None).await;

        assert_eq!(
            instructions,
            vec![Instruction::speak(EXHAUSTED_TEXT), Instruction::HangUp]
        );
        let stats = flow.snapshot().await;
        assert_eq!(stats.silence_events, 1);
        assert_eq!(stats.unanswered_prompts, 1);

        assert!(matches!(
            rx.recv().await.unwrap(),
            CallEvent::SilenceRecorded {
                attempt: 2,
                silence_events: 1
            }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            CallEvent::PromptsExhausted { attempts: 3 }
        ));
    }

    #[tokio::test]
    async fn test_full_silent_call_then_completion() {
        let (flow, _rx) = create_call_flow();
        flow.start_call().await;

        let mut context = AttemptContext::default();
        let mut invocations = 0;
        loop {
            let instructions = flow.process_input(context, None).await;
            invocations += 1;

            let stats = flow.snapshot().await;
            assert_eq!(stats.silence_events, invocations);
            assert_eq!(stats.unanswered_prompts, invocations);

            match collect_action(&instructions) {
                Some(action) => {
                    let raw = action.rsplit("attempt=").next();
                    context = AttemptContext::from_query(raw);
                    assert_eq!(context.attempt, invocations);
                }
                None => {
                    assert_eq!(instructions.last(), Some(&Instruction::HangUp));
                    break;
                }
            }
        }
        assert_eq!(invocations, 3);

        let summary = flow.complete_call(report("42")).await.unwrap();
        assert_eq!(summary.silence_events, 3);
        assert_eq!(summary.unanswered_prompts, 3);
        assert_eq!(summary.duration_secs, 42);
        assert!(summary.observed_secs.is_some());

        let stats = flow.snapshot().await;
        assert_eq!(stats.silence_events, 0);
        assert_eq!(stats.unanswered_prompts, 0);
        assert_eq!(stats.call_duration_secs, 42);
        assert!(!stats.call_in_progress);
    }

    #[test]
    fn test_completion_resets_regardless_of_prior_values() {
        let (flow, _rx) = create_call_flow();

        tokio_test::block_on(async {
            for _ in 0..5 {
                flow.process_input(AttemptContext { attempt: 0 }, None).await;
            }
            let first = flow.complete_call(report("10")).await.unwrap();
            assert_eq!(first.silence_events, 5);
            assert_eq!(first.observed_secs, None);

            let second = flow.complete_call(report("11")).await.unwrap();
            assert_eq!(second.silence_events, 0);
            assert_eq!(second.unanswered_prompts, 0);

            let stats = flow.snapshot().await;
            assert_eq!(stats.silence_events, 0);
            assert_eq!(stats.call_duration_secs, 11);
        });
    }

    #[test]
    fn test_completion_rejects_bad_fields() {
        let (flow, _rx) = create_call_flow();

        tokio_test::block_on(async {
            flow.process_input(AttemptContext { attempt: 0 }, None).await;

            let err = flow.complete_call(report("forty")).await.unwrap_err();
            assert_eq!(err, FlowError::InvalidDuration("forty".to_string()));

            let missing = CompletionReport {
                call_duration: None,
                ..report("1")
            };
            assert_eq!(
                flow.complete_call(missing).await.unwrap_err(),
                FlowError::MissingField("CallDuration")
            );

            let no_sid = CompletionReport {
                call_sid: Some(String::new()),
                ..report("1")
            };
            assert_eq!(
                flow.complete_call(no_sid).await.unwrap_err(),
                FlowError::MissingField("CallSid")
            );

            // Rejected callbacks leave the counters alone
            assert_eq!(flow.snapshot().await.silence_events, 1);
        });
    }
}
