//! Process-wide counters for the current call

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Counters kept for post-call reporting
#[derive(Debug, Clone, Default)]
pub struct CallStats {
    /// No-input timeouts since the call started
    pub silence_events: u32,
    /// Prompts that received no digit
    pub unanswered_prompts: u32,
    /// Set when the call connects, cleared on completion
    pub call_start_time: Option<Instant>,
    /// Duration reported by the provider's final status callback
    pub call_duration_secs: u64,
}

impl CallStats {
    /// Count one unanswered prompt
    pub fn record_silence(&mut self) {
        self.silence_events += 1;
        self.unanswered_prompts += 1;
    }

    /// Clear per-call state for the next call on this process
    pub fn reset(&mut self) {
        self.silence_events = 0;
        self.unanswered_prompts = 0;
        self.call_start_time = None;
    }

    /// Serializable view of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            silence_events: self.silence_events,
            unanswered_prompts: self.unanswered_prompts,
            call_duration_secs: self.call_duration_secs,
            call_in_progress: self.call_start_time.is_some(),
        }
    }
}

/// Point-in-time copy of [`CallStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub silence_events: u32,
    pub unanswered_prompts: u32,
    pub call_duration_secs: u64,
    pub call_in_progress: bool,
}

/// Summary logged when the provider reports the call finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSummary {
    pub call_sid: String,
    pub status: String,
    /// Provider-reported duration
    pub duration_secs: u64,
    /// Elapsed time since this daemon saw the call start, if it did
    pub observed_secs: Option<u64>,
    pub silence_events: u32,
    pub unanswered_prompts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_silence_moves_both_counters() {
        let mut stats = CallStats::default();
        stats.record_silence();
        stats.record_silence();
        assert_eq!(stats.silence_events, 2);
        assert_eq!(stats.unanswered_prompts, 2);
    }

    #[test]
    fn test_reset_keeps_duration() {
        let mut stats = CallStats {
            silence_events: 4,
            unanswered_prompts: 4,
            call_start_time: Some(Instant::now()),
            call_duration_secs: 42,
        };
        stats.reset();

        let snapshot = stats.snapshot();
        assert_eq!(
            snapshot,
            StatsSnapshot {
                silence_events: 0,
                unanswered_prompts: 0,
                call_duration_secs: 42,
                call_in_progress: false,
            }
        );
    }
}
