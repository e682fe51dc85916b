//! Turn-based transcript accumulation and the coarse session status.

use std::fmt;

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Facilitator,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Facilitator => write!(f, "facilitator"),
        }
    }
}

/// One finalized utterance. Entries are append-only and never reordered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Listening,
    Thinking,
    Speaking,
    Error,
}

impl SessionStatus {
    /// A new session may only start from idle or from a prior error.
    pub fn can_start(self) -> bool {
        matches!(self, SessionStatus::Idle | SessionStatus::Error)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Listening => "listening",
            SessionStatus::Thinking => "thinking",
            SessionStatus::Speaking => "speaking",
            SessionStatus::Error => "error",
        };
        write!(f, "{label}")
    }
}

/// Pending transcript fragments for the turn in progress.
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    user: String,
    facilitator: String,
}

impl TurnAccumulator {
    pub fn push_user(&mut self, fragment: &str) {
        self.user.push_str(fragment);
    }

    pub fn push_facilitator(&mut self, fragment: &str) {
        self.facilitator.push_str(fragment);
    }

    /// Finalizes the turn: trims both accumulators and emits an entry
    /// for each non-empty one, user before facilitator. Both
    /// accumulators are left empty.
    pub fn finish_turn(&mut self) -> Vec<TranscriptEntry> {
        let user = std::mem::take(&mut self.user);
        let facilitator = std::mem::take(&mut self.facilitator);

        let mut entries = Vec::new();
        let user = user.trim();
        if !user.is_empty() {
            entries.push(TranscriptEntry {
                speaker: Speaker::User,
                text: user.to_string(),
            });
        }
        let facilitator = facilitator.trim();
        if !facilitator.is_empty() {
            entries.push(TranscriptEntry {
                speaker: Speaker::Facilitator,
                text: facilitator.to_string(),
            });
        }
        entries
    }

    pub fn clear(&mut self) {
        self.user.clear();
        self.facilitator.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_orders_user_before_facilitator() {
        let mut turn = TurnAccumulator::default();
        turn.push_facilitator("Hello");
        turn.push_facilitator(" world");
        turn.push_user("Hi");

        let entries = turn.finish_turn();
        assert_eq!(
            entries,
            vec![
                TranscriptEntry {
                    speaker: Speaker::User,
                    text: "Hi".to_string(),
                },
                TranscriptEntry {
                    speaker: Speaker::Facilitator,
                    text: "Hello world".to_string(),
                },
            ]
        );

        // Accumulators are reset for the next turn.
        assert!(turn.finish_turn().is_empty());
    }

    #[test]
    fn empty_turn_emits_nothing() {
        let mut turn = TurnAccumulator::default();
        assert!(turn.finish_turn().is_empty());
    }

    #[test]
    fn whitespace_only_fragments_emit_nothing() {
        let mut turn = TurnAccumulator::default();
        turn.push_user("   ");
        turn.push_facilitator(" \n ");
        assert!(turn.finish_turn().is_empty());
    }

    #[test]
    fn fragments_are_trimmed_once_finalized() {
        let mut turn = TurnAccumulator::default();
        turn.push_user(" what does it mean? ");
        let entries = turn.finish_turn();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "what does it mean?");
    }

    #[test]
    fn status_start_guard() {
        assert!(SessionStatus::Idle.can_start());
        assert!(SessionStatus::Error.can_start());
        assert!(!SessionStatus::Listening.can_start());
        assert!(!SessionStatus::Thinking.can_start());
        assert!(!SessionStatus::Speaking.can_start());
    }
}
