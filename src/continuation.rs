//! Truncated-answer detection and the bounded continuation policy.

/// Suffixes that suggest the model stopped mid-answer.
///
/// `"step "` cannot match once the input is trimmed.
pub const INCOMPLETE_ENDINGS: &[&str] = &["...", "to be continued", "next step", "continued", "step "];

/// The user turn sent to ask the model to carry on.
pub const CONTINUE_PROMPT: &str = "Please continue";

/// Whether `answer` looks cut off.
pub fn detect(answer: &str) -> bool {
    let normalized = answer.to_lowercase();
    let normalized = normalized.trim();
    INCOMPLETE_ENDINGS
        .iter()
        .any(|ending| normalized.ends_with(ending))
}

/// Tracks whether the last answer is incomplete and how many consecutive
/// continuations it has already received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationTracker {
    max: u32,
    used: u32,
    incomplete: bool,
}

impl ContinuationTracker {
    pub fn new(max_continuations: u32) -> Self {
        Self {
            max: max_continuations,
            used: 0,
            incomplete: false,
        }
    }

    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    /// Continuations still allowed for the current answer.
    pub fn remaining(&self) -> u32 {
        self.max.saturating_sub(self.used)
    }

    /// Record the answer to a fresh question.
    pub fn record_answer(&mut self, looks_incomplete: bool) {
        self.used = 0;
        self.incomplete = looks_incomplete && self.max > 0;
        if looks_incomplete && self.max == 0 {
            tracing::warn!("answer looks incomplete but continuations are disabled");
        }
    }

    /// Record the answer to a continuation request.
    pub fn record_continuation(&mut self, looks_incomplete: bool) {
        self.used += 1;
        if looks_incomplete && self.used >= self.max {
            tracing::warn!(
                "answer still looks incomplete after {} continuations; stopping",
                self.used
            );
            self.incomplete = false;
        } else {
            self.incomplete = looks_incomplete;
        }
    }

    pub fn reset(&mut self) {
        self.used = 0;
        self.incomplete = false;
    }
}
