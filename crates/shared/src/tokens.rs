//! Token budget accounting for a conversation.
//!
//! Token counts are a heuristic weighted by character class, not a real
//! tokenizer: CJK ideographs are expensive, ASCII letters cheap.

use crate::agent_api::ChatMessage;

/// Estimate tokens for text.
///
/// CJK unified ideographs (U+4E00..=U+9FFF) weigh 1.5, ASCII letters 0.25,
/// everything else 0.5. The weighted sum is truncated.
pub fn estimate_tokens(text: &str) -> usize {
    let mut cjk = 0usize;
    let mut letters = 0usize;
    let mut other = 0usize;
    for c in text.chars() {
        if ('\u{4e00}'..='\u{9fff}').contains(&c) {
            cjk += 1;
        } else if c.is_ascii_alphabetic() {
            letters += 1;
        } else {
            other += 1;
        }
    }
    (cjk as f64 * 1.5 + letters as f64 * 0.25 + other as f64 * 0.5) as usize
}

/// Sum of the estimates for every message.
pub fn count_history(history: &[ChatMessage]) -> usize {
    history.iter().map(|m| estimate_tokens(&m.content)).sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Healthy,
    /// Above 90% of the limit
    ApproachingLimit,
    /// At or past the limit; no further requests
    Exhausted,
}

/// Running token usage against a fixed limit.
#[derive(Debug, Clone)]
pub struct TokenBudget {
    limit: usize,
    used: usize,
}

impl TokenBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    /// Recount from scratch over the whole history.
    pub fn recount(&mut self, history: &[ChatMessage]) {
        self.used = count_history(history);
    }

    pub fn reset(&mut self) {
        self.used = 0;
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn status(&self) -> TokenStatus {
        if self.used >= self.limit {
            TokenStatus::Exhausted
        } else if self.used as f64 > self.limit as f64 * 0.9 {
            TokenStatus::ApproachingLimit
        } else {
            TokenStatus::Healthy
        }
    }

    /// Status-line text, e.g. "Tokens used: 120/2500".
    pub fn label(&self) -> String {
        format!("Tokens used: {}/{}", self.used, self.limit)
    }
}
