//! Conversation state: history, token budget and the bookkeeping around one
//! request/response exchange.

use shared::agent_api::ChatMessage;
use shared::format;
use shared::tokens::{TokenBudget, TokenStatus};

pub const GREETING: &str = "Hello! I'm DeepSeek-R1. How can I help you?";
pub const NO_RESPONSE: &str = "No response received, please retry";

/// What to do after the user submits a message.
#[derive(Debug, PartialEq, Eq)]
pub enum SendDecision {
    /// Send the whole history to the model
    Send(Vec<ChatMessage>),
    /// Blank input, nothing to do
    Ignore,
    /// The budget is spent; the message was recorded but not sent
    TokenLimitReached,
}

pub struct Conversation {
    history: Vec<ChatMessage>,
    budget: TokenBudget,
}

impl Conversation {
    pub fn new(history: Vec<ChatMessage>, token_limit: usize) -> Self {
        let mut budget = TokenBudget::new(token_limit);
        budget.recount(&history);
        Self { history, budget }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    /// Record the user's message and decide whether it can be sent.
    pub fn submit(&mut self, input: &str) -> SendDecision {
        let message = input.trim();
        if message.is_empty() {
            return SendDecision::Ignore;
        }
        tracing::debug!("user input: {:?}", message);

        self.history.push(ChatMessage::user(message));
        self.budget.recount(&self.history);

        if self.budget.status() == TokenStatus::Exhausted {
            tracing::warn!(
                "token limit reached ({}/{})",
                self.budget.used(),
                self.budget.limit()
            );
            return SendDecision::TokenLimitReached;
        }
        SendDecision::Send(self.history.clone())
    }

    /// Record the assistant side of an exchange. An empty reply is replaced by
    /// the transport error, if any, or a retry hint.
    pub fn complete(&mut self, response: &str, transport_error: Option<&str>) -> &ChatMessage {
        let content = if !response.is_empty() {
            response.to_string()
        } else if let Some(err) = transport_error {
            format!("Error: {}", err)
        } else {
            NO_RESPONSE.to_string()
        };
        self.history.push(ChatMessage::assistant(content));
        self.budget.recount(&self.history);
        &self.history[self.history.len() - 1]
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.budget.reset();
    }

    pub fn summary(&self) -> String {
        format::summarize(&self.history)
    }

    pub fn token_line(&self) -> String {
        match self.budget.status() {
            TokenStatus::Healthy => self.budget.label(),
            TokenStatus::ApproachingLimit | TokenStatus::Exhausted => {
                format!("{} (!)", self.budget.label())
            }
        }
    }
}
