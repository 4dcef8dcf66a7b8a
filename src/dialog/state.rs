//! Persisted dialog stack types

use crate::state_store::StateProperty;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Question a suspended step is waiting on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub text: String,
    /// Sent instead of `text` when the reply is rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<String>,
}

impl Prompt {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            retry: None,
        }
    }

    #[allow(dead_code)] // Used in tests
    pub fn with_retry(mut self, retry: impl Into<String>) -> Self {
        self.retry = Some(retry.into());
        self
    }

    pub fn retry_text(&self) -> &str {
        self.retry.as_deref().unwrap_or(&self.text)
    }
}

/// One running dialog on the stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogFrame {
    pub dialog_id: String,
    pub step_cursor: usize,
    #[serde(default)]
    pub options: Value,
    /// Set while the frame is suspended waiting for user input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Prompt>,
}

impl DialogFrame {
    pub fn new(dialog_id: impl Into<String>, options: Value) -> Self {
        Self {
            dialog_id: dialog_id.into(),
            step_cursor: 0,
            options,
            prompt: None,
        }
    }

    #[allow(dead_code)] // Used in tests
    pub fn is_waiting(&self) -> bool {
        self.prompt.is_some()
    }
}

/// Dialog stack persisted per conversation; the last frame is active
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialogState {
    pub stack: Vec<DialogFrame>,
}

impl StateProperty for DialogState {
    const TAG: &'static str = "DialogState";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogTurnStatus {
    /// No dialog is active
    Empty,
    /// The active dialog consumed the turn and awaits input
    Waiting,
    /// The stack emptied; `result` carries the last dialog's value
    Complete,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogTurnResult {
    pub status: DialogTurnStatus,
    pub result: Option<Value>,
}

impl DialogTurnResult {
    pub fn empty() -> Self {
        Self {
            status: DialogTurnStatus::Empty,
            result: None,
        }
    }

    pub fn waiting() -> Self {
        Self {
            status: DialogTurnStatus::Waiting,
            result: None,
        }
    }

    pub fn complete(result: Option<Value>) -> Self {
        Self {
            status: DialogTurnStatus::Complete,
            result,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: DialogTurnStatus::Cancelled,
            result: None,
        }
    }
}
