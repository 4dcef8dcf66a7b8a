//! Step contract between the engine and concrete dialogs

use super::{DialogError, Prompt};
use crate::state_store::ScopedState;
use crate::transport::TurnContext;
use async_trait::async_trait;
use serde_json::Value;

/// What a step wants the engine to do next
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Send the prompt and end the turn; the reply feeds the next step
    Suspend(Prompt),
    /// Advance to the next step immediately, handing it this value
    Proceed(Option<Value>),
    /// Pop this dialog, handing the value to the parent (or the caller)
    Complete(Option<Value>),
    /// Start a child dialog; its result feeds this dialog's next step
    Push { dialog_id: String, options: Value },
}

/// Everything a step may touch during one turn
pub struct StepContext<'a> {
    pub turn: &'a mut TurnContext,
    /// User-scoped state for the sender of this turn
    pub user: &'a mut ScopedState,
    pub dialog_id: &'a str,
    pub options: &'a Value,
    pub index: usize,
    /// Reply to the previous prompt, or the value the previous step proceeded with
    pub result: Option<Value>,
}

impl StepContext<'_> {
    pub fn result_text(&self) -> Option<&str> {
        self.result
            .as_ref()
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn failure(&self, message: impl Into<String>) -> DialogError {
        DialogError::Step {
            dialog_id: self.dialog_id.to_string(),
            index: self.index,
            message: message.into(),
        }
    }
}

/// A named waterfall of steps
#[async_trait]
pub trait Dialog: Send + Sync {
    fn id(&self) -> &str;

    fn step_count(&self) -> usize;

    async fn run_step(&self, step: &mut StepContext<'_>) -> Result<StepOutcome, DialogError>;

    /// Called for each frame removed by `cancel_all`
    async fn on_cancel(&self, _step: &mut StepContext<'_>) -> Result<(), DialogError> {
        Ok(())
    }
}
