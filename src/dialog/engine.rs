//! Dialog registry and per-turn dialog context

use super::state::{DialogFrame, DialogState, DialogTurnResult, Prompt};
use super::step::{Dialog, StepContext, StepOutcome};
use super::DialogError;
use crate::state_store::ScopedState;
use crate::transport::TurnContext;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of dialogs by id
#[derive(Default, Clone)]
pub struct DialogSet {
    dialogs: HashMap<String, Arc<dyn Dialog>>,
}

impl DialogSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, dialog: Arc<dyn Dialog>) -> Self {
        self.dialogs.insert(dialog.id().to_string(), dialog);
        self
    }

    pub fn find(&self, id: &str) -> Result<Arc<dyn Dialog>, DialogError> {
        self.dialogs
            .get(id)
            .cloned()
            .ok_or_else(|| DialogError::UnknownDialog(id.to_string()))
    }

    /// Load the conversation's dialog stack and bind it to this turn
    pub fn create_context<'a>(
        &'a self,
        turn: &'a mut TurnContext,
        conversation: &'a mut ScopedState,
        user: &'a mut ScopedState,
    ) -> Result<DialogContext<'a>, DialogError> {
        let stack = conversation.get_or_default::<DialogState>()?.stack;
        Ok(DialogContext {
            dialogs: self,
            turn,
            conversation,
            user,
            stack,
        })
    }
}

/// Dialog stack plus the turn it is running in
pub struct DialogContext<'a> {
    dialogs: &'a DialogSet,
    turn: &'a mut TurnContext,
    conversation: &'a mut ScopedState,
    user: &'a mut ScopedState,
    stack: Vec<DialogFrame>,
}

impl DialogContext<'_> {
    pub fn turn(&self) -> &TurnContext {
        &*self.turn
    }

    pub fn turn_mut(&mut self) -> &mut TurnContext {
        &mut *self.turn
    }

    /// The frame on top of the stack, if any
    pub fn active(&self) -> Option<&DialogFrame> {
        self.stack.last()
    }

    /// Push a dialog and run it until it suspends or finishes
    pub async fn begin_dialog(
        &mut self,
        dialog_id: &str,
        options: Value,
    ) -> Result<DialogTurnResult, DialogError> {
        self.dialogs.find(dialog_id)?;
        let snapshot = self.stack.clone();
        self.stack.push(DialogFrame::new(dialog_id, options));
        tracing::debug!(dialog_id, depth = self.stack.len(), "Beginning dialog");
        self.run_guarded(snapshot, None).await
    }

    /// Route this turn's input to the active dialog
    pub async fn continue_dialog(&mut self) -> Result<DialogTurnResult, DialogError> {
        let Some(frame) = self.stack.last() else {
            return Ok(DialogTurnResult::empty());
        };

        let snapshot = self.stack.clone();
        let input = match &frame.prompt {
            Some(prompt) => {
                let text = self.turn.activity().text().trim().to_string();
                if text.is_empty() {
                    // Blank replies never satisfy a text prompt
                    let retry = prompt.retry_text().to_string();
                    self.turn.send(retry);
                    return Ok(DialogTurnResult::waiting());
                }
                if let Some(top) = self.stack.last_mut() {
                    top.prompt = None;
                    top.step_cursor += 1;
                }
                Some(Value::String(text))
            }
            None => None,
        };

        self.run_guarded(snapshot, input).await
    }

    /// Resend the active prompt, if the active dialog is waiting
    pub fn reprompt(&mut self) {
        if let Some(prompt) = self.stack.last().and_then(|f| f.prompt.as_ref()) {
            self.turn.send(prompt.text.clone());
        }
    }

    /// Pop the active dialog and resume its parent with `result`
    pub async fn end_dialog(
        &mut self,
        result: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        let snapshot = self.stack.clone();
        if self.stack.pop().is_none() {
            return Ok(DialogTurnResult::complete(result));
        }
        self.advance_parent();
        self.run_guarded(snapshot, result).await
    }

    /// Remove every frame, giving each dialog a chance to clean up
    pub async fn cancel_all(&mut self) -> Result<DialogTurnResult, DialogError> {
        while let Some(frame) = self.stack.pop() {
            let Ok(dialog) = self.dialogs.find(&frame.dialog_id) else {
                tracing::warn!(dialog_id = %frame.dialog_id, "Dropping frame of unknown dialog");
                continue;
            };
            let mut step = StepContext {
                turn: &mut *self.turn,
                user: &mut *self.user,
                dialog_id: &frame.dialog_id,
                options: &frame.options,
                index: frame.step_cursor,
                result: None,
            };
            if let Err(e) = dialog.on_cancel(&mut step).await {
                tracing::warn!(dialog_id = %frame.dialog_id, error = %e, "Dialog cleanup failed");
            }
        }
        self.persist()?;
        Ok(DialogTurnResult::cancelled())
    }

    /// Run the stack; on failure put it back the way it was
    async fn run_guarded(
        &mut self,
        snapshot: Vec<DialogFrame>,
        result: Option<Value>,
    ) -> Result<DialogTurnResult, DialogError> {
        match self.run(result).await {
            Ok(outcome) => {
                self.persist()?;
                Ok(outcome)
            }
            Err(e) => {
                self.stack = snapshot;
                self.persist()?;
                Err(e)
            }
        }
    }

    async fn run(&mut self, mut result: Option<Value>) -> Result<DialogTurnResult, DialogError> {
        loop {
            let Some(frame) = self.stack.last() else {
                return Ok(DialogTurnResult::complete(result));
            };
            let dialog = self.dialogs.find(&frame.dialog_id)?;
            let index = frame.step_cursor;

            if index >= dialog.step_count() {
                // Ran past the last step: implicit completion
                self.stack.pop();
                self.advance_parent();
                continue;
            }

            let dialog_id = frame.dialog_id.clone();
            let options = frame.options.clone();
            let outcome = {
                let mut step = StepContext {
                    turn: &mut *self.turn,
                    user: &mut *self.user,
                    dialog_id: &dialog_id,
                    options: &options,
                    index,
                    result: result.take(),
                };
                dialog.run_step(&mut step).await?
            };

            match outcome {
                StepOutcome::Suspend(prompt) => {
                    self.suspend(prompt);
                    return Ok(DialogTurnResult::waiting());
                }
                StepOutcome::Proceed(value) => {
                    if let Some(top) = self.stack.last_mut() {
                        top.step_cursor += 1;
                    }
                    result = value;
                }
                StepOutcome::Complete(value) => {
                    tracing::debug!(dialog_id = %dialog_id, "Dialog completed");
                    self.stack.pop();
                    self.advance_parent();
                    result = value;
                }
                StepOutcome::Push { dialog_id, options } => {
                    self.dialogs.find(&dialog_id)?;
                    self.stack.push(DialogFrame::new(dialog_id, options));
                    result = None;
                }
            }
        }
    }

    fn suspend(&mut self, prompt: Prompt) {
        self.turn.send(prompt.text.clone());
        if let Some(top) = self.stack.last_mut() {
            top.prompt = Some(prompt);
        }
    }

    /// The parent's pushing step is done once its child returns
    fn advance_parent(&mut self) {
        if let Some(parent) = self.stack.last_mut() {
            parent.prompt = None;
            parent.step_cursor += 1;
        }
    }

    fn persist(&mut self) -> Result<(), DialogError> {
        if self.stack.is_empty() {
            self.conversation.remove::<DialogState>();
        } else {
            self.conversation.set(&DialogState {
                stack: self.stack.clone(),
            })?;
        }
        Ok(())
    }
}
