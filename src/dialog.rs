//! Stack-based waterfall dialog engine
//!
//! Dialogs are fixed sequences of steps. Each step returns a tagged
//! [`StepOutcome`]: suspend on a prompt, proceed to the next step, complete,
//! or push a child dialog. The frame stack is persisted in conversation
//! scope so a suspended step resumes on the next turn.

mod engine;
pub mod state;
mod step;

pub use engine::{DialogContext, DialogSet};
pub use state::{DialogTurnStatus, Prompt};
pub use step::{Dialog, StepContext, StepOutcome};

use crate::state_store::StateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DialogError {
    #[error("No dialog registered with id {0}")]
    UnknownDialog(String),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("Step {index} of dialog {dialog_id} failed: {message}")]
    Step {
        dialog_id: String,
        index: usize,
        message: String,
    },
}
