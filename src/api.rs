//! HTTP API for the bot
//!
//! The channel posts activities to `/api/messages`; external systems trigger
//! broadcasts and job completions through the other routes.

mod handlers;
mod types;

pub use handlers::create_router;

use crate::bot::NilesBot;
use crate::notifier::ProactiveNotifier;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<NilesBot>,
    pub notifier: Arc<ProactiveNotifier>,
}

impl AppState {
    pub fn new(bot: NilesBot) -> Self {
        let notifier = bot.notifier();
        Self {
            bot: Arc::new(bot),
            notifier,
        }
    }
}
