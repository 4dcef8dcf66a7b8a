//! Cross-cutting intents handled before the active dialog sees the turn

use super::messages;
use super::TurnError;
use crate::dialog::DialogContext;
use crate::notifier::ProactiveNotifier;
use crate::recognizer::Intent;
use std::sync::Arc;

/// How a turn was short-circuited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    /// Cancel with an active dialog: the stack was cleared
    Cancelled,
    NothingToCancel,
    Help,
    /// A trusted automation posted a notification payload
    TrustedSender,
}

pub struct InterruptHandler {
    /// Lowercased sender ids whose messages are notification payloads
    trusted_senders: Vec<String>,
    notifier: Arc<ProactiveNotifier>,
}

impl InterruptHandler {
    pub fn new(trusted_senders: &[String], notifier: Arc<ProactiveNotifier>) -> Self {
        Self {
            trusted_senders: trusted_senders.iter().map(|s| s.to_lowercase()).collect(),
            notifier,
        }
    }

    pub fn is_trusted(&self, sender_id: &str) -> bool {
        let sender_id = sender_id.to_lowercase();
        self.trusted_senders.iter().any(|s| *s == sender_id)
    }

    /// Handle the turn if it is an interruption. First match wins:
    /// cancel, help, then trusted sender.
    pub async fn check(
        &self,
        dc: &mut DialogContext<'_>,
        intent: Intent,
    ) -> Result<Option<Interruption>, TurnError> {
        match intent {
            Intent::Cancel => {
                if dc.active().is_some() {
                    dc.cancel_all().await?;
                    dc.turn_mut().send(messages::CANCELLED);
                    return Ok(Some(Interruption::Cancelled));
                }
                dc.turn_mut().send(messages::NOTHING_TO_CANCEL);
                return Ok(Some(Interruption::NothingToCancel));
            }
            Intent::Help => {
                dc.turn_mut().send(messages::help());
                dc.reprompt();
                return Ok(Some(Interruption::Help));
            }
            _ => {}
        }

        let sender = dc.turn().activity().from.id.clone();
        if !self.is_trusted(&sender) {
            return Ok(None);
        }

        let payload = dc.turn().activity().text().to_string();
        dc.turn_mut()
            .send(messages::sender_acknowledged(&sender, &payload));
        if payload.is_empty() {
            tracing::debug!(sender = %sender, "Trusted sender posted an empty payload");
        } else {
            let report = self.notifier.notify_all(&payload).await?;
            tracing::info!(
                sender = %sender,
                delivered = report.delivered,
                failed = report.failed,
                "Relayed trusted sender notification"
            );
        }
        Ok(Some(Interruption::TrustedSender))
    }
}
