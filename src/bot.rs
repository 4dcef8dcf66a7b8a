//! Per-turn dispatcher
//!
//! Every inbound activity runs through [`NilesBot::on_turn`]: load the
//! conversation and user scopes, dispatch on the activity kind, then save
//! both scopes exactly once, whatever branch ran (including failures).

mod interrupt;
pub mod messages;

use interrupt::InterruptHandler;

use crate::dialog::{DialogError, DialogSet, DialogTurnStatus};
use crate::issue_flow::{seed_options, CreateIssueDialog, CREATE_ISSUE_DIALOG};
use crate::issue_service::IssueService;
use crate::notifier::{NotifyError, ProactiveNotifier};
use crate::recognizer::{Intent, Recognizer, RecognizerError};
use crate::record_log::{ChannelLog, JobLog, LogListing};
use crate::state_store::{ScopeKey, ScopedState, StateError, StateStore};
use crate::transport::{Activity, ActivityKind, ConversationResumer, OutgoingMessage, TurnContext};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Dialog(#[from] DialogError),
    #[error(transparent)]
    Recognizer(#[from] RecognizerError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Identity and policy knobs for the bot
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub bot_name: String,
    pub trusted_senders: Vec<String>,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            bot_name: "Niles".to_string(),
            trusted_senders: vec!["probot".to_string()],
        }
    }
}

/// Plain-text commands answered straight from the logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListingCommand {
    Jobs,
    Channels,
}

impl ListingCommand {
    fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "show" | "show jobs" => Some(ListingCommand::Jobs),
            "show channels" => Some(ListingCommand::Channels),
            _ => None,
        }
    }
}

pub struct NilesBot {
    store: Arc<dyn StateStore>,
    recognizer: Arc<dyn Recognizer>,
    dialogs: DialogSet,
    interrupts: InterruptHandler,
    notifier: Arc<ProactiveNotifier>,
    jobs: JobLog,
    channels: ChannelLog,
    bot_name: String,
}

impl NilesBot {
    pub fn new(
        store: Arc<dyn StateStore>,
        recognizer: Arc<dyn Recognizer>,
        issues: Arc<dyn IssueService>,
        resumer: Arc<dyn ConversationResumer>,
        settings: BotSettings,
    ) -> Self {
        let jobs = JobLog::new(store.clone());
        let channels = ChannelLog::new(store.clone());
        let notifier = Arc::new(ProactiveNotifier::new(
            channels.clone(),
            jobs.clone(),
            resumer,
        ));
        let dialogs =
            DialogSet::new().with(Arc::new(CreateIssueDialog::new(jobs.clone(), issues)));
        Self {
            store,
            recognizer,
            dialogs,
            interrupts: InterruptHandler::new(&settings.trusted_senders, notifier.clone()),
            notifier,
            jobs,
            channels,
            bot_name: settings.bot_name,
        }
    }

    pub fn notifier(&self) -> Arc<ProactiveNotifier> {
        self.notifier.clone()
    }

    pub fn jobs(&self) -> &JobLog {
        &self.jobs
    }

    pub fn channels(&self) -> &ChannelLog {
        &self.channels
    }

    /// Run one turn and return the replies it produced
    pub async fn on_turn(&self, activity: Activity) -> Result<Vec<OutgoingMessage>, TurnError> {
        let mut turn = TurnContext::new(activity);
        let (conversation_key, user_key) = {
            let activity = turn.activity();
            (
                ScopeKey::conversation(&activity.channel_id, &activity.conversation.id),
                ScopeKey::user(&activity.channel_id, &activity.from.id),
            )
        };
        let mut conversation = ScopedState::load(self.store.as_ref(), conversation_key).await?;
        let mut user = ScopedState::load(self.store.as_ref(), user_key).await?;

        let outcome = self.dispatch(&mut turn, &mut conversation, &mut user).await;

        let conversation_saved = conversation.save(self.store.as_ref()).await;
        let user_saved = user.save(self.store.as_ref()).await;

        if let Err(e) = &outcome {
            tracing::error!(
                conversation_id = %turn.activity().conversation.id,
                error = %e,
                "Turn failed"
            );
        }
        outcome?;
        conversation_saved?;
        user_saved?;
        Ok(turn.into_replies())
    }

    async fn dispatch(
        &self,
        turn: &mut TurnContext,
        conversation: &mut ScopedState,
        user: &mut ScopedState,
    ) -> Result<(), TurnError> {
        let kind = turn.activity().kind;
        match kind {
            ActivityKind::Message => self.on_message(turn, conversation, user).await,
            ActivityKind::ConversationUpdate => self.on_members_added(turn).await,
            _ => {
                tracing::debug!(?kind, "Ignoring activity");
                Ok(())
            }
        }
    }

    async fn on_message(
        &self,
        turn: &mut TurnContext,
        conversation: &mut ScopedState,
        user: &mut ScopedState,
    ) -> Result<(), TurnError> {
        turn.activity_mut().remove_recipient_mention();

        if let Some(command) = ListingCommand::parse(turn.activity().text()) {
            let listing = self.listing(command).await?;
            turn.send(listing.render());
            return Ok(());
        }

        let recognized = self.recognizer.recognize(turn.activity().text()).await?;
        let intent = recognized.top_intent;
        tracing::debug!(%intent, score = recognized.score, "Recognized message");

        let mut dc = self.dialogs.create_context(turn, conversation, user)?;

        if let Some(interruption) = self.interrupts.check(&mut dc, intent).await? {
            tracing::debug!(?interruption, "Turn interrupted");
            return Ok(());
        }

        let result = dc.continue_dialog().await?;
        if dc.turn().responded() {
            return Ok(());
        }

        match result.status {
            DialogTurnStatus::Empty => match intent {
                Intent::Greeting => dc.turn_mut().send(messages::greeting(&self.bot_name)),
                Intent::CreateIssue => {
                    dc.begin_dialog(CREATE_ISSUE_DIALOG, seed_options(&recognized))
                        .await?;
                }
                _ => {
                    dc.turn_mut().send(messages::NOT_UNDERSTOOD);
                    dc.turn_mut().send(messages::help());
                }
            },
            DialogTurnStatus::Waiting => {}
            DialogTurnStatus::Complete => {
                dc.end_dialog(result.result).await?;
            }
            DialogTurnStatus::Cancelled => {
                dc.cancel_all().await?;
            }
        }
        Ok(())
    }

    async fn on_members_added(&self, turn: &mut TurnContext) -> Result<(), TurnError> {
        let bot_id = turn.activity().recipient.id.clone();
        let added = turn.activity().members_added.clone();
        for member in added {
            if member.id == bot_id {
                turn.send(messages::added_to_conversation(&self.bot_name));
                let record = self
                    .notifier
                    .register(turn.activity().conversation_reference())
                    .await?;
                turn.send(messages::saving_channel(&record.conversation.conversation.id));
            } else {
                turn.send(messages::welcome(&self.bot_name));
            }
        }
        Ok(())
    }

    async fn listing(&self, command: ListingCommand) -> Result<LogListing, StateError> {
        match command {
            ListingCommand::Jobs => self.jobs.list().await,
            ListingCommand::Channels => self.channels.list().await,
        }
    }
}
