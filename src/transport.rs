//! Activities, turn context and the proactive delivery seam
//!
//! Inbound activities use the Bot Framework wire shape (camelCase JSON).
//! Replies produced during a live turn are collected on the [`TurnContext`]
//! and returned to the caller; proactive messages go through a
//! [`ConversationResumer`].

mod connector;

pub use connector::ConnectorClient;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error delivering to {conversation_id}: {source}")]
    Http {
        conversation_id: String,
        source: reqwest::Error,
    },
    #[error("Channel rejected delivery to {conversation_id} with status {status}")]
    Rejected { conversation_id: String, status: u16 },
    #[error("Invalid service URL {url}: {reason}")]
    InvalidServiceUrl { url: String, reason: String },
    #[error("Conversation {0} is unreachable")]
    #[allow(dead_code)] // Produced by test resumers and future channel adapters
    Unreachable(String),
}

/// Activity kinds the dispatcher distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivityKind {
    Message,
    ConversationUpdate,
    /// Synthesized for proactive (resumed) turns
    Event,
    #[serde(other)]
    Unknown,
}

/// A user or bot on a channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChannelAccount {
    #[allow(dead_code)] // Used in tests
    pub fn new(id: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.map(String::from),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub is_group: bool,
}

/// One inbound event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    #[serde(default)]
    pub id: Option<String>,
    pub channel_id: String,
    #[serde(default)]
    pub service_url: String,
    pub from: ChannelAccount,
    pub recipient: ChannelAccount,
    pub conversation: ConversationAccount,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub members_added: Vec<ChannelAccount>,
}

impl Activity {
    /// Handle sufficient to reach this conversation again later
    pub fn conversation_reference(&self) -> ConversationReference {
        ConversationReference {
            activity_id: self.id.clone(),
            user: self.from.clone(),
            bot: self.recipient.clone(),
            conversation: self.conversation.clone(),
            channel_id: self.channel_id.clone(),
            service_url: self.service_url.clone(),
        }
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }

    /// Remove mentions of the bot (`<at>Niles</at>`, `@Niles`) from the text
    pub fn remove_recipient_mention(&mut self) {
        let Some(text) = self.text.as_deref() else {
            return;
        };
        let names: Vec<&str> = [self.recipient.name.as_deref(), Some(self.recipient.id.as_str())]
            .into_iter()
            .flatten()
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            return;
        }
        let alternatives = names
            .iter()
            .map(|n| regex::escape(n))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = format!(
            r"(?i)[ \t]*(?:<at>\s*(?:{alternatives})\s*</at>|@(?:{alternatives})\b)[ \t]*"
        );
        let Ok(mention) = Regex::new(&pattern) else {
            return;
        };
        let stripped = mention.replace_all(text, " ");
        self.text = Some(stripped.trim().to_string());
    }
}

/// Opaque handle to resume a specific conversation later
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationReference {
    #[serde(default)]
    pub activity_id: Option<String>,
    pub user: ChannelAccount,
    pub bot: ChannelAccount,
    pub conversation: ConversationAccount,
    pub channel_id: String,
    pub service_url: String,
}

impl ConversationReference {
    /// Synthesized activity for a resumed turn
    pub fn to_activity(&self) -> Activity {
        Activity {
            kind: ActivityKind::Event,
            id: self.activity_id.clone(),
            channel_id: self.channel_id.clone(),
            service_url: self.service_url.clone(),
            from: self.user.clone(),
            recipient: self.bot.clone(),
            conversation: self.conversation.clone(),
            text: None,
            members_added: Vec::new(),
        }
    }
}

/// A reply button that posts its value back as the user's text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardAction {
    pub title: String,
    pub value: String,
}

impl CardAction {
    pub fn im_back(title: &str) -> Self {
        Self {
            title: title.to_string(),
            value: title.to_string(),
        }
    }
}

/// A message produced by the bot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<CardAction>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            suggested_actions: Vec::new(),
        }
    }

    pub fn with_actions(mut self, actions: impl IntoIterator<Item = CardAction>) -> Self {
        self.suggested_actions.extend(actions);
        self
    }
}

impl From<&str> for OutgoingMessage {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for OutgoingMessage {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

/// Context for one turn: the inbound activity plus the replies sent so far
#[derive(Debug)]
pub struct TurnContext {
    activity: Activity,
    outbox: Vec<OutgoingMessage>,
}

impl TurnContext {
    pub fn new(activity: Activity) -> Self {
        Self {
            activity,
            outbox: Vec::new(),
        }
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    pub fn activity_mut(&mut self) -> &mut Activity {
        &mut self.activity
    }

    pub fn send(&mut self, message: impl Into<OutgoingMessage>) {
        self.outbox.push(message.into());
    }

    /// Whether anything has been sent this turn
    pub fn responded(&self) -> bool {
        !self.outbox.is_empty()
    }

    pub fn sent(&self) -> &[OutgoingMessage] {
        &self.outbox
    }

    pub fn into_replies(self) -> Vec<OutgoingMessage> {
        self.outbox
    }
}

/// Work to run inside a resumed conversation
pub type ProactiveCallback = Box<dyn FnOnce(&mut TurnContext) + Send>;

/// Capability to resume a stored conversation outside any live turn
#[async_trait]
pub trait ConversationResumer: Send + Sync {
    /// Build a turn bound to `reference`, run `callback` on it, then deliver
    /// whatever the callback sent.
    async fn continue_conversation(
        &self,
        reference: &ConversationReference,
        callback: ProactiveCallback,
    ) -> Result<(), TransportError>;
}
