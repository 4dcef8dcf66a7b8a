//! Durable job and channel logs
//!
//! Both logs map a unique id to a conversation reference. The job log tracks
//! outstanding work started by a conversation; the channel log tracks
//! conversations that asked to receive notifications. Each log lives in its
//! own bot-wide scope and every mutation is an optimistic read-modify-write,
//! so concurrent turns from different conversations never drop each other's
//! records.

use crate::state_store::{read_property, update_property, ScopeKey, StateError, StateProperty, StateStore};
use crate::transport::ConversationReference;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// Marker describing one kind of log
pub trait LogKind: Send + Sync + 'static {
    const TAG: &'static str;
    /// Lowercase noun used in listings ("job", "channel")
    const NOUN: &'static str;
}

#[derive(Debug, Clone)]
pub enum Jobs {}

impl LogKind for Jobs {
    const TAG: &'static str = "JobLog";
    const NOUN: &'static str = "job";
}

#[derive(Debug, Clone)]
pub enum Channels {}

impl LogKind for Channels {
    const TAG: &'static str = "ChannelLog";
    const NOUN: &'static str = "channel";
}

/// One outstanding job or notification target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub conversation: ConversationReference,
    #[serde(default)]
    pub completed: bool,
}

impl LogRecord {
    fn new(id: String, conversation: ConversationReference) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            conversation,
            completed: false,
        }
    }

    /// Conversation id up to the first `|` (channels append thread suffixes)
    pub fn conversation_fragment(&self) -> &str {
        let id = self.conversation.conversation.id.as_str();
        id.split('|').next().unwrap_or(id)
    }
}

pub type ChannelRecord = LogRecord;

/// Persisted mapping of id to record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct LogEntries<K: LogKind> {
    records: BTreeMap<String, LogRecord>,
    #[serde(skip)]
    kind: PhantomData<K>,
}

impl<K: LogKind> Default for LogEntries<K> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            kind: PhantomData,
        }
    }
}

impl<K: LogKind> StateProperty for LogEntries<K> {
    const TAG: &'static str = K::TAG;
}

impl<K: LogKind> LogEntries<K> {
    fn fresh_id(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if !self.records.contains_key(&id) {
                return id;
            }
        }
    }
}

/// Outcome of `mark_completed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Marked(LogRecord),
    AlreadyCompleted(LogRecord),
    NotFound,
}

/// Printable view of a log; an empty log is its own case, not an empty table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogListing {
    Empty { noun: &'static str },
    Table { noun: &'static str, rows: Vec<LogRecord> },
}

impl LogListing {
    pub fn render(&self) -> String {
        match self {
            LogListing::Empty { noun } => format!("The {noun} log is empty."),
            LogListing::Table { noun, rows } => {
                let mut out = format!(
                    "| {} number | Conversation ID | Completed |\n| :--- | :---: | :---: |",
                    capitalize(noun)
                );
                for row in rows {
                    let _ = write!(
                        out,
                        "\n| {} | {} | {} |",
                        row.id,
                        row.conversation_fragment(),
                        row.completed
                    );
                }
                out
            }
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Handle on one log in the shared store
pub struct RecordLog<K: LogKind> {
    store: Arc<dyn StateStore>,
    scope: ScopeKey,
    kind: PhantomData<K>,
}

impl<K: LogKind> Clone for RecordLog<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            scope: self.scope.clone(),
            kind: PhantomData,
        }
    }
}

pub type JobLog = RecordLog<Jobs>;
pub type ChannelLog = RecordLog<Channels>;

impl<K: LogKind> RecordLog<K> {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            scope: ScopeKey::bot(K::TAG),
            kind: PhantomData,
        }
    }

    /// Add a record with a fresh unique id
    pub async fn create(&self, conversation: ConversationReference) -> Result<LogRecord, StateError> {
        let record = update_property(
            self.store.as_ref(),
            &self.scope,
            |entries: &mut LogEntries<K>| {
                let record = LogRecord::new(entries.fresh_id(), conversation.clone());
                entries.records.insert(record.id.clone(), record.clone());
                record
            },
        )
        .await?;
        tracing::info!(
            log = K::TAG,
            id = %record.id,
            conversation_id = %record.conversation.conversation.id,
            "Created log record"
        );
        Ok(record)
    }

    /// Create a record for this conversation, or refresh the existing one
    pub async fn upsert(&self, conversation: ConversationReference) -> Result<LogRecord, StateError> {
        update_property(
            self.store.as_ref(),
            &self.scope,
            |entries: &mut LogEntries<K>| {
                let existing = entries
                    .records
                    .values_mut()
                    .find(|r| r.conversation.conversation.id == conversation.conversation.id);
                if let Some(record) = existing {
                    record.conversation = conversation.clone();
                    return record.clone();
                }
                let record = LogRecord::new(entries.fresh_id(), conversation.clone());
                entries.records.insert(record.id.clone(), record.clone());
                record
            },
        )
        .await
    }

    /// Current contents of the log
    pub async fn get(&self) -> Result<BTreeMap<String, LogRecord>, StateError> {
        let entries: LogEntries<K> = read_property(self.store.as_ref(), &self.scope).await?;
        Ok(entries.records)
    }

    pub async fn find(&self, id: &str) -> Result<Option<LogRecord>, StateError> {
        Ok(self.get().await?.remove(id))
    }

    pub async fn mark_completed(&self, id: &str) -> Result<Completion, StateError> {
        update_property(
            self.store.as_ref(),
            &self.scope,
            |entries: &mut LogEntries<K>| match entries.records.get_mut(id) {
                Some(record) if record.completed => Completion::AlreadyCompleted(record.clone()),
                Some(record) => {
                    record.completed = true;
                    Completion::Marked(record.clone())
                }
                None => Completion::NotFound,
            },
        )
        .await
    }

    /// Records in creation order
    pub async fn records(&self) -> Result<Vec<LogRecord>, StateError> {
        let mut rows: Vec<LogRecord> = self.get().await?.into_values().collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }

    pub async fn list(&self) -> Result<LogListing, StateError> {
        let rows = self.records().await?;
        Ok(if rows.is_empty() {
            LogListing::Empty { noun: K::NOUN }
        } else {
            LogListing::Table {
                noun: K::NOUN,
                rows,
            }
        })
    }
}
