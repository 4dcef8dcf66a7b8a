//! Mock collaborators and activity builders for tests
//!
//! These stand in for the real store, recognizer, webhook and channel so the
//! bot can be driven turn by turn without any I/O.

use crate::db::PropertyMap;
use crate::issue_service::{IssueService, IssueServiceError, NewIssue};
use crate::recognizer::{Recognizer, RecognizerError, RecognizerResult};
use crate::state_store::{ScopeKey, StateError, StateStore, VersionedScope};
use crate::transport::{
    Activity, ActivityKind, ChannelAccount, ConversationAccount, ConversationReference,
    ConversationResumer, OutgoingMessage, ProactiveCallback, TransportError, TurnContext,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const BOT_ID: &str = "bot";
pub const BOT_NAME: &str = "Niles";
pub const CHANNEL_ID: &str = "test";

// ============================================================================
// Activities
// ============================================================================

fn activity(kind: ActivityKind, from: &str, conversation_id: &str) -> Activity {
    Activity {
        kind,
        id: Some(format!("act-{conversation_id}")),
        channel_id: CHANNEL_ID.to_string(),
        service_url: "https://channel.test/".to_string(),
        from: ChannelAccount::new(from, None),
        recipient: ChannelAccount::new(BOT_ID, Some(BOT_NAME)),
        conversation: ConversationAccount {
            id: conversation_id.to_string(),
            name: None,
            is_group: false,
        },
        text: None,
        members_added: Vec::new(),
    }
}

/// A message from `user_id` in `conversation_id`
pub fn message_from(user_id: &str, conversation_id: &str, text: &str) -> Activity {
    let mut activity = activity(ActivityKind::Message, user_id, conversation_id);
    activity.text = Some(text.to_string());
    activity
}

/// A membership change adding `members` (use [`BOT_ID`] for the bot itself)
pub fn members_added(conversation_id: &str, members: &[&str]) -> Activity {
    let mut activity = activity(ActivityKind::ConversationUpdate, "u1", conversation_id);
    activity.members_added = members
        .iter()
        .map(|id| ChannelAccount::new(*id, None))
        .collect();
    activity
}

pub fn reference_to(conversation_id: &str) -> ConversationReference {
    message_from("u1", conversation_id, "").conversation_reference()
}

// ============================================================================
// In-Memory State Store
// ============================================================================

/// Versioned in-memory store with the same semantics as the database
#[derive(Default)]
pub struct MemoryStateStore {
    scopes: Mutex<HashMap<String, (u64, PropertyMap)>>,
    writes: AtomicUsize,
    writes_by_scope: Mutex<HashMap<String, usize>>,
    rejected: Mutex<HashSet<String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of successful writes to one scope
    pub fn writes_to(&self, scope: &ScopeKey) -> usize {
        self.writes_by_scope
            .lock()
            .unwrap()
            .get(scope.as_str())
            .copied()
            .unwrap_or_default()
    }

    /// Make every later write to `scope` fail with a backend error
    pub fn reject_writes_to(&self, scope: &ScopeKey) {
        self.rejected.lock().unwrap().insert(scope.as_str().to_string());
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, scope: &ScopeKey) -> Result<VersionedScope, StateError> {
        Ok(self
            .scopes
            .lock()
            .unwrap()
            .get(scope.as_str())
            .map(|(version, properties)| VersionedScope {
                version: *version,
                properties: properties.clone(),
            })
            .unwrap_or_default())
    }

    async fn store(
        &self,
        scope: &ScopeKey,
        properties: &PropertyMap,
        expected_version: Option<u64>,
    ) -> Result<Option<u64>, StateError> {
        if self.rejected.lock().unwrap().contains(scope.as_str()) {
            return Err(StateError::Backend(format!("write to {scope} rejected")));
        }
        let mut scopes = self.scopes.lock().unwrap();
        let current = scopes.get(scope.as_str()).map_or(0, |(v, _)| *v);
        if expected_version.is_some_and(|expected| expected != current) {
            return Ok(None);
        }
        let next = current + 1;
        scopes.insert(scope.as_str().to_string(), (next, properties.clone()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self
            .writes_by_scope
            .lock()
            .unwrap()
            .entry(scope.as_str().to_string())
            .or_default() += 1;
        Ok(Some(next))
    }
}

// ============================================================================
// Mock Recognizer
// ============================================================================

/// Returns scripted results keyed by exact text; anything else is `None`
#[derive(Default)]
pub struct MockRecognizer {
    results: HashMap<String, RecognizerResult>,
    failures: HashSet<String>,
    seen: Mutex<Vec<String>>,
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, text: &str, result: RecognizerResult) -> Self {
        self.results.insert(text.to_string(), result);
        self
    }

    /// Fail recognition of exactly this text
    pub fn failing_on(mut self, text: &str) -> Self {
        self.failures.insert(text.to_string());
        self
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn recognize(&self, text: &str) -> Result<RecognizerResult, RecognizerError> {
        self.seen.lock().unwrap().push(text.to_string());
        if self.failures.contains(text) {
            return Err(RecognizerError::Status(503));
        }
        Ok(self
            .results
            .get(text)
            .cloned()
            .unwrap_or_else(RecognizerResult::none))
    }
}

// ============================================================================
// Mock Issue Service
// ============================================================================

/// Records every post; optionally fails after recording
#[derive(Default)]
pub struct MockIssueService {
    posts: Mutex<Vec<NewIssue>>,
    fail: bool,
}

impl MockIssueService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            posts: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn posts(&self) -> Vec<NewIssue> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl IssueService for MockIssueService {
    async fn post_issue(&self, issue: &NewIssue) -> Result<(), IssueServiceError> {
        self.posts.lock().unwrap().push(issue.clone());
        if self.fail {
            return Err(IssueServiceError::Status(503));
        }
        Ok(())
    }
}

// ============================================================================
// Mock Resumer
// ============================================================================

/// Runs proactive callbacks locally and records what they sent
#[derive(Default)]
pub struct MockResumer {
    deliveries: Mutex<Vec<(String, Vec<OutgoingMessage>)>>,
    unreachable: HashSet<String>,
}

impl MockResumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make delivery to this conversation fail
    pub fn with_unreachable(mut self, conversation_id: &str) -> Self {
        self.unreachable.insert(conversation_id.to_string());
        self
    }

    /// (conversation id, messages) per successful resume, in call order
    pub fn deliveries(&self) -> Vec<(String, Vec<OutgoingMessage>)> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn texts_for(&self, conversation_id: &str) -> Vec<String> {
        self.deliveries()
            .into_iter()
            .filter(|(id, _)| id == conversation_id)
            .flat_map(|(_, messages)| messages.into_iter().map(|m| m.text))
            .collect()
    }
}

#[async_trait]
impl ConversationResumer for MockResumer {
    async fn continue_conversation(
        &self,
        reference: &ConversationReference,
        callback: ProactiveCallback,
    ) -> Result<(), TransportError> {
        let conversation_id = reference.conversation.id.clone();
        if self.unreachable.contains(&conversation_id) {
            return Err(TransportError::Unreachable(conversation_id));
        }
        let mut turn = TurnContext::new(reference.to_activity());
        callback(&mut turn);
        self.deliveries
            .lock()
            .unwrap()
            .push((conversation_id, turn.into_replies()));
        Ok(())
    }
}
