//! Intent recognition
//!
//! The dispatcher only needs a top intent (plus optional entities); where it
//! comes from is behind the [`Recognizer`] trait.

mod http;

pub use http::HttpRecognizer;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecognizerError {
    #[error("Recognizer request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Recognizer returned status {0}")]
    Status(u16),
    #[error("Invalid recognizer pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Intents the bot understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    Greeting,
    CreateIssue,
    Cancel,
    Help,
    #[serde(other)]
    None,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Greeting => "Greeting",
            Intent::CreateIssue => "CreateIssue",
            Intent::Cancel => "Cancel",
            Intent::Help => "Help",
            Intent::None => "None",
        }
    }

    /// Parse an intent name; anything unknown maps to `None`
    pub fn from_name(name: &str) -> Self {
        match name {
            "Greeting" => Intent::Greeting,
            "CreateIssue" => Intent::CreateIssue,
            "Cancel" => Intent::Cancel,
            "Help" => Intent::Help,
            _ => Intent::None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizerResult {
    pub top_intent: Intent,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub entities: Map<String, Value>,
}

impl RecognizerResult {
    pub fn new(top_intent: Intent, score: f64) -> Self {
        Self {
            top_intent,
            score,
            entities: Map::new(),
        }
    }

    pub fn none() -> Self {
        Self::new(Intent::None, 0.0)
    }

    pub fn with_entity(mut self, name: &str, value: impl Into<String>) -> Self {
        self.entities
            .insert(name.to_string(), Value::String(value.into()));
        self
    }

    /// First string value of an entity, if present and non-blank.
    ///
    /// Entities may come back as a plain string or a list of strings.
    pub fn entity(&self, name: &str) -> Option<&str> {
        let value = self.entities.get(name)?;
        let text = match value {
            Value::String(s) => s.as_str(),
            Value::Array(items) => items.first()?.as_str()?,
            _ => return None,
        };
        let text = text.trim();
        (!text.is_empty()).then_some(text)
    }
}

#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, text: &str) -> Result<RecognizerResult, RecognizerError>;
}

/// Local pattern-based recognizer
pub struct KeywordRecognizer {
    rules: Vec<(Intent, Regex)>,
    repo: Regex,
    title: Regex,
}

impl KeywordRecognizer {
    pub fn new() -> Result<Self, RecognizerError> {
        let rules = vec![
            (
                Intent::Cancel,
                Regex::new(r"(?i)^\s*(cancel|stop|quit|never ?mind|abort)\b")?,
            ),
            (
                Intent::Help,
                Regex::new(r"(?i)^\s*(help|what can you do|\?)\s*[.!?]*\s*$")?,
            ),
            (
                Intent::CreateIssue,
                Regex::new(r"(?i)\b(create|open|file|new|raise|log)\b.*\b(issue|bug|ticket)s?\b")?,
            ),
            (
                Intent::Greeting,
                Regex::new(r"(?i)^\s*(hi|hello|hey|howdy|good (morning|afternoon|evening))\b")?,
            ),
        ];
        Ok(Self {
            rules,
            repo: Regex::new(r#"(?i)\b(?:in|on|for)\s+(?:the\s+)?(?:repo(?:sitory)?\s+)?([A-Za-z0-9_.\-/]+)\s+repo(?:sitory)?\b|\brepo(?:sitory)?\s+([A-Za-z0-9_.\-/]+)"#)?,
            title: Regex::new(r#"(?i)\b(?:titled|called|named)\s+"?([^"]+?)"?\s*$"#)?,
        })
    }
}

#[async_trait]
impl Recognizer for KeywordRecognizer {
    async fn recognize(&self, text: &str) -> Result<RecognizerResult, RecognizerError> {
        let Some(intent) = self
            .rules
            .iter()
            .find(|(_, pattern)| pattern.is_match(text))
            .map(|(intent, _)| *intent)
        else {
            return Ok(RecognizerResult::none());
        };

        let mut result = RecognizerResult::new(intent, 1.0);
        if intent == Intent::CreateIssue {
            if let Some(repo) = self
                .repo
                .captures(text)
                .and_then(|c| c.get(1).or_else(|| c.get(2)))
            {
                result = result.with_entity("repoName", repo.as_str());
            }
            if let Some(title) = self.title.captures(text).and_then(|c| c.get(1)) {
                result = result.with_entity("issueTitle", title.as_str().trim());
            }
        }
        Ok(result)
    }
}
