//! Client for the external issue-tracking webhook

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const POST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum IssueServiceError {
    #[error("Issue webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Issue webhook returned status {0}")]
    Status(u16),
}

/// Body posted to the webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIssue {
    pub job_id: String,
    pub issue: String,
}

#[async_trait]
pub trait IssueService: Send + Sync {
    async fn post_issue(&self, issue: &NewIssue) -> Result<(), IssueServiceError>;
}

/// Posts new issues as JSON to a fixed webhook URL
pub struct WebhookIssueService {
    client: Client,
    url: String,
}

impl WebhookIssueService {
    pub fn new(url: impl Into<String>) -> Result<Self, IssueServiceError> {
        let client = Client::builder().timeout(POST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl IssueService for WebhookIssueService {
    async fn post_issue(&self, issue: &NewIssue) -> Result<(), IssueServiceError> {
        let response = self.client.post(&self.url).json(issue).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IssueServiceError::Status(status.as_u16()));
        }
        tracing::debug!(job_id = %issue.job_id, "Posted issue to webhook");
        Ok(())
    }
}
