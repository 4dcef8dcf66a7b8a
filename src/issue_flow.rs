//! Issue-collection dialog
//!
//! Five steps: merge any seeded values into the user's in-progress issue,
//! ask for the repo, the title and the body (each only if still missing),
//! then start a job and hand the issue to the webhook.

#[cfg(test)]
mod proptests;

use crate::dialog::{Dialog, DialogError, Prompt, StepContext, StepOutcome};
use crate::issue_service::{IssueService, NewIssue};
use crate::recognizer::RecognizerResult;
use crate::record_log::JobLog;
use crate::state_store::StateProperty;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const CREATE_ISSUE_DIALOG: &str = "CreateIssueDialog";

/// Fields collected by the flow, in prompt order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueField {
    RepoName,
    Title,
    Body,
}

impl IssueField {
    pub const ALL: [IssueField; 3] = [IssueField::RepoName, IssueField::Title, IssueField::Body];

    pub fn prompt(self) -> &'static str {
        match self {
            IssueField::RepoName => "In what repo would you like to create the issue?",
            IssueField::Title => "What should the title of the issue be?",
            IssueField::Body => "What would you like to include in the body?",
        }
    }

    /// Recognizer entity (and dialog option key) that can pre-fill the field
    pub fn entity(self) -> &'static str {
        match self {
            IssueField::RepoName => "repoName",
            IssueField::Title => "issueTitle",
            IssueField::Body => "issueBody",
        }
    }
}

/// The user's in-progress issue. Each field is written at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCollectionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl StateProperty for IssueCollectionState {
    const TAG: &'static str = "CreateIssueState";
}

impl IssueCollectionState {
    fn slot(&mut self, field: IssueField) -> &mut Option<String> {
        match field {
            IssueField::RepoName => &mut self.repo_name,
            IssueField::Title => &mut self.title,
            IssueField::Body => &mut self.body,
        }
    }

    /// The field's value, treating blanks as unset
    pub fn field(&self, field: IssueField) -> Option<&str> {
        let value = match field {
            IssueField::RepoName => &self.repo_name,
            IssueField::Title => &self.title,
            IssueField::Body => &self.body,
        };
        value.as_deref().filter(|v| !v.trim().is_empty())
    }

    /// Set the field if it is still unset. Returns whether anything changed.
    pub fn fill(&mut self, field: IssueField, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() || self.field(field).is_some() {
            return false;
        }
        *self.slot(field) = Some(value.to_string());
        true
    }

    /// Fill unset fields from an options object keyed by entity name
    pub fn merge_options(&mut self, options: &Value) -> bool {
        let mut changed = false;
        for field in IssueField::ALL {
            if let Some(value) = options.get(field.entity()).and_then(Value::as_str) {
                changed |= self.fill(field, value);
            }
        }
        changed
    }
}

/// Dialog options pre-filling whatever the recognizer extracted
pub fn seed_options(recognized: &RecognizerResult) -> Value {
    let mut options = Map::new();
    for field in IssueField::ALL {
        if let Some(value) = recognized.entity(field.entity()) {
            options.insert(field.entity().to_string(), Value::String(value.to_string()));
        }
    }
    Value::Object(options)
}

pub struct CreateIssueDialog {
    jobs: JobLog,
    issues: Arc<dyn IssueService>,
}

impl CreateIssueDialog {
    pub fn new(jobs: JobLog, issues: Arc<dyn IssueService>) -> Self {
        Self { jobs, issues }
    }

    async fn finalize(&self, step: &mut StepContext<'_>) -> Result<StepOutcome, DialogError> {
        absorb_reply(step)?;
        let state = step.user.get_or_default::<IssueCollectionState>()?;
        let (Some(repo), Some(title), Some(body)) = (
            state.field(IssueField::RepoName),
            state.field(IssueField::Title),
            state.field(IssueField::Body),
        ) else {
            // User state is shared across conversations and may have been
            // cleared meanwhile; a nested pass asks only for what is missing.
            tracing::info!(
                dialog_id = step.dialog_id,
                "Issue details went missing, collecting again"
            );
            return Ok(StepOutcome::Push {
                dialog_id: CREATE_ISSUE_DIALOG.to_string(),
                options: json!({}),
            });
        };

        step.turn.send(format!(
            "Creating new issue with title: {title}\nAnd body: {body}\nIn the {repo} repo."
        ));

        let reference = step.turn.activity().conversation_reference();
        let job = self.jobs.create(reference).await?;
        step.turn.send(format!(
            "We're starting job {} for you. We'll notify you when it's complete.",
            job.id
        ));

        let issue = NewIssue {
            job_id: job.id.clone(),
            issue: title.to_string(),
        };
        if let Err(e) = self.issues.post_issue(&issue).await {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to post issue; job kept");
        }

        step.user.remove::<IssueCollectionState>();
        Ok(StepOutcome::Complete(Some(json!({ "jobId": job.id }))))
    }
}

/// Store the reply to the previous step's prompt in the field it asked for
fn absorb_reply(step: &mut StepContext<'_>) -> Result<(), DialogError> {
    let Some(previous) = step
        .index
        .checked_sub(2)
        .and_then(|i| IssueField::ALL.get(i).copied())
    else {
        return Ok(());
    };
    let Some(reply) = step.result_text().map(str::to_string) else {
        return Ok(());
    };
    let mut state = step.user.get_or_default::<IssueCollectionState>()?;
    if state.fill(previous, &reply) {
        step.user.set(&state)?;
    }
    Ok(())
}

fn initialize(step: &mut StepContext<'_>) -> Result<StepOutcome, DialogError> {
    let mut state = step.user.get_or_default::<IssueCollectionState>()?;
    if state.merge_options(step.options) {
        step.user.set(&state)?;
    }
    Ok(StepOutcome::Proceed(None))
}

fn collect(step: &mut StepContext<'_>, field: IssueField) -> Result<StepOutcome, DialogError> {
    absorb_reply(step)?;
    let state = step.user.get_or_default::<IssueCollectionState>()?;
    if state.field(field).is_some() {
        return Ok(StepOutcome::Proceed(None));
    }
    Ok(StepOutcome::Suspend(Prompt::text(field.prompt())))
}

#[async_trait]
impl Dialog for CreateIssueDialog {
    fn id(&self) -> &str {
        CREATE_ISSUE_DIALOG
    }

    fn step_count(&self) -> usize {
        IssueField::ALL.len() + 2
    }

    async fn run_step(&self, step: &mut StepContext<'_>) -> Result<StepOutcome, DialogError> {
        match step.index {
            0 => initialize(step),
            i if i <= IssueField::ALL.len() => collect(step, IssueField::ALL[i - 1]),
            _ => self.finalize(step).await,
        }
    }

    async fn on_cancel(&self, step: &mut StepContext<'_>) -> Result<(), DialogError> {
        step.user.remove::<IssueCollectionState>();
        Ok(())
    }
}
