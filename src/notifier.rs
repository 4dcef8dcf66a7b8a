//! Out-of-band delivery into stored conversations
//!
//! Runs outside any live turn. It only reads and updates the shared logs and
//! never touches conversation or user state, so it can race live turns on
//! the same conversation safely.

use crate::record_log::{ChannelLog, ChannelRecord, Completion, JobLog};
use crate::state_store::StateError;
use crate::transport::{ConversationReference, ConversationResumer, TransportError, TurnContext};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("No job with id {0}")]
    UnknownJob(String),
}

/// Outcome of a broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotifyReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCompletion {
    pub job_id: String,
    /// The job was already marked complete; nothing was sent
    pub already_completed: bool,
    pub delivered: bool,
}

pub struct ProactiveNotifier {
    channels: ChannelLog,
    jobs: JobLog,
    resumer: Arc<dyn ConversationResumer>,
}

impl ProactiveNotifier {
    pub fn new(channels: ChannelLog, jobs: JobLog, resumer: Arc<dyn ConversationResumer>) -> Self {
        Self {
            channels,
            jobs,
            resumer,
        }
    }

    /// Follow notifications in this conversation (one record per conversation)
    pub async fn register(
        &self,
        reference: ConversationReference,
    ) -> Result<ChannelRecord, NotifyError> {
        let record = self.channels.upsert(reference).await?;
        tracing::info!(
            channel_id = %record.id,
            conversation_id = %record.conversation.conversation.id,
            "Registered notification channel"
        );
        Ok(record)
    }

    /// Deliver `payload` to every registered channel.
    ///
    /// A channel that cannot be reached is logged and counted; it never stops
    /// delivery to the others.
    pub async fn notify_all(&self, payload: &str) -> Result<NotifyReport, NotifyError> {
        let channels = self.channels.records().await?;
        let deliveries = channels.iter().map(|record| async move {
            let outcome = self.deliver(&record.conversation, payload.to_string()).await;
            (record, outcome)
        });

        let mut report = NotifyReport::default();
        for (record, outcome) in futures::future::join_all(deliveries).await {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        channel_id = %record.id,
                        error = %e,
                        "Proactive delivery failed"
                    );
                    report.failed += 1;
                }
            }
        }
        tracing::info!(
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast finished"
        );
        Ok(report)
    }

    /// Mark a job complete and tell the conversation that started it.
    ///
    /// The flag is persisted before delivery, so a failed delivery does not
    /// leave the job open, and a repeated completion sends nothing.
    pub async fn complete_job(
        &self,
        job_id: &str,
        detail: Option<&str>,
    ) -> Result<JobCompletion, NotifyError> {
        let record = match self.jobs.mark_completed(job_id).await? {
            Completion::NotFound => return Err(NotifyError::UnknownJob(job_id.to_string())),
            Completion::AlreadyCompleted(_) => {
                tracing::debug!(job_id, "Job already completed");
                return Ok(JobCompletion {
                    job_id: job_id.to_string(),
                    already_completed: true,
                    delivered: false,
                });
            }
            Completion::Marked(record) => record,
        };

        let mut text = format!("Job {} is complete.", record.id);
        if let Some(detail) = detail.map(str::trim).filter(|d| !d.is_empty()) {
            text.push('\n');
            text.push_str(detail);
        }

        let delivered = match self.deliver(&record.conversation, text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Job completion delivery failed");
                false
            }
        };
        Ok(JobCompletion {
            job_id: record.id,
            already_completed: false,
            delivered,
        })
    }

    async fn deliver(
        &self,
        reference: &ConversationReference,
        text: String,
    ) -> Result<(), TransportError> {
        let callback = Box::new(move |turn: &mut TurnContext| turn.send(text));
        self.resumer.continue_conversation(reference, callback).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_store::StateStore;
    use crate::testing::{reference_to, MemoryStateStore, MockResumer};

    struct Fixture {
        notifier: ProactiveNotifier,
        resumer: Arc<MockResumer>,
        jobs: JobLog,
        channels: ChannelLog,
    }

    fn fixture(resumer: MockResumer) -> Fixture {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let resumer = Arc::new(resumer);
        let jobs = JobLog::new(store.clone());
        let channels = ChannelLog::new(store);
        Fixture {
            notifier: ProactiveNotifier::new(channels.clone(), jobs.clone(), resumer.clone()),
            resumer,
            jobs,
            channels,
        }
    }

    #[tokio::test]
    async fn test_notify_all_with_no_channels() {
        let f = fixture(MockResumer::new());
        let report = f.notifier.notify_all("build done").await.unwrap();
        assert_eq!(report, NotifyReport::default());
        assert!(f.resumer.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_channel_does_not_stop_broadcast() {
        let f = fixture(MockResumer::new().with_unreachable("c2"));
        for id in ["c1", "c2", "c3"] {
            f.notifier.register(reference_to(id)).await.unwrap();
        }

        let report = f.notifier.notify_all("build 42 passed").await.unwrap();
        assert_eq!(
            report,
            NotifyReport {
                delivered: 2,
                failed: 1
            }
        );
        assert_eq!(f.resumer.texts_for("c1"), vec!["build 42 passed"]);
        assert_eq!(f.resumer.texts_for("c3"), vec!["build 42 passed"]);
        assert!(f.resumer.texts_for("c2").is_empty());
    }

    #[tokio::test]
    async fn test_register_is_idempotent_per_conversation() {
        let f = fixture(MockResumer::new());
        let first = f.notifier.register(reference_to("c1")).await.unwrap();
        let second = f.notifier.register(reference_to("c1")).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(f.channels.get().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_complete_job_notifies_originating_conversation_once() {
        let f = fixture(MockResumer::new());
        let job = f.jobs.create(reference_to("c7")).await.unwrap();

        let outcome = f.notifier.complete_job(&job.id, Some("all green")).await.unwrap();
        assert!(outcome.delivered);
        assert!(!outcome.already_completed);
        assert_eq!(
            f.resumer.texts_for("c7"),
            vec![format!("Job {} is complete.\nall green", job.id)]
        );
        assert!(f.jobs.find(&job.id).await.unwrap().unwrap().completed);

        let again = f.notifier.complete_job(&job.id, None).await.unwrap();
        assert!(again.already_completed);
        assert_eq!(f.resumer.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_completion_delivery_keeps_flag() {
        let f = fixture(MockResumer::new().with_unreachable("c7"));
        let job = f.jobs.create(reference_to("c7")).await.unwrap();

        let outcome = f.notifier.complete_job(&job.id, None).await.unwrap();
        assert!(!outcome.delivered);
        assert!(f.jobs.find(&job.id).await.unwrap().unwrap().completed);
    }

    #[tokio::test]
    async fn test_complete_unknown_job() {
        let f = fixture(MockResumer::new());
        let err = f.notifier.complete_job("nope", None).await.unwrap_err();
        assert!(matches!(err, NotifyError::UnknownJob(id) if id == "nope"));
    }
}
