//! Bot connector client used for proactive delivery

use super::{
    ConversationReference, ConversationResumer, OutgoingMessage, ProactiveCallback, TransportError,
    TurnContext,
};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use std::time::Duration;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Activity body posted back to the channel's service URL
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyActivity<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    from: &'a super::ChannelAccount,
    recipient: &'a super::ChannelAccount,
    conversation: &'a super::ConversationAccount,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggested_actions: Option<SuggestedActions<'a>>,
}

#[derive(Debug, Serialize)]
struct SuggestedActions<'a> {
    actions: Vec<ImBack<'a>>,
}

#[derive(Debug, Serialize)]
struct ImBack<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    title: &'a str,
    value: &'a str,
}

/// Delivers messages by POSTing activities to `{serviceUrl}/v3/conversations/{id}/activities`
pub struct ConnectorClient {
    client: Client,
    token: Option<String>,
}

impl ConnectorClient {
    pub fn new(token: Option<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(DELIVERY_TIMEOUT).build()?;
        Ok(Self { client, token })
    }

    /// The conversation id is pushed as one escaped path segment
    fn activities_url(reference: &ConversationReference) -> Result<Url, TransportError> {
        let invalid = |reason: String| TransportError::InvalidServiceUrl {
            url: reference.service_url.clone(),
            reason,
        };
        let mut url = Url::parse(&reference.service_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("not a base URL".to_string()))?
            .pop_if_empty()
            .extend([
                "v3",
                "conversations",
                reference.conversation.id.as_str(),
                "activities",
            ]);
        Ok(url)
    }

    async fn deliver(
        &self,
        reference: &ConversationReference,
        message: &OutgoingMessage,
    ) -> Result<(), TransportError> {
        let suggested_actions = (!message.suggested_actions.is_empty()).then(|| SuggestedActions {
            actions: message
                .suggested_actions
                .iter()
                .map(|a| ImBack {
                    kind: "imBack",
                    title: &a.title,
                    value: &a.value,
                })
                .collect(),
        });
        let body = ReplyActivity {
            kind: "message",
            from: &reference.bot,
            recipient: &reference.user,
            conversation: &reference.conversation,
            text: &message.text,
            reply_to_id: reference.activity_id.as_deref(),
            suggested_actions,
        };

        let mut request = self.client.post(Self::activities_url(reference)?).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|source| TransportError::Http {
            conversation_id: reference.conversation.id.clone(),
            source,
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Rejected {
                conversation_id: reference.conversation.id.clone(),
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl ConversationResumer for ConnectorClient {
    async fn continue_conversation(
        &self,
        reference: &ConversationReference,
        callback: ProactiveCallback,
    ) -> Result<(), TransportError> {
        let mut turn = TurnContext::new(reference.to_activity());
        callback(&mut turn);

        for message in turn.sent() {
            self.deliver(reference, message).await?;
        }
        tracing::debug!(
            conversation_id = %reference.conversation.id,
            count = turn.sent().len(),
            "Delivered proactive messages"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::message_from;

    fn url_for(service_url: &str, conversation_id: &str) -> Result<Url, TransportError> {
        let mut activity = message_from("u1", conversation_id, "hi");
        activity.service_url = service_url.to_string();
        ConnectorClient::activities_url(&activity.conversation_reference())
    }

    #[test]
    fn test_activities_url_strips_trailing_slash() {
        let url = url_for("https://smba.example/amer/", "19:abc").unwrap();
        assert_eq!(
            url.as_str(),
            "https://smba.example/amer/v3/conversations/19:abc/activities"
        );
    }

    #[test]
    fn test_activities_url_keeps_conversation_id_in_one_segment() {
        let url = url_for("https://smba.example/", "19:abc/def?x#y").unwrap();
        assert_eq!(
            url.as_str(),
            "https://smba.example/v3/conversations/19:abc%2Fdef%3Fx%23y/activities"
        );
        assert!(url.query().is_none());

        let url = url_for("https://smba.example", "19:abc|thread;messageid=42").unwrap();
        let segments: Vec<&str> = url.path_segments().unwrap().collect();
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0], "v3");
        assert_eq!(segments[3], "activities");
    }

    #[test]
    fn test_activities_url_rejects_bad_service_url() {
        assert!(matches!(
            url_for("not a url", "c1"),
            Err(TransportError::InvalidServiceUrl { .. })
        ));
    }
}
