//! Client for a hosted NLU endpoint (LUIS v2 response shape)

use super::{Intent, Recognizer, RecognizerError, RecognizerResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PredictionResponse {
    top_scoring_intent: Option<ScoredIntent>,
    #[serde(default)]
    entities: Vec<PredictedEntity>,
}

#[derive(Debug, Deserialize)]
struct ScoredIntent {
    intent: String,
    #[serde(default)]
    score: f64,
}

#[derive(Debug, Deserialize)]
struct PredictedEntity {
    entity: String,
    #[serde(rename = "type")]
    kind: String,
}

pub struct HttpRecognizer {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpRecognizer {
    pub fn new(endpoint: String, api_key: Option<String>) -> Result<Self, RecognizerError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

impl From<PredictionResponse> for RecognizerResult {
    fn from(response: PredictionResponse) -> Self {
        let mut result = response
            .top_scoring_intent
            .map_or_else(RecognizerResult::none, |top| {
                RecognizerResult::new(Intent::from_name(&top.intent), top.score)
            });
        for entity in response.entities {
            result
                .entities
                .entry(entity.kind)
                .or_insert(Value::String(entity.entity));
        }
        result
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    async fn recognize(&self, text: &str) -> Result<RecognizerResult, RecognizerError> {
        let mut request = self.client.get(&self.endpoint).query(&[("q", text)]);
        if let Some(key) = &self.api_key {
            request = request.header("Ocp-Apim-Subscription-Key", key);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RecognizerError::Status(status.as_u16()));
        }
        let prediction: PredictionResponse = response.json().await?;
        Ok(prediction.into())
    }
}
