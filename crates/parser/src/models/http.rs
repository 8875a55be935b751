//! Remote inference backend
//!
//! Wire format:
//! - `POST {endpoint}/classify` `{"task", "text", "device"}` → `{"label", "confidence"}`
//! - `POST {endpoint}/extract` `{"task", "text", "device"}` → `{"entities": [{"type", "text", "confidence"}]}`
//!
//! Network errors and 5xx responses are retried with exponential backoff;
//! 4xx and malformed bodies fail immediately.

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use dompet_config::FieldModelConfig;
use dompet_core::{
    EntityModel, EntitySpan, Error, LabelPrediction, ModelTask, Result, TextClassifier,
};

/// Backoff before the first retry; doubles each attempt
const INITIAL_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    task: ModelTask,
    text: &'a str,
    device: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    entities: Vec<EntitySpan>,
}

/// Failure of a single request
#[derive(Debug)]
enum RequestError {
    /// Network failure or server error; worth retrying
    Transient(String),
    Fatal(String),
}

/// Shared request/retry logic for one remote model
#[derive(Debug, Clone)]
pub struct HttpModelClient {
    client: reqwest::Client,
    endpoint: String,
    task: ModelTask,
    device: &'static str,
    max_retries: u32,
    initial_backoff: Duration,
    model_id: String,
}

impl HttpModelClient {
    pub fn new(task: ModelTask, config: &FieldModelConfig, client: reqwest::Client) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .map(|e| e.trim_end_matches('/').to_string())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| Error::model_load(task, "no endpoint configured"))?;

        reqwest::Url::parse(&endpoint)
            .map_err(|e| Error::model_load(task, format!("invalid endpoint {}: {}", endpoint, e)))?;

        Ok(Self {
            client,
            endpoint,
            task,
            device: config.device.as_str(),
            max_retries: config.max_retries,
            initial_backoff: INITIAL_BACKOFF,
            model_id: config.display_id(task),
        })
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &InferenceRequest<'_>,
    ) -> std::result::Result<T, RequestError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| RequestError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let message = format!("HTTP {}: {}", status, detail);
            // 5xx errors are retryable, 4xx are not
            return Err(if status.is_server_error() {
                RequestError::Transient(message)
            } else {
                RequestError::Fatal(message)
            });
        }

        response
            .json()
            .await
            .map_err(|e| RequestError::Fatal(format!("invalid response: {}", e)))
    }

    /// POST with retry on transient failures
    async fn post<T: DeserializeOwned>(&self, path: &str, text: &str) -> Result<T> {
        let body = InferenceRequest {
            task: self.task,
            text,
            device: self.device,
        };

        let mut last_error = None;
        let mut backoff = self.initial_backoff;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tracing::warn!(
                    task = %self.task,
                    "Model request failed, retrying in {:?} (attempt {}/{})",
                    backoff,
                    attempt,
                    self.max_retries
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.execute(path, &body).await {
                Ok(value) => return Ok(value),
                Err(RequestError::Transient(message)) => last_error = Some(message),
                Err(RequestError::Fatal(message)) => {
                    return Err(Error::inference(self.task, message));
                },
            }
        }

        Err(Error::inference(
            self.task,
            last_error.unwrap_or_else(|| "max retries exceeded".to_string()),
        ))
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Classifier served by a remote model
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    inner: HttpModelClient,
}

impl HttpClassifier {
    pub fn new(inner: HttpModelClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl TextClassifier for HttpClassifier {
    async fn classify(&self, text: &str) -> Result<LabelPrediction> {
        self.inner.post("/classify", text).await
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

/// Entity extractor served by a remote model
#[derive(Debug, Clone)]
pub struct HttpEntityModel {
    inner: HttpModelClient,
}

impl HttpEntityModel {
    pub fn new(inner: HttpModelClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl EntityModel for HttpEntityModel {
    async fn extract(&self, text: &str) -> Result<Vec<EntitySpan>> {
        let response: ExtractResponse = self.inner.post("/extract", text).await?;
        Ok(response.entities)
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_endpoint() {
        let config = FieldModelConfig {
            backend: dompet_config::BackendKind::Http,
            ..FieldModelConfig::default()
        };
        let err = HttpModelClient::new(ModelTask::Intent, &config, reqwest::Client::new())
            .unwrap_err();
        assert!(err.is_model_load());
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        let config = FieldModelConfig::http("not a url");
        assert!(HttpModelClient::new(ModelTask::Intent, &config, reqwest::Client::new()).is_err());
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let config = FieldModelConfig::http("http://localhost:9000/");
        let client =
            HttpModelClient::new(ModelTask::Category, &config, reqwest::Client::new()).unwrap();
        assert_eq!(client.url("/classify"), "http://localhost:9000/classify");
        assert_eq!(client.model_id(), "category-http");
    }

    #[test]
    fn test_request_wire_format() {
        let body = InferenceRequest {
            task: ModelTask::Entities,
            text: "beli kopi",
            device: "cpu",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["task"], "entities");
        assert_eq!(json["device"], "cpu");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_retries_then_fails() {
        // Port 9 (discard) is closed on test hosts; connection is refused
        let config = FieldModelConfig::http("http://127.0.0.1:9");
        let client = HttpModelClient::new(ModelTask::Intent, &config, reqwest::Client::new())
            .unwrap()
            .with_initial_backoff(Duration::from_millis(1));
        let classifier = HttpClassifier::new(client);
        let err = classifier.classify("bayar kos").await.unwrap_err();
        assert!(matches!(err, Error::Inference { task: ModelTask::Intent, .. }));
    }
}
