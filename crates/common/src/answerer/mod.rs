//! Answer backend client
//!
//! Talks to the external RAG answering service in two modes: one
//! buffered JSON exchange, or a line-oriented event stream decoded by
//! [`SseDecoder`]. The backend and the relay spell several response
//! fields differently; [`AnswerReply`] absorbs both spellings.

mod stream;

pub use stream::{decode_events, EventStream, SseDecoder, StreamEvent, StreamMetadata};

use crate::config::BackendConfig;
use crate::errors::AppError;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// A question plus the options governing how it is answered.
///
/// Optional sampling parameters are omitted from the wire entirely when
/// unset so the backend applies its own defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    /// Absent and blank are equivalent; receivers must reject both
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub model: String,

    #[serde(
        rename = "chatId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub chat_id: Option<Uuid>,

    #[serde(default)]
    pub evaluate_sources: bool,
    #[serde(default)]
    pub use_reranker: bool,
    #[serde(default)]
    pub use_multi_query: bool,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// Number of documents to retrieve; `k` on the wire
    #[serde(rename = "k", default, skip_serializing_if = "Option::is_none")]
    pub retrieval_k: Option<i32>,
    /// Number of documents to retrieve before reranking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_k: Option<i32>,
}

fn default_temperature() -> f64 {
    1.0
}

impl Default for AskRequest {
    fn default() -> Self {
        Self {
            question: String::new(),
            model: String::new(),
            chat_id: None,
            evaluate_sources: false,
            use_reranker: false,
            use_multi_query: false,
            temperature: default_temperature(),
            top_p: None,
            top_k: None,
            frequency_penalty: None,
            presence_penalty: None,
            repetition_penalty: None,
            seed: None,
            retrieval_k: None,
            rerank_k: None,
        }
    }
}

/// Descriptive record carried with each retrieved source
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult,
)]
pub struct SourceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(
        rename = "lastModified",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

/// A retrieved document excerpt attached to an answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedSource {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: SourceMetadata,
}

/// Normalized answer, whichever side produced it.
///
/// The backend says `answer`/`processing_time`/`source_evaluation`;
/// the relay says `text`/`processingTime`/`evaluation`. Serialization
/// always uses the relay spelling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerReply {
    #[serde(default, alias = "answer")]
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(
        rename = "processingTime",
        alias = "processing_time",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub processing_time: Option<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<RetrievedSource>,

    #[serde(
        rename = "evaluation",
        alias = "source_evaluation",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub evaluation: Option<String>,

    /// Present only when the relay answered; the backend never echoes it
    #[serde(
        rename = "chatId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub chat_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,

    #[serde(
        rename = "promptTokens",
        alias = "prompt_tokens",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub prompt_tokens: Option<i32>,

    #[serde(
        rename = "completionTokens",
        alias = "completion_tokens",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub completion_tokens: Option<i32>,

    #[serde(
        rename = "totalTokens",
        alias = "total_tokens",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub total_tokens: Option<i32>,
}

/// One entry in the backend's model catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub description: String,
}

/// The model catalog: available models keyed by name, plus the
/// backend's default choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCatalog {
    pub models: BTreeMap<String, ModelDescriptor>,
    pub default: String,
}

impl ModelCatalog {
    /// Choose the active model: keep `current` when still listed, else
    /// the catalog default, else the first listed name. `None` when the
    /// catalog is empty.
    pub fn choose(&self, current: Option<&str>) -> Option<String> {
        if let Some(name) = current {
            if self.models.contains_key(name) {
                return Some(name.to_string());
            }
        }

        if self.models.contains_key(&self.default) {
            return Some(self.default.clone());
        }

        self.models.keys().next().cloned()
    }
}

/// HTTP client for the external answering service
#[derive(Clone)]
pub struct AnswerClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl AnswerClient {
    /// Create a new client from configuration.
    ///
    /// The overall timeout is applied per buffered request, never to
    /// streaming calls, which are bounded only by the connect timeout.
    pub fn new(config: &BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
        }
    }

    /// Ask a question and wait for the complete answer
    pub async fn ask(&self, request: &AskRequest) -> crate::errors::Result<AnswerReply> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::upstream(format!("Answer backend unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let details = response.json::<serde_json::Value>().await.ok();
            return Err(AppError::Upstream {
                message: format!("Answer backend returned {}", status),
                status: Some(status.as_u16()),
                details,
            });
        }

        response.json::<AnswerReply>().await.map_err(Into::into)
    }

    /// Ask a question in streaming mode, returning decoded events
    pub async fn ask_stream(&self, request: &AskRequest) -> crate::errors::Result<EventStream> {
        let response = self.ask_stream_raw(request).await?;
        Ok(decode_events(response))
    }

    /// Ask a question in streaming mode, returning the raw HTTP
    /// response so callers can relay the bytes unmodified.
    pub async fn ask_stream_raw(
        &self,
        request: &AskRequest,
    ) -> crate::errors::Result<reqwest::Response> {
        let url = format!("{}/api/chat/stream", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::upstream(format!("Answer backend unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let details = response.json::<serde_json::Value>().await.ok();
            return Err(AppError::Upstream {
                message: format!("Answer backend returned {}", status),
                status: Some(status.as_u16()),
                details,
            });
        }

        Ok(response)
    }

    /// Fetch the model catalog
    pub async fn list_models(&self) -> crate::errors::Result<ModelCatalog> {
        let url = format!("{}/api/models", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::upstream(format!("Model catalog unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream {
                message: format!("Model catalog returned {}", status),
                status: Some(status.as_u16()),
                details: None,
            });
        }

        response.json::<ModelCatalog>().await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(names: &[&str], default: &str) -> ModelCatalog {
        ModelCatalog {
            models: names
                .iter()
                .map(|n| {
                    (
                        n.to_string(),
                        ModelDescriptor {
                            name: n.to_string(),
                            provider: "test".to_string(),
                            description: String::new(),
                        },
                    )
                })
                .collect(),
            default: default.to_string(),
        }
    }

    #[test]
    fn test_unset_parameters_are_omitted_from_wire() {
        let request = AskRequest {
            question: "What is CY Tech?".to_string(),
            model: "mistral".to_string(),
            ..Default::default()
        };

        let value = serde_json::to_value(&request).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj["question"], "What is CY Tech?");
        assert_eq!(obj["temperature"], 1.0);
        assert_eq!(obj["evaluate_sources"], false);
        assert!(!obj.contains_key("chatId"));
        assert!(!obj.contains_key("top_p"));
        assert!(!obj.contains_key("seed"));
        assert!(!obj.contains_key("k"));
        assert!(!obj.contains_key("rerank_k"));
    }

    #[test]
    fn test_set_parameters_use_wire_names() {
        let chat_id: Uuid = "3f1e1e7c-9a44-4d17-8a8a-0cbf6e1f2ab9".parse().unwrap();
        let request = AskRequest {
            question: "q".to_string(),
            model: "mistral".to_string(),
            chat_id: Some(chat_id),
            retrieval_k: Some(4),
            rerank_k: Some(8),
            top_p: Some(0.9),
            ..Default::default()
        };

        let value = serde_json::to_value(&request).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj["chatId"], chat_id.to_string());
        assert_eq!(obj["k"], 4);
        assert_eq!(obj["rerank_k"], 8);
        assert_eq!(obj["top_p"], 0.9);
        assert!(!obj.contains_key("retrieval_k"));
    }

    #[test]
    fn test_answer_reply_parses_backend_shape() {
        let reply: AnswerReply = serde_json::from_str(
            r#"{
                "answer": "CY Tech is an engineering school.",
                "model": "mistral",
                "processing_time": 2.4,
                "sources": [{"content": "excerpt", "metadata": {"title": "About", "type": "pdf"}}],
                "source_evaluation": "relevant",
                "prompt_tokens": 120,
                "completion_tokens": 40,
                "total_tokens": 160,
                "cost": 0.0021
            }"#,
        )
        .unwrap();

        assert_eq!(reply.text, "CY Tech is an engineering school.");
        assert_eq!(reply.processing_time, Some(2.4));
        assert_eq!(reply.evaluation.as_deref(), Some("relevant"));
        assert_eq!(reply.sources[0].metadata.kind.as_deref(), Some("pdf"));
        assert_eq!(reply.total_tokens, Some(160));
        assert_eq!(reply.chat_id, None);
    }

    #[test]
    fn test_answer_reply_parses_relay_shape() {
        let reply: AnswerReply = serde_json::from_str(
            r#"{
                "text": "Hello",
                "processingTime": 1.2,
                "evaluation": "ok",
                "chatId": "3f1e1e7c-9a44-4d17-8a8a-0cbf6e1f2ab9",
                "promptTokens": 10,
                "completionTokens": 5,
                "totalTokens": 15
            }"#,
        )
        .unwrap();

        assert_eq!(reply.text, "Hello");
        assert_eq!(reply.processing_time, Some(1.2));
        assert!(reply.chat_id.is_some());
        assert_eq!(reply.prompt_tokens, Some(10));
        assert!(reply.sources.is_empty());
    }

    #[test]
    fn test_catalog_keeps_current_selection_when_listed() {
        let catalog = catalog(&["gpt", "mistral"], "gpt");
        assert_eq!(catalog.choose(Some("mistral")), Some("mistral".to_string()));
    }

    #[test]
    fn test_catalog_falls_back_to_default_then_first() {
        let catalog = catalog(&["alpha", "beta"], "beta");
        assert_eq!(catalog.choose(Some("gone")), Some("beta".to_string()));
        assert_eq!(catalog.choose(None), Some("beta".to_string()));

        let dangling_default = self::catalog(&["alpha", "beta"], "gone");
        assert_eq!(dangling_default.choose(None), Some("alpha".to_string()));
    }

    #[test]
    fn test_empty_catalog_selects_nothing() {
        let catalog = catalog(&[], "none");
        assert_eq!(catalog.choose(Some("mistral")), None);
    }

    #[test]
    fn test_source_metadata_wire_field_names() {
        let metadata: SourceMetadata = serde_json::from_str(
            r#"{"title": "Doc", "type": "webpage", "lastModified": "2024-03-01", "size": 2048}"#,
        )
        .unwrap();

        assert_eq!(metadata.kind.as_deref(), Some("webpage"));
        assert_eq!(metadata.last_modified.as_deref(), Some("2024-03-01"));

        let value = serde_json::to_value(&metadata).unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("type"));
        assert!(obj.contains_key("lastModified"));
        assert!(!obj.contains_key("kind"));
    }
}
