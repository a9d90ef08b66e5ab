//! Transport seam between the session controller and the chat service
//!
//! The controller only ever talks through [`ChatTransport`], so a
//! conversation can be scripted in tests without a network.
//! [`HttpTransport`] is the production implementation, pointed either
//! at the gateway (persisted mode) or straight at the answering
//! backend (playground mode, which has no history, deletion, or
//! analytics routes).

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ragline_common::answerer::{
    decode_events, AnswerReply, AskRequest, EventStream, ModelCatalog, StreamEvent,
};
use ragline_common::errors::{AppError, Result};
use serde::Serialize;
use uuid::Uuid;

use crate::message::StoredMessage;

/// Analytics record posted after a completed exchange
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRecord {
    pub chat_id: Uuid,
    pub model_used: String,
    pub was_streaming: bool,
    pub evaluate_sources: bool,
    pub use_reranker: bool,
    pub use_multi_query: bool,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

/// Everything the session controller needs from the outside world
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Ask a question and wait for the complete answer
    async fn ask(&self, request: &AskRequest) -> Result<AnswerReply>;

    /// Ask a question in streaming mode
    async fn ask_stream(&self, request: &AskRequest) -> Result<EventStream>;

    /// Fetch the stored history of one chat
    async fn chat_messages(&self, chat_id: Uuid) -> Result<Vec<StoredMessage>>;

    /// Delete one chat and everything it owns
    async fn delete_chat(&self, chat_id: Uuid) -> Result<()>;

    /// Record a completed exchange for usage reporting
    async fn log_exchange(&self, record: &ExchangeRecord) -> Result<()>;

    /// Fetch the model catalog
    async fn list_models(&self) -> Result<ModelCatalog>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    /// The gateway: persisted chats, analytics, bearer auth
    Gateway,
    /// The answering backend itself: exchanges and the catalog only
    Backend,
}

/// HTTP implementation of [`ChatTransport`]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
    target: Target,
}

impl HttpTransport {
    /// Transport for persisted sessions, authenticated against the
    /// gateway.
    pub fn gateway(base_url: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self::build(base_url.into(), Some(bearer_token.into()), Target::Gateway)
    }

    /// Transport for playground sessions, talking to the answering
    /// backend directly.
    pub fn backend(base_url: impl Into<String>) -> Self {
        Self::build(base_url.into(), None, Target::Backend)
    }

    fn build(base_url: String, bearer_token: Option<String>, target: Target) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token,
            target,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    fn service_name(&self) -> &'static str {
        match self.target {
            Target::Gateway => "Gateway",
            Target::Backend => "Answer backend",
        }
    }

    /// The buffered exchange route differs between the two targets
    fn ask_path(&self) -> &'static str {
        match self.target {
            Target::Gateway => "/api/chat/send",
            Target::Backend => "/api/chat",
        }
    }

    fn gateway_only(&self, operation: &str) -> Result<()> {
        if self.target == Target::Backend {
            return Err(AppError::Configuration {
                message: format!("{} is only available through the gateway", operation),
            });
        }
        Ok(())
    }

    fn unreachable_error(&self, error: reqwest::Error) -> AppError {
        AppError::upstream(format!("{} unreachable: {}", self.service_name(), error))
    }

    async fn error_response(&self, response: reqwest::Response) -> AppError {
        let status = response.status();
        let details = response.json::<serde_json::Value>().await.ok();
        AppError::Upstream {
            message: format!("{} returned {}", self.service_name(), status),
            status: Some(status.as_u16()),
            details,
        }
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn ask(&self, request: &AskRequest) -> Result<AnswerReply> {
        let response = self
            .request(reqwest::Method::POST, self.ask_path())
            .json(request)
            .send()
            .await
            .map_err(|e| self.unreachable_error(e))?;

        if !response.status().is_success() {
            return Err(self.error_response(response).await);
        }

        response.json::<AnswerReply>().await.map_err(Into::into)
    }

    async fn ask_stream(&self, request: &AskRequest) -> Result<EventStream> {
        let response = self
            .request(reqwest::Method::POST, "/api/chat/stream")
            .json(request)
            .send()
            .await
            .map_err(|e| self.unreachable_error(e))?;

        if !response.status().is_success() {
            return Err(self.error_response(response).await);
        }

        Ok(decode_events(response))
    }

    async fn chat_messages(&self, chat_id: Uuid) -> Result<Vec<StoredMessage>> {
        self.gateway_only("Chat history")?;

        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/api/chats/{}/messages", chat_id),
            )
            .send()
            .await
            .map_err(|e| self.unreachable_error(e))?;

        if !response.status().is_success() {
            return Err(self.error_response(response).await);
        }

        response.json::<Vec<StoredMessage>>().await.map_err(Into::into)
    }

    async fn delete_chat(&self, chat_id: Uuid) -> Result<()> {
        self.gateway_only("Chat deletion")?;

        let response = self
            .request(reqwest::Method::DELETE, &format!("/api/chats/{}", chat_id))
            .send()
            .await
            .map_err(|e| self.unreachable_error(e))?;

        if !response.status().is_success() {
            return Err(self.error_response(response).await);
        }

        Ok(())
    }

    async fn log_exchange(&self, record: &ExchangeRecord) -> Result<()> {
        self.gateway_only("Analytics logging")?;

        let response = self
            .request(reqwest::Method::POST, "/api/analytics/log")
            .json(record)
            .send()
            .await
            .map_err(|e| self.unreachable_error(e))?;

        if !response.status().is_success() {
            return Err(self.error_response(response).await);
        }

        Ok(())
    }

    async fn list_models(&self) -> Result<ModelCatalog> {
        let response = self
            .request(reqwest::Method::GET, "/api/models")
            .send()
            .await
            .map_err(|e| self.unreachable_error(e))?;

        if !response.status().is_success() {
            return Err(self.error_response(response).await);
        }

        response.json::<ModelCatalog>().await.map_err(Into::into)
    }
}

/// Scripted transport for tests.
///
/// Responses are queued per operation and consumed in order; every
/// call is recorded so assertions can check what went over the seam.
/// Empty queues answer `Ok` for delete and analytics calls and an
/// error everywhere else.
#[derive(Default)]
pub struct MockTransport {
    ask_replies: Mutex<VecDeque<Result<AnswerReply>>>,
    stream_scripts: Mutex<VecDeque<Result<Vec<Result<StreamEvent>>>>>,
    histories: Mutex<VecDeque<Result<Vec<StoredMessage>>>>,
    delete_results: Mutex<VecDeque<Result<()>>>,
    log_results: Mutex<VecDeque<Result<()>>>,
    catalogs: Mutex<VecDeque<Result<ModelCatalog>>>,

    pub asked: Mutex<Vec<AskRequest>>,
    pub streamed: Mutex<Vec<AskRequest>>,
    pub history_fetches: Mutex<Vec<Uuid>>,
    pub deleted: Mutex<Vec<Uuid>>,
    pub logged: Mutex<Vec<ExchangeRecord>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_reply(&self, reply: Result<AnswerReply>) {
        self.ask_replies.lock().unwrap().push_back(reply);
    }

    pub fn queue_stream(&self, events: Vec<Result<StreamEvent>>) {
        self.stream_scripts.lock().unwrap().push_back(Ok(events));
    }

    pub fn queue_stream_failure(&self, error: AppError) {
        self.stream_scripts.lock().unwrap().push_back(Err(error));
    }

    pub fn queue_history(&self, history: Result<Vec<StoredMessage>>) {
        self.histories.lock().unwrap().push_back(history);
    }

    pub fn queue_delete(&self, result: Result<()>) {
        self.delete_results.lock().unwrap().push_back(result);
    }

    pub fn queue_log(&self, result: Result<()>) {
        self.log_results.lock().unwrap().push_back(result);
    }

    pub fn queue_catalog(&self, catalog: Result<ModelCatalog>) {
        self.catalogs.lock().unwrap().push_back(catalog);
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn ask(&self, request: &AskRequest) -> Result<AnswerReply> {
        self.asked.lock().unwrap().push(request.clone());
        self.ask_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(AppError::Internal {
                    message: "No scripted answer".to_string(),
                })
            })
    }

    async fn ask_stream(&self, request: &AskRequest) -> Result<EventStream> {
        self.streamed.lock().unwrap().push(request.clone());
        let script = self
            .stream_scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(AppError::Internal {
                    message: "No scripted stream".to_string(),
                })
            })?;
        Ok(Box::pin(futures::stream::iter(script)))
    }

    async fn chat_messages(&self, chat_id: Uuid) -> Result<Vec<StoredMessage>> {
        self.history_fetches.lock().unwrap().push(chat_id);
        self.histories
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(AppError::Internal {
                    message: "No scripted history".to_string(),
                })
            })
    }

    async fn delete_chat(&self, chat_id: Uuid) -> Result<()> {
        self.deleted.lock().unwrap().push(chat_id);
        self.delete_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn log_exchange(&self, record: &ExchangeRecord) -> Result<()> {
        self.logged.lock().unwrap().push(record.clone());
        self.log_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn list_models(&self) -> Result<ModelCatalog> {
        self.catalogs.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(AppError::Internal {
                message: "No scripted catalog".to_string(),
            })
        })
    }
}
