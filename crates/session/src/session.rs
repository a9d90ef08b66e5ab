//! Chat session controller
//!
//! Single source of truth for one active conversation: the input
//! buffer, the rendered message list, the generation options, the
//! selected model, and which stored chat (if any) the conversation
//! belongs to. All mutation goes through the methods here; the
//! surface renders the state and nothing else.
//!
//! Playground sessions talk straight to the answering backend and
//! leave no trace: no chat rows, no history, no analytics.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use ragline_common::answerer::{AskRequest, ModelCatalog, StreamEvent, StreamMetadata};
use ragline_common::errors::AppError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::message::{DisplayMessage, Sender};
use crate::options::ChatOptions;
use crate::transport::{ChatTransport, ExchangeRecord};

const STREAM_ERROR_NOTE: &str = "Error during streaming.";
const HISTORY_ERROR_NOTE: &str = "Error loading messages.";
const NO_MODELS_NOTE: &str = "No models available from the backend.";

/// One active conversation and everything the surface renders for it
pub struct ChatSession {
    transport: Arc<dyn ChatTransport>,
    playground: bool,
    input: String,
    messages: Vec<DisplayMessage>,
    options: ChatOptions,
    catalog: Option<ModelCatalog>,
    selected_model: Option<String>,
    current_chat_id: Option<Uuid>,
    sending: bool,
}

impl ChatSession {
    /// A session whose exchanges go through the gateway and persist
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self::build(transport, false)
    }

    /// An ephemeral session: no chat id, no history, no analytics
    pub fn playground(transport: Arc<dyn ChatTransport>) -> Self {
        Self::build(transport, true)
    }

    fn build(transport: Arc<dyn ChatTransport>, playground: bool) -> Self {
        Self {
            transport,
            playground,
            input: String::new(),
            messages: Vec::new(),
            options: ChatOptions::default(),
            catalog: None,
            selected_model: None,
            current_chat_id: None,
            sending: false,
        }
    }

    pub fn messages(&self) -> &[DisplayMessage] {
        &self.messages
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn options(&self) -> &ChatOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut ChatOptions {
        &mut self.options
    }

    pub fn selected_model(&self) -> Option<&str> {
        self.selected_model.as_deref()
    }

    pub fn set_selected_model(&mut self, model: impl Into<String>) {
        self.selected_model = Some(model.into());
    }

    /// The catalog fetched by the last successful `load_models`
    pub fn available_models(&self) -> Option<&ModelCatalog> {
        self.catalog.as_ref()
    }

    pub fn current_chat_id(&self) -> Option<Uuid> {
        self.current_chat_id
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn is_playground(&self) -> bool {
        self.playground
    }

    /// True when the surface should offer the quick-start prompts
    /// instead of a conversation.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && !self.sending
    }

    /// Submit a question, from the input buffer or a quick-start
    /// prompt.
    ///
    /// Does nothing when the text is blank, a send is already in
    /// flight, or no model is selected. The user's turn appears
    /// immediately; the bot's turn follows when the transport
    /// delivers it. Every failure becomes a visible bot message.
    pub async fn send_message(&mut self, prompt_override: Option<&str>) {
        let text = prompt_override.unwrap_or(self.input.as_str()).to_string();
        if text.trim().is_empty() || self.sending {
            return;
        }
        let Some(model) = self.selected_model.clone() else {
            return;
        };

        self.messages.push(DisplayMessage::user(text.clone()));
        self.input.clear();
        self.sending = true;

        // Playground exchanges never reference a stored chat
        let chat_id = if self.playground {
            None
        } else {
            self.current_chat_id
        };
        let request = self.options.to_request(text, model, chat_id);

        if self.options.use_streaming {
            self.stream_exchange(request).await;
        } else {
            self.buffered_exchange(request).await;
        }

        self.sending = false;
    }

    async fn buffered_exchange(&mut self, request: AskRequest) {
        let model = request.model.clone();

        match self.transport.ask(&request).await {
            Ok(reply) => {
                if !self.playground && self.current_chat_id.is_none() {
                    self.current_chat_id = reply.chat_id;
                }

                let usage = StreamMetadata {
                    processing_time: reply.processing_time,
                    prompt_tokens: reply.prompt_tokens,
                    completion_tokens: reply.completion_tokens,
                    total_tokens: reply.total_tokens,
                    cost: reply.cost,
                    ..Default::default()
                };

                self.messages.push(DisplayMessage {
                    sender: Sender::Bot,
                    text: reply.text,
                    sources: reply.sources,
                    evaluation: reply.evaluation,
                    processing_time: reply.processing_time,
                    model: reply.model.or(Some(model.clone())),
                    is_streaming: false,
                });

                self.record_analytics(&model, false, &usage).await;
            }
            Err(err) => {
                warn!(error = %err, "Exchange failed");
                self.messages.push(DisplayMessage::bot(send_failure_note(&err)));
            }
        }
    }

    async fn stream_exchange(&mut self, request: AskRequest) {
        self.messages
            .push(DisplayMessage::streaming_placeholder(request.model.clone()));

        let model = request.model.clone();
        let started = Instant::now();
        let mut answer = String::new();
        let mut metadata = StreamMetadata::default();
        let mut failed = false;

        match self.transport.ask_stream(&request).await {
            Ok(mut events) => {
                while let Some(event) = events.next().await {
                    match event {
                        Ok(StreamEvent::Text(fragment)) => {
                            answer.push_str(&fragment);
                            self.refresh_streaming_message(&answer, &metadata, started);
                        }
                        Ok(StreamEvent::Metadata(update)) => {
                            metadata.merge(update);
                            if !self.playground && self.current_chat_id.is_none() {
                                self.current_chat_id = metadata.chat_id;
                            }
                            self.refresh_streaming_message(&answer, &metadata, started);
                        }
                        Ok(StreamEvent::Done) => break,
                        Err(err) => {
                            warn!(error = %err, "Streaming failed mid-answer");
                            failed = true;
                            break;
                        }
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "Streaming request failed");
                failed = true;
            }
        }

        if failed {
            // Keep whatever arrived; the note marks where it broke off
            if !answer.is_empty() {
                answer.push_str("\n\n");
            }
            answer.push_str(STREAM_ERROR_NOTE);
        }

        if metadata.processing_time.is_none() {
            metadata.processing_time = Some(started.elapsed().as_secs_f64());
        }

        self.finish_streaming_message(&answer, &metadata);

        if !failed {
            self.record_analytics(&model, true, &metadata).await;
        }
    }

    /// Apply the accumulated text and metadata to the trailing
    /// placeholder while fragments are still arriving.
    fn refresh_streaming_message(
        &mut self,
        answer: &str,
        metadata: &StreamMetadata,
        started: Instant,
    ) {
        if let Some(last) = self.messages.last_mut() {
            if last.is_streaming {
                last.text = answer.to_string();
                if let Some(sources) = &metadata.sources {
                    last.sources = sources.clone();
                }
                last.evaluation = metadata.evaluation.clone();
                last.processing_time = Some(
                    metadata
                        .processing_time
                        .unwrap_or_else(|| started.elapsed().as_secs_f64()),
                );
            }
        }
    }

    fn finish_streaming_message(&mut self, answer: &str, metadata: &StreamMetadata) {
        if let Some(last) = self.messages.last_mut() {
            if last.is_streaming {
                last.text = answer.to_string();
                last.sources = metadata.sources.clone().unwrap_or_default();
                last.evaluation = metadata.evaluation.clone();
                last.processing_time = metadata.processing_time;
                if metadata.model.is_some() {
                    last.model = metadata.model.clone();
                }
                last.is_streaming = false;
            }
        }
    }

    /// Usage reporting after a completed exchange. Failures never
    /// reach the user.
    async fn record_analytics(&self, model: &str, was_streaming: bool, usage: &StreamMetadata) {
        if self.playground {
            debug!("Analytics logging skipped in playground mode");
            return;
        }

        let Some(chat_id) = self.current_chat_id else {
            if was_streaming {
                warn!("Analytics not logged for streamed chat: Chat ID could not be determined");
            }
            return;
        };

        let record = ExchangeRecord {
            chat_id,
            model_used: model.to_string(),
            was_streaming,
            evaluate_sources: self.options.evaluate_sources,
            use_reranker: self.options.use_reranker,
            use_multi_query: self.options.use_multi_query,
            temperature: self.options.effective_temperature(),
            processing_time: usage.processing_time,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            cost: usage.cost,
        };

        if let Err(err) = self.transport.log_exchange(&record).await {
            warn!(error = %err, "Failed to log analytics data");
        }
    }

    /// Switch to a stored chat and load its history.
    ///
    /// No-op in playground mode and when the chat is already current.
    /// A failed fetch replaces the list with a single error message.
    pub async fn select_chat(&mut self, chat_id: Uuid) {
        if self.playground || self.current_chat_id == Some(chat_id) {
            return;
        }

        self.current_chat_id = Some(chat_id);
        self.messages.clear();

        match self.transport.chat_messages(chat_id).await {
            Ok(stored) => {
                self.messages = stored.into_iter().map(DisplayMessage::from).collect();
            }
            Err(err) => {
                warn!(error = %err, chat_id = %chat_id, "Failed to load chat history");
                self.messages = vec![DisplayMessage::bot(HISTORY_ERROR_NOTE)];
            }
        }
    }

    /// Start over: no current chat, no messages, no pending input.
    /// Safe to call repeatedly.
    pub fn create_new_chat(&mut self) {
        self.current_chat_id = None;
        self.messages.clear();
        self.input.clear();
    }

    /// Delete a stored chat. When it is the current one the session
    /// resets as if `create_new_chat` had been called; a failure
    /// appends an error message instead.
    pub async fn delete_chat(&mut self, chat_id: Uuid) {
        if self.playground {
            return;
        }

        match self.transport.delete_chat(chat_id).await {
            Ok(()) => {
                if self.current_chat_id == Some(chat_id) {
                    self.create_new_chat();
                }
            }
            Err(err) => {
                warn!(error = %err, chat_id = %chat_id, "Failed to delete chat");
                self.messages
                    .push(DisplayMessage::bot(delete_failure_note(&err)));
            }
        }
    }

    /// Fetch the model catalog and settle the active selection: keep
    /// the current model when still listed, else the catalog default,
    /// else the first listed.
    pub async fn load_models(&mut self) {
        match self.transport.list_models().await {
            Ok(catalog) => {
                match catalog.choose(self.selected_model.as_deref()) {
                    Some(model) => self.selected_model = Some(model),
                    None => {
                        self.selected_model = None;
                        self.messages.push(DisplayMessage::bot(NO_MODELS_NOTE));
                    }
                }
                self.catalog = Some(catalog);
            }
            Err(err) => {
                warn!(error = %err, "Failed to fetch models");
                self.messages.push(DisplayMessage::bot(format!(
                    "Error fetching models: {}",
                    error_text(&err)
                )));
            }
        }
    }
}

/// Strip an error down to what the conversation surface shows
fn error_text(err: &AppError) -> String {
    match err {
        AppError::Upstream { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

/// What a failed buffered exchange shows as the bot's turn
fn send_failure_note(err: &AppError) -> String {
    match err {
        AppError::Upstream {
            status: Some(code),
            details,
            ..
        } => {
            let detail = details
                .as_ref()
                .and_then(upstream_detail)
                .unwrap_or_else(|| "Could not reach the send API.".to_string());
            format!("Error: {}. {}", code, detail)
        }
        other => format!(
            "Failed to fetch response from the send API. Details: {}",
            error_text(other)
        ),
    }
}

/// What a failed deletion shows as the bot's turn
fn delete_failure_note(err: &AppError) -> String {
    let detail = match err {
        AppError::Upstream {
            details: Some(details),
            ..
        } => upstream_detail(details),
        _ => None,
    };

    format!(
        "Error deleting chat: {}",
        detail.unwrap_or_else(|| "Failed to delete chat".to_string())
    )
}

/// Pull the human-readable message out of an error response body.
///
/// The gateway nests it as `error.message`; the backend sends a flat
/// `error` string.
fn upstream_detail(details: &serde_json::Value) -> Option<String> {
    details["error"]["message"]
        .as_str()
        .or_else(|| details["error"].as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::StoredMessage;
    use crate::transport::MockTransport;
    use ragline_common::answerer::{
        AnswerReply, ModelDescriptor, RetrievedSource, SourceMetadata,
    };
    use serde_json::json;

    fn persisted_session(mock: &Arc<MockTransport>) -> ChatSession {
        let mut session = ChatSession::new(mock.clone());
        session.set_selected_model("mistral");
        session
    }

    fn playground_session(mock: &Arc<MockTransport>) -> ChatSession {
        let mut session = ChatSession::playground(mock.clone());
        session.set_selected_model("mistral");
        session
    }

    fn reply(text: &str) -> AnswerReply {
        AnswerReply {
            text: text.to_string(),
            model: Some("mistral".to_string()),
            ..Default::default()
        }
    }

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

    fn chat_id() -> Uuid {
        "3f1e1e7c-9a44-4d17-8a8a-0cbf6e1f2ab9".parse().unwrap()
    }

    #[tokio::test]
    async fn test_buffered_send_appends_one_user_and_one_bot_message() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_reply(Ok(AnswerReply {
            chat_id: Some(chat_id()),
            processing_time: Some(2.4),
            total_tokens: Some(160),
            ..reply("An engineering school.")
        }));

        let mut session = persisted_session(&mock);
        session.options_mut().use_streaming = false;
        session.set_input("What is CY Tech?");
        session.send_message(None).await;

        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[0].sender, Sender::User);
        assert_eq!(session.messages()[0].text, "What is CY Tech?");
        assert_eq!(session.messages()[1].sender, Sender::Bot);
        assert_eq!(session.messages()[1].text, "An engineering school.");
        assert_eq!(session.messages()[1].model.as_deref(), Some("mistral"));
        assert_eq!(session.input(), "");
        assert!(!session.is_sending());

        // First successful response's chat id becomes the session's
        assert_eq!(session.current_chat_id(), Some(chat_id()));

        let logged = mock.logged.lock().unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].chat_id, chat_id());
        assert!(!logged[0].was_streaming);
        assert_eq!(logged[0].model_used, "mistral");
        assert_eq!(logged[0].total_tokens, Some(160));
    }

    #[tokio::test]
    async fn test_buffered_failure_becomes_error_bot_message() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_reply(Err(AppError::Upstream {
            message: "Gateway returned 502 Bad Gateway".to_string(),
            status: Some(502),
            details: Some(json!({"error": {"code": "UPSTREAM_ERROR", "message": "model overloaded"}})),
        }));

        let mut session = persisted_session(&mock);
        session.options_mut().use_streaming = false;
        session.set_input("hello");
        session.send_message(None).await;

        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1].sender, Sender::Bot);
        assert_eq!(session.messages()[1].text, "Error: 502. model overloaded");
        assert!(!session.is_sending());
        assert!(mock.logged.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_input_is_a_no_op() {
        let mock = Arc::new(MockTransport::new());
        let mut session = persisted_session(&mock);

        session.set_input("   ");
        session.send_message(None).await;
        session.send_message(Some(" \t ")).await;

        assert!(session.messages().is_empty());
        assert!(mock.asked.lock().unwrap().is_empty());
        assert!(mock.streamed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_without_model_is_a_no_op() {
        let mock = Arc::new(MockTransport::new());
        let mut session = ChatSession::new(mock.clone());

        session.set_input("hello");
        session.send_message(None).await;

        assert!(session.messages().is_empty());
        assert!(mock.asked.lock().unwrap().is_empty());
        assert!(mock.streamed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_while_sending_is_ignored() {
        let mock = Arc::new(MockTransport::new());
        let mut session = persisted_session(&mock);

        session.sending = true;
        session.set_input("hello");
        session.send_message(None).await;

        assert!(session.messages().is_empty());
        assert_eq!(session.input(), "hello");
        assert!(mock.asked.lock().unwrap().is_empty());
        assert!(mock.streamed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_playground_send_leaves_no_trace() {
        let mock = Arc::new(MockTransport::new());
        // Even a reply that names a chat must not attach the session
        mock.queue_reply(Ok(AnswerReply {
            chat_id: Some(chat_id()),
            ..reply("Hi")
        }));

        let mut session = playground_session(&mock);
        session.options_mut().use_streaming = false;
        session.send_message(Some("What is CY Tech?")).await;

        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.current_chat_id(), None);
        assert!(mock.logged.lock().unwrap().is_empty());
        assert_eq!(mock.asked.lock().unwrap()[0].chat_id, None);
    }

    #[tokio::test]
    async fn test_streaming_send_accumulates_fragments() {
        let mock = Arc::new(MockTransport::new());
        let sources = vec![RetrievedSource {
            content: "doc".to_string(),
            metadata: SourceMetadata {
                title: Some("About".to_string()),
                ..Default::default()
            },
        }];
        mock.queue_stream(vec![
            Ok(StreamEvent::Text("Hello".to_string())),
            Ok(StreamEvent::Metadata(StreamMetadata {
                chat_id: Some(chat_id()),
                sources: Some(sources.clone()),
                processing_time: Some(2.5),
                total_tokens: Some(160),
                ..Default::default()
            })),
            Ok(StreamEvent::Text(" world".to_string())),
            Ok(StreamEvent::Done),
        ]);

        let mut session = persisted_session(&mock);
        session.send_message(Some("hi")).await;

        assert_eq!(session.messages().len(), 2);
        let last = &session.messages()[1];
        assert_eq!(last.text, "Hello world");
        assert_eq!(last.sources, sources);
        assert_eq!(last.processing_time, Some(2.5));
        assert_eq!(last.model.as_deref(), Some("mistral"));
        assert!(!last.is_streaming);
        assert!(!session.is_sending());

        assert_eq!(session.current_chat_id(), Some(chat_id()));

        let logged = mock.logged.lock().unwrap();
        assert_eq!(logged.len(), 1);
        assert!(logged[0].was_streaming);
        assert_eq!(logged[0].chat_id, chat_id());
        assert_eq!(logged[0].processing_time, Some(2.5));
        assert_eq!(logged[0].total_tokens, Some(160));
    }

    #[tokio::test]
    async fn test_streaming_failure_keeps_partial_text() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_stream(vec![
            Ok(StreamEvent::Text("Partial".to_string())),
            Err(AppError::StreamDecode {
                message: "connection reset".to_string(),
            }),
        ]);

        let mut session = persisted_session(&mock);
        session.send_message(Some("hi")).await;

        let last = &session.messages()[1];
        assert_eq!(last.text, "Partial\n\nError during streaming.");
        assert!(!last.is_streaming);
        assert!(!session.is_sending());
        assert!(mock.logged.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_streaming_connect_failure_shows_error_only() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_stream_failure(AppError::upstream("Answer backend unreachable"));

        let mut session = persisted_session(&mock);
        session.send_message(Some("hi")).await;

        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1].text, "Error during streaming.");
        assert!(!session.messages()[1].is_streaming);
        assert!(!session.is_sending());
    }

    #[tokio::test]
    async fn test_streamed_chat_without_id_skips_analytics() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_stream(vec![
            Ok(StreamEvent::Text("Hi".to_string())),
            Ok(StreamEvent::Done),
        ]);

        let mut session = persisted_session(&mock);
        session.send_message(Some("hi")).await;

        assert_eq!(session.current_chat_id(), None);
        assert!(mock.logged.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_request_carries_clamped_options() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_reply(Ok(reply("ok")));

        let mut session = persisted_session(&mock);
        session.current_chat_id = Some(chat_id());
        session.options_mut().use_streaming = false;
        session.options_mut().temperature = 9.0;
        session.options_mut().rerank_k = Some(8);
        session.send_message(Some("hi")).await;

        let asked = mock.asked.lock().unwrap();
        assert_eq!(asked[0].chat_id, Some(chat_id()));
        assert_eq!(asked[0].temperature, 1.0);
        assert_eq!(asked[0].rerank_k, Some(8));
        assert_eq!(asked[0].top_p, None);
    }

    #[test]
    fn test_create_new_chat_is_idempotent() {
        let mock = Arc::new(MockTransport::new());
        let mut session = persisted_session(&mock);
        session.current_chat_id = Some(chat_id());
        session.messages.push(DisplayMessage::bot("old"));
        session.set_input("draft");

        for _ in 0..2 {
            session.create_new_chat();
            assert!(session.messages().is_empty());
            assert_eq!(session.current_chat_id(), None);
            assert_eq!(session.input(), "");
        }
    }

    #[tokio::test]
    async fn test_select_chat_loads_history() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_history(Ok(vec![
            StoredMessage {
                role: "user".to_string(),
                content: "What is CY Tech?".to_string(),
                model: None,
                processing_time: None,
                sources: Vec::new(),
            },
            StoredMessage {
                role: "bot".to_string(),
                content: "An engineering school.".to_string(),
                model: Some("mistral".to_string()),
                processing_time: Some(2.4),
                sources: Vec::new(),
            },
        ]));

        let mut session = persisted_session(&mock);
        session.select_chat(chat_id()).await;

        assert_eq!(session.current_chat_id(), Some(chat_id()));
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[0].sender, Sender::User);
        assert_eq!(session.messages()[1].sender, Sender::Bot);
        assert_eq!(session.messages()[1].model.as_deref(), Some("mistral"));
        assert_eq!(*mock.history_fetches.lock().unwrap(), vec![chat_id()]);
    }

    #[tokio::test]
    async fn test_select_current_chat_is_a_no_op() {
        let mock = Arc::new(MockTransport::new());
        let mut session = persisted_session(&mock);
        session.current_chat_id = Some(chat_id());
        session.messages.push(DisplayMessage::bot("kept"));

        session.select_chat(chat_id()).await;

        assert_eq!(session.messages().len(), 1);
        assert!(mock.history_fetches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_select_chat_in_playground_is_a_no_op() {
        let mock = Arc::new(MockTransport::new());
        let mut session = playground_session(&mock);

        session.select_chat(chat_id()).await;

        assert_eq!(session.current_chat_id(), None);
        assert!(mock.history_fetches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_select_chat_failure_shows_single_error_message() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_history(Err(AppError::upstream("Gateway unreachable")));

        let mut session = persisted_session(&mock);
        session.messages.push(DisplayMessage::bot("previous"));
        session.select_chat(chat_id()).await;

        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].text, "Error loading messages.");
    }

    #[tokio::test]
    async fn test_deleting_current_chat_resets_the_session() {
        let mock = Arc::new(MockTransport::new());
        let mut session = persisted_session(&mock);
        session.current_chat_id = Some(chat_id());
        session.messages.push(DisplayMessage::bot("old"));

        session.delete_chat(chat_id()).await;

        assert_eq!(session.current_chat_id(), None);
        assert!(session.messages().is_empty());
        assert_eq!(*mock.deleted.lock().unwrap(), vec![chat_id()]);
    }

    #[tokio::test]
    async fn test_deleting_another_chat_keeps_the_session() {
        let mock = Arc::new(MockTransport::new());
        let mut session = persisted_session(&mock);
        session.current_chat_id = Some(chat_id());
        session.messages.push(DisplayMessage::bot("kept"));

        session.delete_chat(Uuid::new_v4()).await;

        assert_eq!(session.current_chat_id(), Some(chat_id()));
        assert_eq!(session.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_failure_appends_error_message() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_delete(Err(AppError::Upstream {
            message: "Gateway returned 404 Not Found".to_string(),
            status: Some(404),
            details: Some(json!({"error": {"code": "CHAT_NOT_FOUND", "message": "Chat not found"}})),
        }));

        let mut session = persisted_session(&mock);
        session.current_chat_id = Some(chat_id());
        session.delete_chat(chat_id()).await;

        assert_eq!(session.current_chat_id(), Some(chat_id()));
        assert_eq!(
            session.messages().last().unwrap().text,
            "Error deleting chat: Chat not found"
        );
    }

    #[tokio::test]
    async fn test_delete_in_playground_is_a_no_op() {
        let mock = Arc::new(MockTransport::new());
        let mut session = playground_session(&mock);

        session.delete_chat(chat_id()).await;

        assert!(mock.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_models_settles_the_selection() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_catalog(Ok(catalog(&["gpt", "mistral"], "gpt")));
        mock.queue_catalog(Ok(catalog(&["gpt", "mistral"], "gpt")));

        let mut session = ChatSession::new(mock.clone());
        session.load_models().await;
        assert_eq!(session.selected_model(), Some("gpt"));

        // An already-listed selection survives a refresh
        session.set_selected_model("mistral");
        session.load_models().await;
        assert_eq!(session.selected_model(), Some("mistral"));
        assert!(session.available_models().is_some());
    }

    #[tokio::test]
    async fn test_load_models_empty_catalog_warns_in_chat() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_catalog(Ok(catalog(&[], "none")));

        let mut session = ChatSession::new(mock.clone());
        session.load_models().await;

        assert_eq!(session.selected_model(), None);
        assert_eq!(
            session.messages()[0].text,
            "No models available from the backend."
        );
    }

    #[tokio::test]
    async fn test_load_models_failure_shows_error() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_catalog(Err(AppError::Upstream {
            message: "Model catalog returned 502 Bad Gateway".to_string(),
            status: Some(502),
            details: None,
        }));

        let mut session = ChatSession::new(mock.clone());
        session.load_models().await;

        assert_eq!(
            session.messages()[0].text,
            "Error fetching models: Model catalog returned 502 Bad Gateway"
        );
    }

    #[tokio::test]
    async fn test_quick_start_prompt_clears_the_draft() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_reply(Ok(reply("Four.")));

        let mut session = persisted_session(&mock);
        session.options_mut().use_streaming = false;
        session.set_input("draft");
        session
            .send_message(Some(crate::templates::QUICK_START_PROMPTS[0]))
            .await;

        assert_eq!(
            session.messages()[0].text,
            "How many campuses does the school have?"
        );
        assert_eq!(session.input(), "");
    }
}
