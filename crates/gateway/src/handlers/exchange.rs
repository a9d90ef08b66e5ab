//! Chat exchange handlers
//!
//! `send` performs a buffered question/answer round trip. `stream` relays
//! the backend's event stream unmodified while teeing it through the
//! decoder, so the finished answer is persisted even when the caller
//! disconnects mid-stream.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

use crate::AppState;
use ragline_common::{
    answerer::{AnswerReply, AskRequest, SseDecoder, StreamEvent, StreamMetadata},
    auth::AuthContext,
    db::{
        models::{Chat, ROLE_BOT, ROLE_USER},
        Repository,
    },
    errors::{AppError, Result},
    metrics,
};

/// Stored and returned in place of an empty backend answer
const EMPTY_ANSWER: &str = "No answer received.";

/// Response for a completed buffered exchange
#[derive(Serialize)]
pub struct SendResponse {
    pub sender: String,
    #[serde(flatten)]
    pub reply: AnswerReply,
}

/// Ask the backend for a complete answer, persisting both sides of the
/// exchange
pub async fn send(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(mut request): Json<AskRequest>,
) -> Result<Json<SendResponse>> {
    require(&request.question, "question")?;
    require(&request.model, "model")?;

    let repo = Repository::new(state.db.clone());
    let chat = resolve_chat(&repo, &auth, request.chat_id, &request.question).await?;

    // The question is durable before the backend is consulted; a backend
    // failure must not lose the user's side of the exchange.
    repo.add_message(chat.id, ROLE_USER, request.question.clone(), None, None)
        .await?;
    metrics::record_message_persisted(ROLE_USER);

    request.chat_id = Some(chat.id);

    let started = Instant::now();
    match state.answerer.ask(&request).await {
        Ok(mut reply) => {
            let text = if reply.text.trim().is_empty() {
                EMPTY_ANSWER.to_string()
            } else {
                reply.text.clone()
            };
            let model = reply.model.clone().unwrap_or_else(|| request.model.clone());

            let message = repo
                .add_message(
                    chat.id,
                    ROLE_BOT,
                    text.clone(),
                    Some(model.clone()),
                    reply.processing_time,
                )
                .await?;
            metrics::record_message_persisted(ROLE_BOT);

            if !reply.sources.is_empty() {
                let sources = reply
                    .sources
                    .iter()
                    .map(|s| (s.content.clone(), s.metadata.clone()))
                    .collect();
                repo.add_sources(message.id, sources).await?;
            }

            metrics::record_exchange(started.elapsed().as_secs_f64(), "buffered", true);
            tracing::info!(
                chat_id = %chat.id,
                user_id = %auth.user_id,
                model = %model,
                "Exchange completed"
            );

            reply.text = text;
            reply.model = Some(model);
            reply.chat_id = Some(chat.id);

            Ok(Json(SendResponse {
                sender: ROLE_BOT.to_string(),
                reply,
            }))
        }
        Err(err) => {
            // The failure is recorded as the bot's turn so the
            // conversation reflects what actually happened.
            repo.add_message(chat.id, ROLE_BOT, upstream_failure_note(&err), None, None)
                .await?;
            metrics::record_message_persisted(ROLE_BOT);
            metrics::record_exchange(started.elapsed().as_secs_f64(), "buffered", false);

            Err(err)
        }
    }
}

/// Relay the backend's event stream, owning persistence for the exchange
pub async fn stream(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(mut request): Json<AskRequest>,
) -> Result<Response> {
    require(&request.question, "question")?;
    require(&request.model, "model")?;

    let repo = Repository::new(state.db.clone());
    let chat = resolve_chat(&repo, &auth, request.chat_id, &request.question).await?;

    repo.add_message(chat.id, ROLE_USER, request.question.clone(), None, None)
        .await?;
    metrics::record_message_persisted(ROLE_USER);

    request.chat_id = Some(chat.id);

    // Connect/status failures surface as 502 before any bytes are
    // relayed; the user message above stays recorded.
    let upstream = state.answerer.ask_stream_raw(&request).await?;

    let (tx, rx) = tokio::sync::mpsc::channel::<std::result::Result<Bytes, std::io::Error>>(16);

    let chat_id = chat.id;
    let user_id = auth.user_id;
    let fallback_model = request.model.clone();

    tokio::spawn(async move {
        let started = Instant::now();

        // The backend never echoes the chat id, so the relay announces it
        // up front as a metadata event of its own.
        let announce = serde_json::json!({ "type": "metadata", "chatId": chat_id });
        let _ = tx
            .send(Ok(Bytes::from(format!("data: {}\n\n", announce))))
            .await;

        let mut decoder = SseDecoder::new();
        let mut answer = String::new();
        let mut metadata = StreamMetadata::default();
        let mut failed = false;

        let mut body = upstream.bytes_stream();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => {
                    for event in decoder.feed(&chunk) {
                        match event {
                            StreamEvent::Text(fragment) => answer.push_str(&fragment),
                            StreamEvent::Metadata(update) => metadata.merge(update),
                            StreamEvent::Done => {}
                        }
                    }
                    if tx.send(Ok(chunk)).await.is_err() {
                        // Caller went away. Keep reading so the finished
                        // answer is still persisted.
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        chat_id = %chat_id,
                        "Upstream stream failed mid-relay"
                    );
                    let _ = tx
                        .send(Ok(Bytes::from_static(
                            b"event: error\ndata: Stream interrupted\n\n",
                        )))
                        .await;
                    failed = true;
                    break;
                }
            }
        }
        drop(tx);

        if !failed && answer.trim().is_empty() {
            answer = EMPTY_ANSWER.to_string();
        }

        // A failure with no accumulated text leaves only the user message
        if !answer.trim().is_empty() {
            persist_streamed_answer(&repo, chat_id, answer, metadata, fallback_model).await;
        }

        metrics::record_exchange(started.elapsed().as_secs_f64(), "streamed", !failed);
        tracing::info!(
            chat_id = %chat_id,
            user_id = %user_id,
            failed,
            "Streamed exchange finished"
        );
    });

    let relayed =
        futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });

    let headers = [
        (header::CONTENT_TYPE, "text/event-stream"),
        (header::CACHE_CONTROL, "no-cache"),
        (header::CONNECTION, "keep-alive"),
    ];

    Ok((headers, Body::from_stream(relayed)).into_response())
}

/// Record the bot's side of a streamed exchange once upstream has ended.
/// Runs in the spawned relay task; failures are logged, never surfaced.
async fn persist_streamed_answer(
    repo: &Repository,
    chat_id: Uuid,
    answer: String,
    metadata: StreamMetadata,
    fallback_model: String,
) {
    let model = metadata.model.unwrap_or(fallback_model);

    let message = match repo
        .add_message(
            chat_id,
            ROLE_BOT,
            answer,
            Some(model),
            metadata.processing_time,
        )
        .await
    {
        Ok(message) => message,
        Err(e) => {
            tracing::error!(error = %e, chat_id = %chat_id, "Failed to persist streamed answer");
            return;
        }
    };
    metrics::record_message_persisted(ROLE_BOT);

    let sources: Vec<_> = metadata
        .sources
        .unwrap_or_default()
        .into_iter()
        .map(|s| (s.content, s.metadata))
        .collect();
    if !sources.is_empty() {
        if let Err(e) = repo.add_sources(message.id, sources).await {
            tracing::error!(
                error = %e,
                message_id = %message.id,
                "Failed to persist stream sources"
            );
        }
    }
}

/// Resolve the target chat: verify ownership when an id was supplied,
/// otherwise create one titled from the question
async fn resolve_chat(
    repo: &Repository,
    auth: &AuthContext,
    chat_id: Option<Uuid>,
    question: &str,
) -> Result<Chat> {
    match chat_id {
        Some(id) => repo
            .find_chat(id, auth.user_id)
            .await?
            .ok_or_else(|| AppError::ChatNotFound { id: id.to_string() }),
        None => {
            let chat = repo
                .create_chat(auth.user_id, derive_title(question))
                .await?;
            metrics::record_chat_created();
            tracing::info!(chat_id = %chat.id, user_id = %auth.user_id, "Chat created");
            Ok(chat)
        }
    }
}

/// First five words of the question; an ellipsis marks truncation
fn derive_title(question: &str) -> String {
    let mut words = question.split_whitespace();
    let mut title = words.by_ref().take(5).collect::<Vec<_>>().join(" ");
    if words.next().is_some() {
        title.push_str("...");
    }
    title
}

/// Reject blank required fields before any persistence happens
fn require(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::MissingField {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Bot-visible description of an upstream failure
fn upstream_failure_note(err: &AppError) -> String {
    match err {
        AppError::Upstream {
            status, details, ..
        } => {
            let detail = details
                .as_ref()
                .and_then(|d| d.get("error"))
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let note = match status {
                Some(code) => format!("RAG backend error: {}. {}", code, detail),
                None => format!("RAG backend error: backend unreachable. {}", detail),
            };
            note.trim_end().to_string()
        }
        other => format!("RAG backend error: {}", other),
    }
}
