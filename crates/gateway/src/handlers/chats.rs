//! Chat history handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use ragline_common::{
    answerer::SourceMetadata,
    auth::AuthContext,
    db::{
        models::{Chat, Message, Source, ROLE_BOT, ROLE_USER},
        ChatSummary, MessageWithSources, Repository,
    },
    errors::{AppError, Result},
    metrics,
};

/// Title used when an explicit chat is created without one
const DEFAULT_TITLE: &str = "New conversation";

/// Request to create a chat explicitly (normally chats are created by the
/// first exchange)
#[derive(Debug, Deserialize, Validate)]
pub struct CreateChatRequest {
    #[serde(default)]
    #[validate(length(max = 255))]
    pub title: Option<String>,
}

/// Request to append a message to an existing chat
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AppendMessageRequest {
    #[validate(length(min = 1, max = 100_000))]
    pub content: String,

    pub role: String,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub processing_time: Option<f64>,

    #[serde(default)]
    pub sources: Vec<SourceInput>,
}

#[derive(Debug, Deserialize)]
pub struct SourceInput {
    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub metadata: SourceMetadata,
}

/// Chat representation returned to clients
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub id: Uuid,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Chat> for ChatResponse {
    fn from(chat: Chat) -> Self {
        Self {
            id: chat.id,
            title: chat.title,
            created_at: chat.created_at.to_rfc3339(),
            updated_at: chat.updated_at.to_rfc3339(),
        }
    }
}

/// Chat with its full ordered message history
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDetailResponse {
    pub id: Uuid,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    pub messages: Vec<MessageResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: Uuid,
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
    pub sources: Vec<SourceResponse>,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct SourceResponse {
    pub id: Uuid,
    pub content: String,
    pub metadata: SourceMetadata,
}

impl From<Source> for SourceResponse {
    fn from(source: Source) -> Self {
        Self {
            id: source.id,
            content: source.content,
            metadata: source.metadata,
        }
    }
}

impl MessageResponse {
    fn new(message: Message, sources: Vec<Source>) -> Self {
        Self {
            id: message.id,
            role: message.role,
            content: message.content,
            model: message.model,
            processing_time: message.processing_time,
            sources: sources.into_iter().map(SourceResponse::from).collect(),
            created_at: message.created_at.to_rfc3339(),
        }
    }
}

impl From<MessageWithSources> for MessageResponse {
    fn from(entry: MessageWithSources) -> Self {
        Self::new(entry.message, entry.sources)
    }
}

#[derive(Serialize)]
pub struct DeleteChatResponse {
    pub message: String,
}

/// List the caller's chats, most recently active first
pub async fn list_chats(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<ChatSummary>>> {
    let repo = Repository::new(state.db.clone());
    let chats = repo.list_chats(auth.user_id).await?;

    Ok(Json(chats))
}

/// Create an empty chat with an explicit title
pub async fn create_chat(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<ChatResponse>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let title = request
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let repo = Repository::new(state.db.clone());
    let chat = repo.create_chat(auth.user_id, title).await?;
    metrics::record_chat_created();

    tracing::info!(chat_id = %chat.id, user_id = %auth.user_id, "Chat created");

    Ok((StatusCode::CREATED, Json(ChatResponse::from(chat))))
}

/// Get a chat with its ordered messages and their sources
pub async fn get_chat(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(chat_id): Path<Uuid>,
) -> Result<Json<ChatDetailResponse>> {
    let repo = Repository::new(state.db.clone());

    let detail = repo
        .find_chat_with_messages(chat_id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::ChatNotFound {
            id: chat_id.to_string(),
        })?;

    Ok(Json(ChatDetailResponse {
        id: detail.chat.id,
        title: detail.chat.title,
        created_at: detail.chat.created_at.to_rfc3339(),
        updated_at: detail.chat.updated_at.to_rfc3339(),
        messages: detail
            .messages
            .into_iter()
            .map(MessageResponse::from)
            .collect(),
    }))
}

/// Delete a chat, cascading to its messages and sources
pub async fn delete_chat(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(chat_id): Path<Uuid>,
) -> Result<Json<DeleteChatResponse>> {
    let repo = Repository::new(state.db.clone());
    repo.delete_chat(chat_id, auth.user_id).await?;

    tracing::info!(chat_id = %chat_id, user_id = %auth.user_id, "Chat deleted");

    Ok(Json(DeleteChatResponse {
        message: "Chat deleted successfully".to_string(),
    }))
}

/// List a chat's messages, oldest first
pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(chat_id): Path<Uuid>,
) -> Result<Json<Vec<MessageResponse>>> {
    let repo = Repository::new(state.db.clone());

    let detail = repo
        .find_chat_with_messages(chat_id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::ChatNotFound {
            id: chat_id.to_string(),
        })?;

    Ok(Json(
        detail
            .messages
            .into_iter()
            .map(MessageResponse::from)
            .collect(),
    ))
}

/// Append a message (and optionally its sources) to an owned chat
pub async fn append_message(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(chat_id): Path<Uuid>,
    Json(request): Json<AppendMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    if request.role != ROLE_USER && request.role != ROLE_BOT {
        return Err(AppError::InvalidFormat {
            message: format!("role must be \"{}\" or \"{}\"", ROLE_USER, ROLE_BOT),
        });
    }

    let repo = Repository::new(state.db.clone());

    repo.find_chat(chat_id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::ChatNotFound {
            id: chat_id.to_string(),
        })?;

    let message = repo
        .add_message(
            chat_id,
            &request.role,
            request.content,
            request.model,
            request.processing_time,
        )
        .await?;
    metrics::record_message_persisted(&message.role);

    let mut sources = Vec::new();
    if !request.sources.is_empty() {
        let inputs = request
            .sources
            .into_iter()
            .map(|s| (s.content, s.metadata))
            .collect();
        sources = repo.add_sources(message.id, inputs).await?;
    }

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(message, sources)),
    ))
}
