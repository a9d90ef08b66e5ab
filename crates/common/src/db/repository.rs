//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling. Every chat-scoped operation takes the
//! requesting user's id and treats a chat owned by someone else exactly
//! like a chat that does not exist.

use crate::answerer::SourceMetadata;
use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbBackend, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr, Statement,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Chat list projection for the conversation sidebar
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: Uuid,
    pub title: String,
    pub updated_at: DateTimeWithTimeZone,
}

/// A message joined with its retrieval sources
#[derive(Debug, Clone)]
pub struct MessageWithSources {
    pub message: Message,
    pub sources: Vec<Source>,
}

/// A chat joined with its full ordered history
#[derive(Debug, Clone)]
pub struct ChatWithMessages {
    pub chat: Chat,
    pub messages: Vec<MessageWithSources>,
}

/// Input for recording one completed exchange
#[derive(Debug, Clone)]
pub struct NewAnalyticsEntry {
    pub user_id: Uuid,
    pub chat_id: Uuid,
    pub model_used: String,
    pub was_streaming: bool,
    pub evaluate_sources: bool,
    pub use_reranker: bool,
    pub use_multi_query: bool,
    pub temperature: Option<f64>,
    pub processing_time: Option<f64>,
    pub cost: Option<f64>,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Chat Operations
    // ========================================================================

    /// Create a new chat owned by the given user
    pub async fn create_chat(&self, user_id: Uuid, title: String) -> Result<Chat> {
        let now = chrono::Utc::now();

        let chat = ChatActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            title: Set(title),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        chat.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find a chat by ID, scoped to its owner
    pub async fn find_chat(&self, chat_id: Uuid, user_id: Uuid) -> Result<Option<Chat>> {
        ChatEntity::find_by_id(chat_id)
            .filter(ChatColumn::UserId.eq(user_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find a chat with its ordered message history and sources
    pub async fn find_chat_with_messages(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ChatWithMessages>> {
        let Some(chat) = self.find_chat(chat_id, user_id).await? else {
            return Ok(None);
        };

        let messages = self.messages_with_sources(chat.id).await?;

        Ok(Some(ChatWithMessages { chat, messages }))
    }

    /// List all chats for a user, most recently active first
    pub async fn list_chats(&self, user_id: Uuid) -> Result<Vec<ChatSummary>> {
        let chats = ChatEntity::find()
            .filter(ChatColumn::UserId.eq(user_id))
            .order_by_desc(ChatColumn::UpdatedAt)
            .all(self.read_conn())
            .await?;

        Ok(chats
            .into_iter()
            .map(|chat| ChatSummary {
                id: chat.id,
                title: chat.title,
                updated_at: chat.updated_at,
            })
            .collect())
    }

    /// Delete a chat and, via cascade, its messages and their sources
    pub async fn delete_chat(&self, chat_id: Uuid, user_id: Uuid) -> Result<()> {
        let chat = self
            .find_chat(chat_id, user_id)
            .await?
            .ok_or_else(|| AppError::ChatNotFound {
                id: chat_id.to_string(),
            })?;

        match ChatEntity::delete_by_id(chat.id).exec(self.write_conn()).await {
            Ok(_) => Ok(()),
            Err(e) => match e.sql_err() {
                Some(SqlErr::ForeignKeyConstraintViolation(_)) => Err(AppError::Conflict {
                    message: "Chat cannot be deleted because related records reference it"
                        .to_string(),
                }),
                _ => Err(e.into()),
            },
        }
    }

    // ========================================================================
    // Message Operations
    // ========================================================================

    /// Append a message to a chat and bump the chat's updated_at
    pub async fn add_message(
        &self,
        chat_id: Uuid,
        role: &str,
        content: String,
        model: Option<String>,
        processing_time: Option<f64>,
    ) -> Result<Message> {
        let now = chrono::Utc::now();

        let message = MessageActiveModel {
            id: Set(Uuid::new_v4()),
            chat_id: Set(chat_id),
            role: Set(role.to_string()),
            content: Set(content),
            model: Set(model),
            processing_time: Set(processing_time),
            created_at: Set(now.into()),
        };

        let message = message.insert(self.write_conn()).await?;

        // Any appended message counts as activity on the parent chat
        self.touch_chat(chat_id, now).await?;

        Ok(message)
    }

    /// Attach retrieval sources to a bot message
    pub async fn add_sources(
        &self,
        message_id: Uuid,
        sources: Vec<(String, SourceMetadata)>, // (content, metadata)
    ) -> Result<Vec<Source>> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }

        let mut created = Vec::with_capacity(sources.len());
        let mut rows = Vec::with_capacity(sources.len());

        for (content, metadata) in sources {
            let source = Source {
                id: Uuid::new_v4(),
                message_id,
                content,
                metadata,
            };

            rows.push(SourceActiveModel {
                id: Set(source.id),
                message_id: Set(source.message_id),
                content: Set(source.content.clone()),
                metadata: Set(source.metadata.clone()),
            });
            created.push(source);
        }

        SourceEntity::insert_many(rows)
            .exec(self.write_conn())
            .await?;

        Ok(created)
    }

    /// Fetch a chat's messages in creation order, each with its sources
    async fn messages_with_sources(&self, chat_id: Uuid) -> Result<Vec<MessageWithSources>> {
        use std::collections::HashMap;

        let messages = MessageEntity::find()
            .filter(MessageColumn::ChatId.eq(chat_id))
            .order_by_asc(MessageColumn::CreatedAt)
            .all(self.read_conn())
            .await?;

        if messages.is_empty() {
            return Ok(Vec::new());
        }

        // One query for all sources instead of one per message
        let message_ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();
        let mut by_message: HashMap<Uuid, Vec<Source>> = HashMap::new();

        for source in SourceEntity::find()
            .filter(SourceColumn::MessageId.is_in(message_ids))
            .all(self.read_conn())
            .await?
        {
            by_message.entry(source.message_id).or_default().push(source);
        }

        Ok(messages
            .into_iter()
            .map(|message| {
                let sources = by_message.remove(&message.id).unwrap_or_default();
                MessageWithSources { message, sources }
            })
            .collect())
    }

    /// Bump a chat's updated_at
    async fn touch_chat(&self, chat_id: Uuid, at: chrono::DateTime<chrono::Utc>) -> Result<()> {
        use sea_orm::ConnectionTrait;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE chats SET updated_at = $1 WHERE id = $2",
            vec![at.into(), chat_id.into()],
        );

        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    // ========================================================================
    // Analytics Operations
    // ========================================================================

    /// Record one completed exchange
    pub async fn log_analytics_entry(&self, entry: NewAnalyticsEntry) -> Result<AnalyticsEntry> {
        let now = chrono::Utc::now();

        let model = AnalyticsEntryActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(entry.user_id),
            chat_id: Set(entry.chat_id),
            model_used: Set(entry.model_used),
            was_streaming: Set(entry.was_streaming),
            evaluate_sources: Set(entry.evaluate_sources),
            use_reranker: Set(entry.use_reranker),
            use_multi_query: Set(entry.use_multi_query),
            temperature: Set(entry.temperature),
            processing_time: Set(entry.processing_time),
            cost: Set(entry.cost),
            prompt_tokens: Set(entry.prompt_tokens),
            completion_tokens: Set(entry.completion_tokens),
            total_tokens: Set(entry.total_tokens),
            created_at: Set(now.into()),
        };

        model.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// List all analytics entries for a user, oldest first
    pub async fn list_analytics_entries(&self, user_id: Uuid) -> Result<Vec<AnalyticsEntry>> {
        AnalyticsEntryEntity::find()
            .filter(AnalyticsEntryColumn::UserId.eq(user_id))
            .order_by_asc(AnalyticsEntryColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }
}
