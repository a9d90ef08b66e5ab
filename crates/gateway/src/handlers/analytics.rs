//! Usage analytics handlers
//!
//! The log endpoint is called by the client once per completed exchange;
//! the summary endpoint folds the caller's whole history into aggregates.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use ragline_common::{
    analytics::{summarize, UsageSummary},
    auth::AuthContext,
    db::{NewAnalyticsEntry, Repository},
    errors::{AppError, Result},
    metrics,
};

/// One exchange's worth of client telemetry
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntryRequest {
    /// Required: entries are only meaningful for persisted chats
    #[serde(default)]
    pub chat_id: Option<Uuid>,

    #[serde(default)]
    pub model_used: String,

    #[serde(default)]
    pub was_streaming: bool,

    #[serde(default)]
    pub evaluate_sources: bool,

    #[serde(default)]
    pub use_reranker: bool,

    #[serde(default)]
    pub use_multi_query: bool,

    #[serde(default)]
    pub temperature: Option<f64>,

    #[serde(default)]
    pub processing_time: Option<f64>,

    #[serde(default)]
    pub cost: Option<f64>,

    #[serde(default)]
    pub prompt_tokens: Option<i32>,

    #[serde(default)]
    pub completion_tokens: Option<i32>,

    #[serde(default)]
    pub total_tokens: Option<i32>,
}

#[derive(Serialize)]
pub struct LogEntryResponse {
    pub success: bool,
    pub message: String,
    pub id: Uuid,
}

/// Record one analytics entry for the caller
pub async fn log_entry(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<LogEntryRequest>,
) -> Result<Json<LogEntryResponse>> {
    let chat_id = request.chat_id.ok_or_else(|| AppError::MissingField {
        field: "chatId".to_string(),
    })?;

    let repo = Repository::new(state.db.clone());
    let entry = repo
        .log_analytics_entry(NewAnalyticsEntry {
            user_id: auth.user_id,
            chat_id,
            model_used: request.model_used,
            was_streaming: request.was_streaming,
            evaluate_sources: request.evaluate_sources,
            use_reranker: request.use_reranker,
            use_multi_query: request.use_multi_query,
            temperature: request.temperature,
            processing_time: request.processing_time,
            cost: request.cost,
            prompt_tokens: request.prompt_tokens,
            completion_tokens: request.completion_tokens,
            total_tokens: request.total_tokens,
        })
        .await?;
    metrics::record_analytics_entry(entry.was_streaming);

    tracing::debug!(
        entry_id = %entry.id,
        user_id = %auth.user_id,
        chat_id = %chat_id,
        "Analytics entry logged"
    );

    Ok(Json(LogEntryResponse {
        success: true,
        message: "Analytics data logged successfully".to_string(),
        id: entry.id,
    }))
}

/// Aggregate the caller's usage history
pub async fn summary(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<UsageSummary>> {
    let repo = Repository::new(state.db.clone());
    let entries = repo.list_analytics_entries(auth.user_id).await?;

    Ok(Json(summarize(&entries)))
}
