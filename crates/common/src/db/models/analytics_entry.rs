//! Analytics entry: append-only usage log, one row per completed exchange
//!
//! chat_id is a plain column, deliberately not a foreign key: entries
//! survive deletion of the chat they reference so historical reporting
//! keeps working.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "analytics_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    pub chat_id: Uuid,

    #[sea_orm(column_type = "Text")]
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

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
