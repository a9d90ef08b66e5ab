//! Message entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Role of a message author
pub const ROLE_USER: &str = "user";
pub const ROLE_BOT: &str = "bot";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub chat_id: Uuid,

    /// "user" or "bot"; messages are immutable once created
    #[sea_orm(column_type = "Text")]
    pub role: String,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    /// Model that produced a bot message
    #[sea_orm(column_type = "Text", nullable)]
    pub model: Option<String>,

    /// Seconds spent producing the answer
    pub processing_time: Option<f64>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::chat::Entity",
        from = "Column::ChatId",
        to = "super::chat::Column::Id",
        on_delete = "Cascade"
    )]
    Chat,

    #[sea_orm(has_many = "super::source::Entity", on_delete = "Cascade")]
    Sources,
}

impl Related<super::chat::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chat.def()
    }
}

impl Related<super::source::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sources.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
