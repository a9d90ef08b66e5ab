//! SeaORM entity models
//!
//! Database entities for ragline

mod analytics_entry;
mod chat;
mod message;
mod source;

pub use chat::{
    Entity as ChatEntity,
    Model as Chat,
    ActiveModel as ChatActiveModel,
    Column as ChatColumn,
};

pub use message::{
    Entity as MessageEntity,
    Model as Message,
    ActiveModel as MessageActiveModel,
    Column as MessageColumn,
    ROLE_BOT, ROLE_USER,
};

pub use source::{
    Entity as SourceEntity,
    Model as Source,
    ActiveModel as SourceActiveModel,
    Column as SourceColumn,
};

pub use analytics_entry::{
    Entity as AnalyticsEntryEntity,
    Model as AnalyticsEntry,
    ActiveModel as AnalyticsEntryActiveModel,
    Column as AnalyticsEntryColumn,
};
