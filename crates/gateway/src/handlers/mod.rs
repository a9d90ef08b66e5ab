//! API handlers module

pub mod analytics;
pub mod chats;
pub mod exchange;
pub mod health;
pub mod models;
