//! Ragline Common Library
//!
//! Shared code for the Ragline services including:
//! - Database models and repository patterns
//! - Answer backend client and stream decoding
//! - Analytics aggregation
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Metrics and observability

pub mod analytics;
pub mod answerer;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;

// Re-export commonly used types
pub use answerer::{AnswerClient, AnswerReply, AskRequest, RetrievedSource, SourceMetadata};
pub use config::AppConfig;
pub use db::{ChatSummary, Repository};
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
