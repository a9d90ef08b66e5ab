//! Ragline Session Library
//!
//! Client-side conversation state for the Ragline chat surface:
//! - Session controller and its send/stream state machine
//! - Display message model for rendering a conversation
//! - Generation options carried on every exchange
//! - Transport seam over the gateway or the answering backend
//! - Quick-start prompts offered on an empty session

pub mod message;
pub mod options;
pub mod session;
pub mod templates;
pub mod transport;

// Re-export commonly used types
pub use message::{DisplayMessage, Sender, StoredMessage};
pub use options::ChatOptions;
pub use session::ChatSession;
pub use templates::QUICK_START_PROMPTS;
pub use transport::{ChatTransport, ExchangeRecord, HttpTransport, MockTransport};
