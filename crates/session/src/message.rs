//! Display-side message model
//!
//! What the conversation surface renders: one entry per turn, bot
//! entries carrying whatever the answer pipeline attached to them.
//! Stored history fetched from the gateway converts losslessly into
//! this shape.

use ragline_common::answerer::RetrievedSource;
use serde::{Deserialize, Serialize};

/// Which side of the conversation a message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Bot => "bot",
        }
    }
}

/// One rendered conversation entry.
///
/// A streamed reply keeps `is_streaming` true while fragments are
/// still arriving; every other message leaves it false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayMessage {
    pub sender: Sender,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<RetrievedSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub is_streaming: bool,
}

impl DisplayMessage {
    /// A user turn holding exactly the submitted text
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            sources: Vec::new(),
            evaluation: None,
            processing_time: None,
            model: None,
            is_streaming: false,
        }
    }

    /// A completed bot turn with no attachments
    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Bot,
            text: text.into(),
            ..Self::user("")
        }
    }

    /// The empty bot turn a streamed reply accumulates into
    pub fn streaming_placeholder(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            is_streaming: true,
            ..Self::bot("")
        }
    }
}

/// A message as the gateway returns it from chat history
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub sources: Vec<RetrievedSource>,
}

impl From<StoredMessage> for DisplayMessage {
    fn from(stored: StoredMessage) -> Self {
        // Anything that is not the user's turn renders as the bot's
        let sender = if stored.role == "user" {
            Sender::User
        } else {
            Sender::Bot
        };

        Self {
            sender,
            text: stored.content,
            sources: stored.sources,
            evaluation: None,
            processing_time: stored.processing_time,
            model: stored.model,
            is_streaming: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_fill_expected_defaults() {
        let user = DisplayMessage::user("Hello");
        assert_eq!(user.sender, Sender::User);
        assert_eq!(user.text, "Hello");
        assert!(user.sources.is_empty());
        assert!(!user.is_streaming);

        let bot = DisplayMessage::bot("Hi");
        assert_eq!(bot.sender, Sender::Bot);
        assert_eq!(bot.model, None);

        let placeholder = DisplayMessage::streaming_placeholder("mistral");
        assert_eq!(placeholder.sender, Sender::Bot);
        assert_eq!(placeholder.text, "");
        assert_eq!(placeholder.model.as_deref(), Some("mistral"));
        assert!(placeholder.is_streaming);
    }

    #[test]
    fn test_stored_history_round_trips_through_display() {
        let stored: Vec<StoredMessage> = serde_json::from_str(
            r#"[
                {
                    "id": "9e107d9d-3720-4f2a-9f41-1b2f7a3c5d6e",
                    "role": "user",
                    "content": "What is CY Tech?",
                    "createdAt": "2025-06-01T12:00:00Z"
                },
                {
                    "id": "6f1b2c3d-4e5f-4a6b-8c7d-9e0f1a2b3c4d",
                    "role": "bot",
                    "content": "An engineering school.",
                    "model": "mistral",
                    "processingTime": 2.4,
                    "sources": [
                        {
                            "id": "0d1e2f3a-4b5c-4d6e-8f70-8192a3b4c5d6",
                            "content": "excerpt",
                            "metadata": {"title": "About", "type": "pdf"}
                        }
                    ],
                    "createdAt": "2025-06-01T12:00:03Z"
                }
            ]"#,
        )
        .unwrap();

        let displayed: Vec<DisplayMessage> =
            stored.into_iter().map(DisplayMessage::from).collect();

        assert_eq!(displayed[0].sender, Sender::User);
        assert_eq!(displayed[0].text, "What is CY Tech?");
        assert_eq!(displayed[0].processing_time, None);

        assert_eq!(displayed[1].sender, Sender::Bot);
        assert_eq!(displayed[1].text, "An engineering school.");
        assert_eq!(displayed[1].model.as_deref(), Some("mistral"));
        assert_eq!(displayed[1].processing_time, Some(2.4));
        assert_eq!(displayed[1].sources.len(), 1);
        assert_eq!(displayed[1].sources[0].content, "excerpt");
        assert_eq!(
            displayed[1].sources[0].metadata.title.as_deref(),
            Some("About")
        );
        assert!(!displayed[1].is_streaming);
    }

    #[test]
    fn test_unknown_role_renders_as_bot() {
        let stored = StoredMessage {
            role: "assistant".to_string(),
            content: "Hello".to_string(),
            model: None,
            processing_time: None,
            sources: Vec::new(),
        };

        assert_eq!(DisplayMessage::from(stored).sender, Sender::Bot);
    }

    #[test]
    fn test_display_message_wire_shape() {
        let message = DisplayMessage {
            processing_time: Some(1.5),
            ..DisplayMessage::bot("Hi")
        };

        let value = serde_json::to_value(&message).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj["sender"], "bot");
        assert_eq!(obj["processingTime"], 1.5);
        assert_eq!(obj["isStreaming"], false);
        assert!(!obj.contains_key("sources"));
        assert!(!obj.contains_key("model"));
    }
}
