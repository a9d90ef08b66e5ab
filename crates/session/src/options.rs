//! Generation options for an exchange
//!
//! One value per tunable the conversation surface exposes. Unset
//! optional parameters stay out of the outbound request entirely so
//! the backend applies its own defaults.

use ragline_common::answerer::AskRequest;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tunables applied to every exchange in a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOptions {
    pub evaluate_sources: bool,
    pub use_reranker: bool,
    pub use_streaming: bool,
    pub use_multi_query: bool,
    pub temperature: f64,
    pub top_p: Option<f64>,
    pub top_k: Option<i32>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub repetition_penalty: Option<f64>,
    pub seed: Option<i64>,
    /// Number of documents to retrieve
    pub retrieval_k: Option<i32>,
    /// Number of documents to keep after reranking
    pub rerank_k: Option<i32>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            evaluate_sources: false,
            use_reranker: true,
            use_streaming: true,
            use_multi_query: false,
            temperature: 1.0,
            top_p: None,
            top_k: None,
            frequency_penalty: None,
            presence_penalty: None,
            repetition_penalty: None,
            seed: None,
            retrieval_k: None,
            rerank_k: None,
        }
    }
}

impl ChatOptions {
    /// Temperature as actually sent. The backend replaces anything
    /// outside [0, 2] with 1.0; the same substitution happens here so
    /// the request already carries the value that will be used.
    pub fn effective_temperature(&self) -> f64 {
        if (0.0..=2.0).contains(&self.temperature) {
            self.temperature
        } else {
            1.0
        }
    }

    /// Build the outbound request for one question
    pub fn to_request(
        &self,
        question: impl Into<String>,
        model: impl Into<String>,
        chat_id: Option<Uuid>,
    ) -> AskRequest {
        AskRequest {
            question: question.into(),
            model: model.into(),
            chat_id,
            evaluate_sources: self.evaluate_sources,
            use_reranker: self.use_reranker,
            use_multi_query: self.use_multi_query,
            temperature: self.effective_temperature(),
            top_p: self.top_p,
            top_k: self.top_k,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
            repetition_penalty: self.repetition_penalty,
            seed: self.seed,
            retrieval_k: self.retrieval_k,
            rerank_k: self.rerank_k,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_the_initial_surface_state() {
        let options = ChatOptions::default();
        assert!(!options.evaluate_sources);
        assert!(options.use_reranker);
        assert!(options.use_streaming);
        assert!(!options.use_multi_query);
        assert_eq!(options.temperature, 1.0);
        assert_eq!(options.top_p, None);
        assert_eq!(options.seed, None);
    }

    #[test]
    fn test_out_of_range_temperature_is_replaced() {
        let mut options = ChatOptions::default();

        options.temperature = 2.5;
        assert_eq!(options.effective_temperature(), 1.0);

        options.temperature = -0.1;
        assert_eq!(options.effective_temperature(), 1.0);

        options.temperature = 0.0;
        assert_eq!(options.effective_temperature(), 0.0);

        options.temperature = 2.0;
        assert_eq!(options.effective_temperature(), 2.0);
    }

    #[test]
    fn test_to_request_carries_options_through() {
        let options = ChatOptions {
            temperature: 7.0,
            top_p: Some(0.9),
            retrieval_k: Some(4),
            ..Default::default()
        };

        let request = options.to_request("What is CY Tech?", "mistral", None);

        assert_eq!(request.question, "What is CY Tech?");
        assert_eq!(request.model, "mistral");
        assert_eq!(request.chat_id, None);
        assert!(request.use_reranker);
        assert_eq!(request.temperature, 1.0);
        assert_eq!(request.top_p, Some(0.9));
        assert_eq!(request.retrieval_k, Some(4));
        assert_eq!(request.rerank_k, None);
    }
}
