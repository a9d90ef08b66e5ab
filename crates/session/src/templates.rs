//! Quick-start prompts for an empty conversation
//!
//! Offered when a session has no messages yet; picking one feeds the
//! prompt straight into `send_message`.

/// Prompts shown on the empty-chat surface
pub const QUICK_START_PROMPTS: &[&str] = &[
    "How many campuses does the school have?",
    "What master's programs does CY Tech offer?",
    "How much is tuition for a first-year student?",
    "What is the schedule for the school's open house day?",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_prompt_passes_the_send_guard() {
        assert!(!QUICK_START_PROMPTS.is_empty());
        for prompt in QUICK_START_PROMPTS {
            assert!(!prompt.trim().is_empty());
        }
    }
}
