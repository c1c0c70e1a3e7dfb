//! Slot extraction (router stage)
//!
//! One structured LLM call per turn pulls `{departure, arrival, item,
//! attribute}` out of the latest message plus a short history window, and the
//! result is merged into the caller's state with the keep-on-null rule.
//!
//! Extraction is fail-soft: a transport error or unparseable reply leaves
//! the state untouched and the turn falls through to the missing-slot
//! reprompt. The user never sees an extraction failure.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::llm_client::{strip_code_fences, LlmClient};
use crate::state::{ChatMessage, DialogueState, Role, SlotUpdate};

/// History window passed to the extraction call, in turns
const HISTORY_WINDOW: usize = 6;

const SLOT_SYSTEM_PROMPT: &str = r#"You are the slot extractor for a travel baggage regulation chatbot.
From the user's latest message and the conversation context, extract these four slots as JSON.

Output format (pure JSON only):
{
  "departure": "departure country code (KR/US/JP etc., null if unknown)",
  "arrival": "arrival country code (KR/US/JP etc., null if unknown)",
  "item": "item name (null if unknown)",
  "attribute": "quantity/volume or other attribute (null if unknown)"
}

Rules:
- Normalize country names to ISO codes: Korea / South Korea -> KR, United States / USA / America -> US, Japan -> JP
- Use null when a country code is unknown or not mentioned
- Extract departure and arrival as stated even if they are the same country"#;

/// Extracts and merges dialogue slots, one LLM call per turn
pub struct SlotExtractor {
    client: Arc<dyn LlmClient>,
}

impl SlotExtractor {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Extract slots from the latest message and merge them into `current`.
    ///
    /// Returns `current` unchanged on any failure.
    #[instrument(skip_all, fields(message = %user_message))]
    pub async fn extract(
        &self,
        user_message: &str,
        history: &[ChatMessage],
        current: &DialogueState,
    ) -> DialogueState {
        let prompt = self.build_prompt(user_message, history, current);

        let raw = match self.client.chat_json(SLOT_SYSTEM_PROMPT, &prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("slot extraction call failed, keeping prior state: {}", e);
                return current.clone();
            }
        };

        match serde_json::from_str::<SlotUpdate>(strip_code_fences(&raw)) {
            Ok(update) => {
                let merged = current.merge(update);
                debug!(?merged, "slots merged");
                merged
            }
            Err(e) => {
                warn!("unparseable slot extraction output, keeping prior state: {}", e);
                current.clone()
            }
        }
    }

    fn build_prompt(
        &self,
        user_message: &str,
        history: &[ChatMessage],
        current: &DialogueState,
    ) -> String {
        let mut history_text = String::new();
        let start = history.len().saturating_sub(HISTORY_WINDOW);
        for msg in &history[start..] {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "bot",
            };
            history_text.push_str(&format!("{}: {}\n", role, msg.content));
        }

        format!(
            "Current slot state: {}\n\n\
             Recent conversation:\n{}\
             Latest user message: {}\n\n\
             Extract the slots from the above. Keep already-confirmed slots as they are.",
            json!(current),
            history_text,
            user_message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    /// LLM stub returning a fixed reply (or a fixed error)
    struct FixedLlm {
        reply: Result<&'static str, &'static str>,
    }

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn chat(&self, _system: &str, _user: &str) -> Result<String> {
            self.chat_json(_system, _user).await
        }

        async fn chat_json(&self, _system: &str, _user: &str) -> Result<String> {
            self.reply
                .map(str::to_string)
                .map_err(|e| anyhow!(e.to_string()))
        }
    }

    fn extractor(reply: Result<&'static str, &'static str>) -> SlotExtractor {
        SlotExtractor::new(Arc::new(FixedLlm { reply }))
    }

    #[tokio::test]
    async fn test_extract_fills_slots_from_json_reply() {
        let ex = extractor(Ok(
            r#"{"departure": "KR", "arrival": "US", "item": "kimchi", "attribute": null}"#,
        ));
        let state = ex
            .extract("Can I bring kimchi from Korea to the US?", &[], &DialogueState::default())
            .await;
        assert_eq!(state.departure.as_deref(), Some("KR"));
        assert_eq!(state.arrival.as_deref(), Some("US"));
        assert_eq!(state.item.as_deref(), Some("kimchi"));
    }

    #[tokio::test]
    async fn test_extract_keeps_confirmed_slots_on_null() {
        let prior = DialogueState {
            departure: Some("KR".to_string()),
            arrival: Some("US".to_string()),
            item: None,
            attribute: None,
        };
        let ex = extractor(Ok(
            r#"{"departure": null, "arrival": null, "item": "hair dryer", "attribute": null}"#,
        ));
        let state = ex.extract("What about a hair dryer?", &[], &prior).await;
        assert_eq!(state.departure.as_deref(), Some("KR"));
        assert_eq!(state.item.as_deref(), Some("hair dryer"));
    }

    #[tokio::test]
    async fn test_malformed_output_is_a_noop() {
        let prior = DialogueState {
            item: Some("kimchi".to_string()),
            ..Default::default()
        };
        let ex = extractor(Ok("sorry, I can't do that"));
        let state = ex.extract("anything", &[], &prior).await;
        assert_eq!(state, prior);
    }

    #[tokio::test]
    async fn test_transport_failure_is_a_noop() {
        let prior = DialogueState {
            item: Some("kimchi".to_string()),
            ..Default::default()
        };
        let ex = extractor(Err("connection refused"));
        let state = ex.extract("anything", &[], &prior).await;
        assert_eq!(state, prior);
    }

    #[tokio::test]
    async fn test_fenced_json_reply_is_tolerated() {
        let ex = extractor(Ok(
            "```json\n{\"departure\": \"JP\", \"arrival\": null, \"item\": null, \"attribute\": null}\n```",
        ));
        let state = ex.extract("from Japan", &[], &DialogueState::default()).await;
        assert_eq!(state.departure.as_deref(), Some("JP"));
    }
}
