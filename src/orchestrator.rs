//! Turn orchestration
//!
//! One [`DialogueOrchestrator`] is constructed per process and shared across
//! conversations; it holds only read-only handles (LLM clients, vector
//! store, catalog). Per-conversation state lives with the caller, which
//! passes it in and persists whatever comes back.
//!
//! Turn sequence: broad-query short-circuit → slot extraction →
//! missing-slot reprompt → catalog mapping + retrieval → judgment.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::catalog::Catalog;
use crate::error::AdvisorError;
use crate::extractor::SlotExtractor;
use crate::judge::JudgeGenerator;
use crate::llm_client::LlmClient;
use crate::mapper::CatalogMapper;
use crate::retriever::{Retriever, RetrieverConfig, VectorStore};
use crate::state::{ChatMessage, DialogueState};

/// Keywords that mark a broad "tell me everything" query. Matched against
/// whole words of the lowercased message, only while no item is known.
const BROAD_KEYWORDS: &[&str] = &["all", "everything", "anything", "list", "categories"];

/// Fixed menu returned for broad queries, without touching the LLM or store
pub const CATEGORY_MENU: &str = "🗂️ Which category of regulations are you interested in?\n\n\
Pick one below, or just name the item directly.\n\
- 🔫 Firearms & weapons\n\
- 🔪 Blades & tools\n\
- 💊 Medication & medical devices\n\
- 🧴 Liquids, gels & sprays\n\
- 🔋 Batteries & electronics\n\
- 🍎 Food & agricultural products\n\
- 💰 Cash & valuables";

/// Top-level turn handler wiring the pipeline stages together
pub struct DialogueOrchestrator {
    extractor: SlotExtractor,
    mapper: CatalogMapper,
    retriever: Retriever,
    judge: JudgeGenerator,
}

impl DialogueOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        advanced_llm: Arc<dyn LlmClient>,
        store: Arc<dyn VectorStore>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self::with_config(llm, advanced_llm, store, catalog, RetrieverConfig::default())
    }

    pub fn with_config(
        llm: Arc<dyn LlmClient>,
        advanced_llm: Arc<dyn LlmClient>,
        store: Arc<dyn VectorStore>,
        catalog: Arc<Catalog>,
        retriever_config: RetrieverConfig,
    ) -> Self {
        Self {
            extractor: SlotExtractor::new(llm.clone()),
            mapper: CatalogMapper::new(llm.clone(), catalog),
            retriever: Retriever::with_config(store, retriever_config),
            judge: JudgeGenerator::new(llm, advanced_llm),
        }
    }

    /// Handle one conversation turn.
    ///
    /// Returns the response text and the updated state; the caller persists
    /// the state for the next turn. Soft failures (extraction, mapping) are
    /// absorbed per stage; only retrieval-infrastructure and judge-LLM
    /// failures surface as errors.
    #[instrument(skip_all, fields(message = %user_message))]
    pub async fn run_turn(
        &self,
        user_message: &str,
        history: &[ChatMessage],
        state: &DialogueState,
    ) -> Result<(String, DialogueState), AdvisorError> {
        // Broad-query short-circuit: no LLM, no store, state untouched.
        if state.item.is_none() && is_broad_query(user_message) {
            debug!("broad query short-circuit");
            return Ok((CATEGORY_MENU.to_string(), state.clone()));
        }

        let updated = self.extractor.extract(user_message, history, state).await;

        if let Some(reprompt) = updated.missing() {
            debug!(?updated, "missing slots, reprompting");
            return Ok((reprompt.to_string(), updated));
        }

        let item = updated.item.as_deref().unwrap_or_default();
        let jurisdictions = updated.jurisdictions();
        let mapping = self.mapper.map(item, &jurisdictions).await;
        let retrieval = self.retriever.retrieve(&updated, &mapping).await?;

        let answer = self
            .judge
            .answer(user_message, &updated, &retrieval)
            .await
            .map_err(|e| AdvisorError::Llm(e.to_string()))?;

        Ok((answer, updated))
    }
}

fn is_broad_query(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| BROAD_KEYWORDS.contains(&word))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broad_query_matches_whole_words() {
        assert!(is_broad_query("list everything please"));
        assert!(is_broad_query("show me ALL of it"));
        // "all" inside another word must not trigger.
        assert!(!is_broad_query("can I bring a baseball?"));
        assert!(!is_broad_query("a small knife"));
    }
}
