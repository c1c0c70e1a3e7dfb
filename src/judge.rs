//! Judgment synthesis — the three-tier answer policy
//!
//! Tier selection, in priority order:
//! 1. catalog-grounded judging when retrieval produced documents
//! 2. general-knowledge fallback when retrieval is empty because catalog
//!    mapping failed everywhere (higher-capability model, mandatory
//!    disclosure sentence)
//! 3. static fallback when mapping succeeded somewhere but no document
//!    passed an acceptance policy (no LLM call)
//!
//! The worst-case-wins verdict rule is enforced in code, not just prompted:
//! if any contributing document carries a prohibition, the answer's first
//! line is forced to the 🔴 marker.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::llm_client::LlmClient;
use crate::retriever::{Decision, Retrieval, RetrievedDocument};
use crate::state::DialogueState;

/// Tri-state verdict rendered as the answer's first-line marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allowed,
    Conditional,
    Prohibited,
}

impl Verdict {
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Allowed => "🟢",
            Self::Conditional => "🟡",
            Self::Prohibited => "🔴",
        }
    }
}

/// Fixed disclosure appended to every general-knowledge answer
pub const DISCLOSURE: &str = "⚠️ This item is not in the official regulation database; \
this answer is based on general IATA aviation rules. Confirm the exact regulation with \
your airline or at [AvSec365](https://www.avsec365.or.kr).";

/// Static fallback when mapping succeeded but no document was accepted
pub const FALLBACK_MSG: &str = "😓 Sorry — we could not find regulation information for \
that item in our database.\n\nFor accurate guidance, please check with your **airline's \
customer service** or **[AvSec365](https://www.avsec365.or.kr)**.";

const JUDGE_SYSTEM_PROMPT: &str = r#"You are a baggage and customs regulation assistant.
Answer the user's question based on the retrieved regulation documents.

Answer rules:
1. First line: an emoji verdict
   - 🟢 allowed
   - 🟡 conditional (state the conditions)
   - 🔴 prohibited
2. If even one of the departure/arrival regulations is prohibited, the verdict is 🔴
3. Summarize the reasons in 2-3 concise bullet points (-)
4. Cite the regulation provenance (jurisdiction / stage) on one line
5. If the user's item is a sub-type of a catalog entry, mention naturally which
   category regulation was applied
   - e.g. "'knife' falls under the 'knives with blades over 6cm' regulation."
6. When uncertain, do not speculate; politely suggest contacting the airline
7. Answer in English, in a friendly tone"#;

const GENERAL_KNOWLEDGE_SYSTEM_PROMPT: &str = r#"You are an aviation security and customs
regulation expert. The item the user asked about is not registered in the regulation
database.

Answer using this procedure:
1. Infer which aviation regulation category the item belongs to from its properties
   (e.g. power bank -> lithium-ion battery -> IATA dangerous goods rules)
2. Judge by general international aviation rules (IATA, TSA, ICAO)
3. Mention where rules may differ by route (departure vs arrival country)
4. Answer format:
   - First line: 🟢/🟡/🔴 verdict plus a one-line summary
   - 2-3 bullet points with conditions and limits
   - Last line: the fixed disclosure sentence below, verbatim
5. Where unsure, do not speculate; recommend confirming with the airline
6. Answer in English

Fixed disclosure sentence (must be the last line):
⚠️ This item is not in the official regulation database; this answer is based on general IATA aviation rules. Confirm the exact regulation with your airline or at [AvSec365](https://www.avsec365.or.kr)."#;

/// Selects a synthesis tier and produces the user-facing judgment
pub struct JudgeGenerator {
    llm: Arc<dyn LlmClient>,
    advanced_llm: Arc<dyn LlmClient>,
}

impl JudgeGenerator {
    /// `advanced_llm` serves only the general-knowledge tier; passing the
    /// same client twice is fine.
    pub fn new(llm: Arc<dyn LlmClient>, advanced_llm: Arc<dyn LlmClient>) -> Self {
        Self { llm, advanced_llm }
    }

    /// Produce the turn's answer from the retrieval outcome.
    #[instrument(skip_all)]
    pub async fn answer(
        &self,
        user_message: &str,
        state: &DialogueState,
        retrieval: &Retrieval,
    ) -> Result<String> {
        if !retrieval.documents.is_empty() {
            return self.grounded(user_message, state, &retrieval.documents).await;
        }
        if retrieval.total_mapping_failure {
            info!(item = state.item.as_deref().unwrap_or(""), "general-knowledge fallback");
            return self.general_knowledge(user_message, state).await;
        }
        // Mapping found a concept but every hit failed the acceptance
        // policy: answer without guessing.
        Ok(FALLBACK_MSG.to_string())
    }

    async fn grounded(
        &self,
        user_message: &str,
        state: &DialogueState,
        documents: &[RetrievedDocument],
    ) -> Result<String> {
        let context = documents
            .iter()
            .map(|d| {
                format!(
                    "[{} regulation / {}]\nitem: {}\ncarry-on: {} / checked: {} / customs: {}\n{}",
                    d.doc.jurisdiction,
                    d.doc.stage,
                    d.doc.item,
                    d.doc.carry_on.as_str(),
                    d.doc.checked_baggage.as_str(),
                    d.doc.customs_admissibility.as_str(),
                    d.doc.excerpt
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "Route: {} → {}\nItem asked about: {}{}\nUser question: {}\n\n\
             Retrieved regulations:\n{}\n\n\
             Answer based on the regulations above. If the user's item is a sub-type of a \
             catalog entry (e.g. 'knife' → 'knives with blades over 6cm'), mention which \
             regulation was applied.",
            state.departure.as_deref().unwrap_or("?"),
            state.arrival.as_deref().unwrap_or("?"),
            state.item.as_deref().unwrap_or("?"),
            state
                .attribute
                .as_deref()
                .map(|a| format!(" ({a})"))
                .unwrap_or_default(),
            user_message,
            context
        );

        let response = self.llm.chat(JUDGE_SYSTEM_PROMPT, &prompt).await?;
        Ok(enforce_verdict_floor(response, verdict_floor(documents)))
    }

    async fn general_knowledge(&self, user_message: &str, state: &DialogueState) -> Result<String> {
        let prompt = format!(
            "Route: {} → {}\nItem asked about: \"{}\"\nUser question: {}\n\n\
             This item is not registered in the regulation database. Infer its properties \
             and answer by general international aviation rules (IATA, TSA).",
            state.departure.as_deref().unwrap_or("?"),
            state.arrival.as_deref().unwrap_or("?"),
            state.item.as_deref().unwrap_or("?"),
            user_message
        );

        let mut response = self.advanced_llm.chat(GENERAL_KNOWLEDGE_SYSTEM_PROMPT, &prompt).await?;

        // The disclosure is mandatory even when the model drops it.
        if !response.contains(DISCLOSURE) {
            warn!("model omitted disclosure, appending");
            response.push_str("\n\n");
            response.push_str(DISCLOSURE);
        }
        Ok(response)
    }
}

/// Worst-case verdict implied by the documents' decision fields, if any.
fn verdict_floor(documents: &[RetrievedDocument]) -> Option<Verdict> {
    let any_prohibited = documents
        .iter()
        .flat_map(|d| d.doc.decisions())
        .any(|d| d == Decision::Prohibited);
    any_prohibited.then_some(Verdict::Prohibited)
}

/// Force the first-line marker when the documents imply prohibition and the
/// model judged otherwise.
fn enforce_verdict_floor(response: String, floor: Option<Verdict>) -> String {
    let Some(Verdict::Prohibited) = floor else {
        return response;
    };
    let first_line = response.lines().next().unwrap_or_default();
    if first_line.contains(Verdict::Prohibited.marker()) {
        return response;
    }
    warn!("model verdict below prohibition floor, overriding to 🔴");
    format!(
        "🔴 Prohibited — at least one jurisdiction on this route prohibits this item.\n{}",
        response
    )
}
