//! Catalog mapping (rewriter stage)
//!
//! Maps a free-text item mention onto the closed per-jurisdiction catalog.
//! The model is shown the entire canonical list for one jurisdiction and
//! asked to pick related entries; anything it returns that is not literally
//! in that list is discarded. Selecting from a closed list instead of
//! generating free text keeps user vocabulary and catalog terminology from
//! drifting apart, and bounds hallucination to "must appear in the list".

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::catalog::Catalog;
use crate::llm_client::{strip_code_fences, LlmClient};

/// Maximum catalog entries the model may select per jurisdiction
pub const MAX_MAPPED: usize = 3;

const MAP_SYSTEM_PROMPT: &str = r#"You are the item-mapping expert for a travel regulation catalog.

Decide which entries of the catalog list below the user's item relates to.

Rules:
1. Select an entry when the user's item is directly contained in it or is a broader term for it
   - e.g. "knife" -> "knives with blades over 6cm", "axes, hatchets and large cleavers"
   - e.g. "gun" -> "all firearms (pistols, rifles, shotguns)"
2. Select an entry when the user's item is a specific instance of that category
   - e.g. "roasted grain powder" -> "processed/canned food", "agricultural products/food"
   - e.g. "sunglasses" -> no related entry
3. Select at most 3 related entries
4. Return an empty array when nothing is related

Output format (pure JSON array only):
["entry name 1", "entry name 2"]  or  []"#;

/// Per-jurisdiction mapping outcome for one turn
#[derive(Debug, Clone, Default)]
pub struct MappingResult {
    by_jurisdiction: HashMap<String, Vec<String>>,
}

impl MappingResult {
    pub fn insert(&mut self, jurisdiction: impl Into<String>, mapped: Vec<String>) {
        self.by_jurisdiction.insert(jurisdiction.into(), mapped);
    }

    /// Mapped canonical names for a jurisdiction. Empty means "no catalog
    /// match" for that jurisdiction, not an error.
    pub fn mapped_for(&self, jurisdiction: &str) -> &[String] {
        self.by_jurisdiction
            .get(jurisdiction)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True iff no queried jurisdiction produced any candidate. This is the
    /// condition that routes the turn to the general-knowledge tier.
    pub fn total_failure(&self) -> bool {
        self.by_jurisdiction.values().all(Vec::is_empty)
    }
}

/// Maps item mentions onto the catalog, one LLM call per jurisdiction
pub struct CatalogMapper {
    client: Arc<dyn LlmClient>,
    catalog: Arc<Catalog>,
}

impl CatalogMapper {
    pub fn new(client: Arc<dyn LlmClient>, catalog: Arc<Catalog>) -> Self {
        Self { client, catalog }
    }

    /// Select related catalog entries for `item` in each jurisdiction.
    ///
    /// A jurisdiction with an empty catalog, a failed call, or an
    /// unparseable reply yields an empty list, never an error.
    #[instrument(skip(self), fields(item = %item))]
    pub async fn map(&self, item: &str, jurisdictions: &[String]) -> MappingResult {
        let mut result = MappingResult::default();

        for jur in jurisdictions {
            let candidates = self.catalog.items_for(jur);
            if candidates.is_empty() {
                result.insert(jur.clone(), Vec::new());
                continue;
            }
            let mapped = self.map_one(item, jur, candidates).await;
            debug!(jurisdiction = %jur, ?mapped, "catalog mapping");
            result.insert(jur.clone(), mapped);
        }

        result
    }

    async fn map_one(&self, item: &str, jurisdiction: &str, candidates: &[String]) -> Vec<String> {
        let list_text = candidates
            .iter()
            .map(|it| format!("  - {}", it))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "User item: \"{item}\"\n\n\
             [{jurisdiction}] catalog entries:\n{list_text}\n\n\
             From the entries above, pick the ones related to the user item \"{item}\"."
        );

        let raw = match self.client.chat(MAP_SYSTEM_PROMPT, &prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(jurisdiction, "mapping call failed, treating as no match: {}", e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<String>>(strip_code_fences(&raw)) {
            Ok(selected) => selected
                .into_iter()
                // No hallucinated entries survive: literal membership only.
                .filter(|name| candidates.contains(name))
                .take(MAX_MAPPED)
                .collect(),
            Err(e) => {
                warn!(jurisdiction, "unparseable mapping output, treating as no match: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogRecord;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    struct FixedLlm {
        reply: Result<&'static str, &'static str>,
    }

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn chat(&self, _system: &str, _user: &str) -> Result<String> {
            self.reply
                .map(str::to_string)
                .map_err(|e| anyhow!(e.to_string()))
        }

        async fn chat_json(&self, system: &str, user: &str) -> Result<String> {
            self.chat(system, user).await
        }
    }

    fn catalog() -> Arc<Catalog> {
        Arc::new(Catalog::from_records(vec![
            CatalogRecord {
                jurisdiction: "KR".to_string(),
                item: "knives with blades over 6cm".to_string(),
            },
            CatalogRecord {
                jurisdiction: "KR".to_string(),
                item: "axes, hatchets and large cleavers".to_string(),
            },
            CatalogRecord {
                jurisdiction: "KR".to_string(),
                item: "all firearms (pistols, rifles, shotguns)".to_string(),
            },
            CatalogRecord {
                jurisdiction: "KR".to_string(),
                item: "aerosols".to_string(),
            },
            CatalogRecord {
                jurisdiction: "US".to_string(),
                item: "processed/canned food".to_string(),
            },
        ]))
    }

    fn mapper(reply: Result<&'static str, &'static str>) -> CatalogMapper {
        CatalogMapper::new(Arc::new(FixedLlm { reply }), catalog())
    }

    fn jurs(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn test_only_literal_catalog_members_survive() {
        let m = mapper(Ok(
            r#"["knives with blades over 6cm", "made-up entry", "aerosols"]"#,
        ));
        let result = m.map("knife", &jurs(&["KR"])).await;
        assert_eq!(
            result.mapped_for("KR"),
            ["knives with blades over 6cm", "aerosols"]
        );
    }

    #[tokio::test]
    async fn test_selection_truncated_to_max_mapped() {
        let m = mapper(Ok(
            r#"["knives with blades over 6cm", "axes, hatchets and large cleavers", "all firearms (pistols, rifles, shotguns)", "aerosols"]"#,
        ));
        let result = m.map("weapon", &jurs(&["KR"])).await;
        assert_eq!(result.mapped_for("KR").len(), MAX_MAPPED);
    }

    #[tokio::test]
    async fn test_empty_catalog_jurisdiction_maps_empty() {
        let m = mapper(Ok(r#"["anything"]"#));
        let result = m.map("knife", &jurs(&["JP"])).await;
        assert!(result.mapped_for("JP").is_empty());
        assert!(result.total_failure());
    }

    #[tokio::test]
    async fn test_unparseable_reply_maps_empty() {
        let m = mapper(Ok("I think the knife entry fits best"));
        let result = m.map("knife", &jurs(&["KR"])).await;
        assert!(result.mapped_for("KR").is_empty());
    }

    #[tokio::test]
    async fn test_failed_call_maps_empty() {
        let m = mapper(Err("timeout"));
        let result = m.map("knife", &jurs(&["KR"])).await;
        assert!(result.mapped_for("KR").is_empty());
        assert!(result.total_failure());
    }

    #[tokio::test]
    async fn test_total_failure_requires_all_jurisdictions_empty() {
        let mut result = MappingResult::default();
        result.insert("KR", vec!["aerosols".to_string()]);
        result.insert("US", Vec::new());
        assert!(!result.total_failure());

        let mut all_empty = MappingResult::default();
        all_empty.insert("KR", Vec::new());
        all_empty.insert("US", Vec::new());
        assert!(all_empty.total_failure());
    }

    #[tokio::test]
    async fn test_fenced_array_reply_is_tolerated() {
        let m = mapper(Ok("```json\n[\"aerosols\"]\n```"));
        let result = m.map("spray", &jurs(&["KR"])).await;
        assert_eq!(result.mapped_for("KR"), ["aerosols"]);
    }
}
