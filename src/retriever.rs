//! Jurisdiction-filtered vector retrieval
//!
//! For each leg of the route the retriever runs one filtered similarity
//! search, then applies one of two acceptance policies:
//!
//! - **precision mode** (catalog mapping succeeded): the query is the mapped
//!   canonical names joined with the raw mention, and a hit is accepted only
//!   if its catalog item is one of the mapped names. Distance is not a gate
//!   here — once the mapper has confirmed a concept match, paraphrase noise
//!   makes distance an unreliable discriminator, so membership is
//!   authoritative.
//! - **recall mode** (mapping empty): the query is the raw mention alone and
//!   a hit is accepted only if its distance is within `max_distance`,
//!   because distance is the only signal left.
//!
//! Results are deduplicated across jurisdictions by `doc_id`.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use pgvector::Vector;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, instrument, warn};

use crate::embedder::Embedder;
use crate::error::AdvisorError;
use crate::mapper::MappingResult;
use crate::state::DialogueState;

/// Admissibility decision carried by a regulation document, per stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allowed,
    Conditional,
    Prohibited,
    NotApplicable,
}

impl Decision {
    /// Parse a stored decision value. Unknown values collapse to
    /// `NotApplicable` rather than failing the row.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "allowed" => Self::Allowed,
            "conditional" => Self::Conditional,
            "prohibited" => Self::Prohibited,
            _ => Self::NotApplicable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Conditional => "conditional",
            Self::Prohibited => "prohibited",
            Self::NotApplicable => "not_applicable",
        }
    }
}

/// One regulation document as stored in the vector store
#[derive(Debug, Clone)]
pub struct RegulationDoc {
    /// Dedup key across jurisdictions
    pub doc_id: String,
    pub jurisdiction: String,
    /// Regulation stage: security screening, customs, ...
    pub stage: String,
    /// Canonical catalog item this document regulates
    pub item: String,
    pub carry_on: Decision,
    pub checked_baggage: Decision,
    pub customs_admissibility: Decision,
    /// Free-text regulation excerpt fed to the judge
    pub excerpt: String,
}

impl RegulationDoc {
    /// All per-stage decisions of this document
    pub fn decisions(&self) -> [Decision; 3] {
        [self.carry_on, self.checked_baggage, self.customs_admissibility]
    }
}

/// A document that passed an acceptance policy this turn
#[derive(Debug, Clone)]
pub struct RetrievedDocument {
    pub doc: RegulationDoc,
    /// Similarity distance, lower = closer
    pub distance: f32,
    /// True when accepted via the precision (catalog-mapped) policy
    pub mapped: bool,
}

/// Read-only similarity search handle
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Top-`k` documents for `query` within one jurisdiction, closest first,
    /// each with its similarity distance.
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        jurisdiction: &str,
    ) -> Result<Vec<(RegulationDoc, f32)>, AdvisorError>;
}

/// pgvector-backed store over the `regulation_chunks` table
pub struct PgVectorStore {
    pool: PgPool,
    embedder: Embedder,
}

impl PgVectorStore {
    pub fn new(pool: PgPool, embedder: Embedder) -> Self {
        Self { pool, embedder }
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        jurisdiction: &str,
    ) -> Result<Vec<(RegulationDoc, f32)>, AdvisorError> {
        let embedding = self
            .embedder
            .embed_query(query)
            .await
            .map_err(|e| AdvisorError::Embedding(e.to_string()))?;
        let embedding = Vector::from(embedding);

        let rows = sqlx::query_as::<
            _,
            (String, String, String, String, String, String, String, String, f64),
        >(
            r#"
            SELECT
                doc_id,
                jurisdiction,
                stage,
                item,
                carry_on,
                checked_baggage,
                customs_admissibility,
                excerpt,
                (embedding <=> $1::vector)::float8 AS distance
            FROM regulation_chunks
            WHERE jurisdiction = $2
            ORDER BY embedding <=> $1::vector
            LIMIT $3
            "#,
        )
        .bind(&embedding)
        .bind(jurisdiction)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(doc_id, jurisdiction, stage, item, carry_on, checked, customs, excerpt, dist)| {
                    (
                        RegulationDoc {
                            doc_id,
                            jurisdiction,
                            stage,
                            item,
                            carry_on: Decision::parse(&carry_on),
                            checked_baggage: Decision::parse(&checked),
                            customs_admissibility: Decision::parse(&customs),
                            excerpt,
                        },
                        dist as f32,
                    )
                },
            )
            .collect())
    }
}

/// Retriever tunables
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Results requested per similarity search
    pub top_k: usize,
    /// Acceptance threshold for recall mode (unmapped queries)
    pub max_distance: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_distance: 1.2,
        }
    }
}

/// Outcome of the retrieval stage for one turn
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub documents: Vec<RetrievedDocument>,
    /// True iff catalog mapping produced no candidate for any queried
    /// jurisdiction
    pub total_mapping_failure: bool,
}

/// Runs the per-jurisdiction searches and acceptance policies
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    config: RetrieverConfig,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self::with_config(store, RetrieverConfig::default())
    }

    pub fn with_config(store: Arc<dyn VectorStore>, config: RetrieverConfig) -> Self {
        Self { store, config }
    }

    /// Retrieve regulation documents for the filled-in state.
    ///
    /// A store failure propagates as [`AdvisorError::Retrieval`]; it is
    /// never presented as "no regulation found".
    #[instrument(skip_all, fields(item = state.item.as_deref().unwrap_or("")))]
    pub async fn retrieve(
        &self,
        state: &DialogueState,
        mapping: &MappingResult,
    ) -> Result<Retrieval, AdvisorError> {
        let item = state.item.as_deref().unwrap_or_default();
        let jurisdictions = state.jurisdictions();

        let total_mapping_failure = jurisdictions
            .iter()
            .all(|jur| mapping.mapped_for(jur).is_empty());

        let mut documents = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();

        for jur in &jurisdictions {
            let mapped_items = mapping.mapped_for(jur);

            let query = if mapped_items.is_empty() {
                item.to_string()
            } else {
                format!("{} {}", mapped_items.join(" "), item)
            };

            let results = self
                .store
                .similarity_search(&query, self.config.top_k, jur)
                .await?;
            debug!(jurisdiction = %jur, hits = results.len(), mapped = !mapped_items.is_empty(), "similarity search");

            for (doc, distance) in results {
                let accepted = if mapped_items.is_empty() {
                    distance <= self.config.max_distance
                } else {
                    mapped_items.contains(&doc.item)
                };
                if !accepted {
                    continue;
                }
                if !seen_ids.insert(doc.doc_id.clone()) {
                    continue;
                }
                documents.push(RetrievedDocument {
                    doc,
                    distance,
                    mapped: !mapped_items.is_empty(),
                });
            }
        }

        if documents.is_empty() {
            warn!(item, total_mapping_failure, "no documents accepted");
        }

        Ok(Retrieval {
            documents,
            total_mapping_failure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory store returning canned per-jurisdiction results
    pub struct StubStore {
        pub results: Vec<(RegulationDoc, f32)>,
    }

    #[async_trait]
    impl VectorStore for StubStore {
        async fn similarity_search(
            &self,
            _query: &str,
            k: usize,
            jurisdiction: &str,
        ) -> Result<Vec<(RegulationDoc, f32)>, AdvisorError> {
            Ok(self
                .results
                .iter()
                .filter(|(doc, _)| doc.jurisdiction == jurisdiction)
                .take(k)
                .cloned()
                .collect())
        }
    }

    pub fn doc(doc_id: &str, jur: &str, item: &str) -> RegulationDoc {
        RegulationDoc {
            doc_id: doc_id.to_string(),
            jurisdiction: jur.to_string(),
            stage: "security screening".to_string(),
            item: item.to_string(),
            carry_on: Decision::Conditional,
            checked_baggage: Decision::Allowed,
            customs_admissibility: Decision::NotApplicable,
            excerpt: format!("regulation text for {item}"),
        }
    }

    fn state() -> DialogueState {
        DialogueState {
            departure: Some("KR".to_string()),
            arrival: Some("US".to_string()),
            item: Some("knife".to_string()),
            attribute: None,
        }
    }

    fn mapping_kr_only() -> MappingResult {
        let mut mapping = MappingResult::default();
        mapping.insert("KR", vec!["knives with blades over 6cm".to_string()]);
        mapping.insert("US", Vec::new());
        mapping
    }

    #[tokio::test]
    async fn test_precision_mode_accepts_only_mapped_items() {
        let store = StubStore {
            results: vec![
                // Closest hit is an unrelated item: must be rejected despite distance.
                (doc("kr-1", "KR", "aerosols"), 0.1),
                (doc("kr-2", "KR", "knives with blades over 6cm"), 1.9),
            ],
        };
        let retriever = Retriever::new(Arc::new(store));
        let retrieval = retriever.retrieve(&state(), &mapping_kr_only()).await.unwrap();

        let kr_docs: Vec<_> = retrieval
            .documents
            .iter()
            .filter(|d| d.doc.jurisdiction == "KR")
            .collect();
        assert_eq!(kr_docs.len(), 1);
        assert_eq!(kr_docs[0].doc.item, "knives with blades over 6cm");
        assert!(kr_docs[0].mapped);
        // Distance is not a gate in precision mode.
        assert!(kr_docs[0].distance > 1.2);
    }

    #[tokio::test]
    async fn test_recall_mode_gates_on_distance() {
        let store = StubStore {
            results: vec![
                (doc("us-1", "US", "processed/canned food"), 0.8),
                (doc("us-2", "US", "agricultural products"), 1.5),
            ],
        };
        let retriever = Retriever::new(Arc::new(store));
        let retrieval = retriever.retrieve(&state(), &mapping_kr_only()).await.unwrap();

        let us_docs: Vec<_> = retrieval
            .documents
            .iter()
            .filter(|d| d.doc.jurisdiction == "US")
            .collect();
        assert_eq!(us_docs.len(), 1);
        assert_eq!(us_docs[0].doc.doc_id, "us-1");
        assert!(!us_docs[0].mapped);
    }

    #[tokio::test]
    async fn test_dedup_across_jurisdiction_queries() {
        let mut mapping = MappingResult::default();
        mapping.insert("KR", Vec::new());
        mapping.insert("US", Vec::new());

        // Same doc_id surfaced for both legs.
        let store = StubStore {
            results: vec![
                (doc("shared", "KR", "aerosols"), 0.5),
                (doc("shared", "US", "aerosols"), 0.6),
            ],
        };
        let retriever = Retriever::new(Arc::new(store));
        let retrieval = retriever.retrieve(&state(), &mapping).await.unwrap();
        assert_eq!(retrieval.documents.len(), 1);
        assert!(retrieval.total_mapping_failure);
    }

    #[tokio::test]
    async fn test_total_mapping_failure_false_when_any_leg_mapped() {
        let store = StubStore { results: vec![] };
        let retriever = Retriever::new(Arc::new(store));
        let retrieval = retriever.retrieve(&state(), &mapping_kr_only()).await.unwrap();
        assert!(!retrieval.total_mapping_failure);
        assert!(retrieval.documents.is_empty());
    }

    #[tokio::test]
    async fn test_same_jurisdiction_queried_once() {
        // departure == arrival never reaches retrieval in the orchestrator,
        // but the retriever itself must still not double-query.
        let state = DialogueState {
            departure: Some("KR".to_string()),
            arrival: Some("KR".to_string()),
            item: Some("knife".to_string()),
            attribute: None,
        };
        let mut mapping = MappingResult::default();
        mapping.insert("KR", Vec::new());

        let store = StubStore {
            results: vec![(doc("kr-1", "KR", "aerosols"), 0.5)],
        };
        let retriever = Retriever::new(Arc::new(store));
        let retrieval = retriever.retrieve(&state, &mapping).await.unwrap();
        assert_eq!(retrieval.documents.len(), 1);
    }

    #[test]
    fn test_decision_parse() {
        assert_eq!(Decision::parse("prohibited"), Decision::Prohibited);
        assert_eq!(Decision::parse("  Allowed "), Decision::Allowed);
        assert_eq!(Decision::parse("whatever"), Decision::NotApplicable);
    }
}
