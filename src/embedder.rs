//! Query embedding via the OpenAI embeddings API
//!
//! The regulation corpus is embedded offline with `text-embedding-3-small`;
//! queries must go through the same model or distances against the stored
//! vectors are meaningless. 1536 dimensions, cosine distance.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tracing::debug;

/// Embedding model the corpus was built with
const EMBEDDING_MODEL: &str = "text-embedding-3-small";

const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Embedding dimension for `text-embedding-3-small`
pub const EMBEDDING_DIM: usize = 1536;

/// Query embedder backed by the OpenAI embeddings endpoint
#[derive(Clone)]
pub struct Embedder {
    api_key: String,
    client: reqwest::Client,
    model: String,
}

impl Embedder {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            model: EMBEDDING_MODEL.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key))
    }

    /// Embed one retrieval query
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(EMBEDDINGS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({
                "model": &self.model,
                "input": text,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("embeddings API error {}: {}", status, body));
        }

        #[derive(Deserialize)]
        struct EmbeddingData {
            embedding: Vec<f32>,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            data: Vec<EmbeddingData>,
        }

        let api_response: ApiResponse = response.json().await?;
        let embedding = api_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow!("embeddings API returned no data"))?;

        if embedding.len() != EMBEDDING_DIM {
            return Err(anyhow!(
                "unexpected embedding dimension: got {}, want {}",
                embedding.len(),
                EMBEDDING_DIM
            ));
        }

        debug!(len = text.len(), "query embedded");
        Ok(embedding)
    }
}
