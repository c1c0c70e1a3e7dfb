//! Error types for the advisor pipeline
//!
//! Most external failures are handled fail-soft inside the pipeline
//! (unchanged state for extraction, empty mapping for the mapper). The
//! variants here are the ones that escape to the caller.

use thiserror::Error;

/// Errors surfaced by the advisor library
#[derive(Debug, Error)]
pub enum AdvisorError {
    /// LLM API call failed (transport or non-2xx response)
    #[error("LLM call failed: {0}")]
    Llm(String),

    /// Model returned text that does not match the expected schema
    #[error("malformed model output: {0}")]
    MalformedOutput(String),

    /// Query embedding could not be computed
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Vector store query failed. Kept distinct from "no matches found" so
    /// an outage is never presented to the user as a missing regulation.
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] sqlx::Error),

    /// Catalog could not be loaded at startup
    #[error("catalog load failed: {0}")]
    Catalog(String),
}
