//! LLM client abstraction
//!
//! The pipeline talks to two model shapes: structured extraction (JSON mode,
//! parsed against a schema) and free-text generation (used verbatim as the
//! response). Both go through this trait so tests can script the model.

use anyhow::Result;
use async_trait::async_trait;

/// Chat-style LLM client
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Free-text generation: system instruction + user content → prose
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Structured generation: same call shape, but the model is constrained
    /// to emit a JSON object/array. Callers still must tolerate unparseable
    /// output — JSON mode reduces but does not eliminate malformed replies.
    async fn chat_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// Strip markdown code fences from a model reply.
///
/// Models wrap JSON in ```json blocks often enough that every structured
/// call site runs its reply through this before parsing.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "text", ...) on the opening fence.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
