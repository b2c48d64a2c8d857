//! API request/response types
//!
//! Wire structures for the trace service. Trace-shaped responses reuse the
//! envelopes from [`crate::trace`] directly so the serialized field names
//! cannot drift from what the engine records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Service banner returned from `GET /`
#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    /// Service description
    pub message: String,
    /// Name of the loaded model, when one is loaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Endpoint map: name to path
    pub endpoints: BTreeMap<String, String>,
}

/// Tokenize request
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenizeRequest {
    /// Text to run through the tokenizer
    pub prompt: String,
    /// Whether to apply the chat template when one exists
    #[serde(default = "default_true")]
    pub apply_chat_template: bool,
}

/// Tokenize response
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenizeResponse {
    /// The raw prompt
    pub prompt: String,
    /// Prompt after chat formatting (equals `prompt` when none applied)
    pub formatted_text: String,
    /// Display tokens
    pub tokens: Vec<String>,
    /// Number of tokens
    pub num_tokens: usize,
}

/// Token-ids response: tokenize plus the id sequence
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenIdsResponse {
    /// The raw prompt
    pub prompt: String,
    /// Prompt after chat formatting (equals `prompt` when none applied)
    pub formatted_text: String,
    /// Display tokens
    pub tokens: Vec<String>,
    /// Ids matching `tokens`
    pub token_ids: Vec<u32>,
    /// Number of tokens
    pub num_tokens: usize,
}

/// Generate request: record an inference trace
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// The prompt to trace
    pub prompt: String,
    /// Maximum number of new tokens
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,
    /// Distribution candidates per step
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Sampling temperature; absent or non-positive means greedy
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Whether to apply the chat template when one exists
    #[serde(default = "default_true")]
    pub apply_chat_template: bool,
    /// Optional sampling seed for reproducible traces
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Training request: record a teacher-forced trace
#[derive(Debug, Serialize, Deserialize)]
pub struct TrainingRequest {
    /// The text to process
    pub text: String,
    /// Where the text came from
    pub source: String,
    /// Optional truncation length
    #[serde(default)]
    pub max_tokens: Option<usize>,
}

/// Load-model request
#[derive(Debug, Serialize, Deserialize)]
pub struct LoadModelRequest {
    /// Identifier understood by the configured session loader
    pub model_id: String,
}

/// Load-model response
#[derive(Debug, Serialize, Deserialize)]
pub struct LoadModelResponse {
    /// "success" on completion
    pub status: String,
    /// Name of the now-loaded model
    pub model: String,
    /// Human-readable summary
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
}

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_max_new_tokens() -> usize {
    10
}

pub(crate) fn default_top_k() -> usize {
    10
}
