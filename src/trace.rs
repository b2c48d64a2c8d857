//! Trace data model
//!
//! Step records and trace envelopes for both decoding modes, with the exact
//! field names the visualization app consumes. An inference trace holds one
//! [`InferenceStep`] per generated token; a training trace holds one
//! [`TrainingStep`] per position of a teacher-forced sequence.
//!
//! All probabilities and log-probabilities in these records are rounded to
//! four decimal digits at construction time; upstream computation runs at
//! full precision (see [`crate::distribution`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Round a value to four decimal digits for serialization.
#[must_use]
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// One candidate token in a probability distribution.
///
/// Invariant: `prob == exp(logprob)` up to the shared rounding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCandidate {
    /// Display form of the token (word-boundary marker re-inserted)
    pub token: String,
    /// Vocabulary id
    pub token_id: u32,
    /// Log-probability under the base (temperature-1) distribution
    pub logprob: f64,
    /// Probability under the base distribution
    pub prob: f64,
}

/// Top-K slice of the base next-token distribution.
///
/// `top_k` echoes the requested K; `candidates` holds the effective
/// `min(K, vocab)` entries, sorted descending by probability, ids unique.
/// This is always the temperature-independent distribution: sampling
/// temperature never changes what is recorded here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    /// Requested number of candidates
    pub top_k: usize,
    /// Candidates in descending probability order
    pub candidates: Vec<TokenCandidate>,
}

/// How the next token was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMethod {
    /// Highest base probability
    Greedy,
    /// Temperature-rescaled draw restricted to the top-K candidates
    Sampling,
}

/// The token actually chosen at a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedToken {
    /// Display form of the token
    pub token: String,
    /// Vocabulary id
    pub token_id: u32,
    /// Selection method used for this step
    pub selection_method: SelectionMethod,
}

/// Auxiliary per-token arrays attached to a step (e.g. embeddings).
///
/// Each named array holds one vector per position of `tokens`, and must stay
/// index-aligned with `tokens`/`token_ids` through filtering.
pub type TokenArrays = BTreeMap<String, Vec<Vec<f32>>>;

/// One autoregressive generation step.
///
/// `tokens`/`token_ids`/`input_text` describe the already-committed context
/// only; the step's own selection is never part of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceStep {
    /// 0-based contiguous step index
    pub step: usize,
    /// Display text of the visible context before this step's selection
    pub input_text: String,
    /// Display tokens for `input_text`
    pub tokens: Vec<String>,
    /// Ids matching `tokens` position by position
    pub token_ids: Vec<u32>,
    /// Base top-K distribution at this position
    pub output_distribution: Distribution,
    /// The token chosen at this step
    pub selected_token: SelectedToken,
    /// Optional per-token auxiliary arrays, parallel to `tokens`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<TokenArrays>,
}

/// One teacher-forced prediction step.
///
/// The step index equals the absolute token position in the sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingStep {
    /// Absolute position in the token sequence
    pub step: usize,
    /// Display tokens of the teacher-forced prefix (empty at position 0)
    pub input_tokens: Vec<String>,
    /// Ids matching `input_tokens`
    pub input_token_ids: Vec<u32>,
    /// Display form of the ground-truth token at this position
    pub target_token: String,
    /// Id of the ground-truth token
    pub target_token_id: u32,
    /// Top-K predictions the model assigns at this position
    pub predictions: Vec<TokenCandidate>,
    /// The ground-truth token with its predicted probability
    pub target_token_prediction: TokenCandidate,
    /// Probability the model assigned to the ground-truth token
    pub target_prob: f64,
    /// Log-probability of the ground-truth token
    pub target_logprob: f64,
    /// Cross-entropy loss in nats (single label: `-target_logprob`)
    pub loss: f64,
}

/// Model metadata attached to trace envelopes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model name or path
    pub name: String,
    /// Architecture family, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    /// Number of transformer layers
    pub num_layers: usize,
    /// Hidden dimension
    pub hidden_size: usize,
    /// Number of attention heads
    pub num_attention_heads: usize,
    /// Vocabulary size
    pub vocab_size: usize,
    /// Total parameter count, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_parameters: Option<u64>,
}

/// A complete autoregressive trace: the engine's product for one prompt.
///
/// Immutable once emitted; the post-trace filter produces a new trace
/// rather than editing this one in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceTrace {
    /// The raw user prompt
    pub prompt: String,
    /// Chat-formatted prompt, present when a chat template was applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_prompt: Option<String>,
    /// One record per generated token
    pub generation_steps: Vec<InferenceStep>,
    /// Loop bound that was requested
    pub max_new_tokens: usize,
    /// Requested number of distribution candidates
    pub top_k: usize,
    /// Sampling temperature; absent or non-positive means greedy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// A complete teacher-forced trace for one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingTrace {
    /// The input text
    pub text: String,
    /// Where the text came from (corpus name, url, ...)
    pub source: String,
    /// Display tokens of the (possibly truncated) sequence
    pub tokens: Vec<String>,
    /// Ids matching `tokens`
    pub token_ids: Vec<u32>,
    /// Number of positions processed
    pub num_tokens: usize,
    /// One record per position
    pub training_steps: Vec<TrainingStep>,
}
