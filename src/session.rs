//! Model session: the model/tokenizer collaborator behind the trace engine
//!
//! The engine never runs a model itself. Everything it needs from the hosted
//! model and tokenizer goes through [`ModelSession`], passed by reference into
//! the recorders. Replacing a model means building a new session object and
//! swapping the handle that owns it; nothing mutates a live session, so an
//! in-flight trace keeps the session it started with.
//!
//! [`MockSession`] is a small deterministic session over a toy vocabulary,
//! used by the test suites and the server's demo mode.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrazarError};
use crate::trace::ModelInfo;

/// Chat message structure
///
/// Represents a single message in a conversation with role and content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// Role: "system", "user", "assistant"
    pub role: String,
    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// Create a new chat message
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

/// The loaded model/tokenizer pair, as the trace engine sees it.
///
/// `logits_for` is the only potentially long-running call; it is treated as
/// opaque and blocking. Tokenizer operations are total: a session must map
/// unknown input to *something* rather than fail, because the engine's
/// fallback chains (boundary detection, display decoding) depend on it.
pub trait ModelSession: Send + Sync {
    /// Next-token logits for the final position of `context_ids`.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot produce logits (not loaded,
    /// backend failure). The recorders wrap this with the failing step index.
    fn logits_for(&self, context_ids: &[u32]) -> Result<Vec<f32>>;

    /// Logits for every position of `context_ids` in one pass, for
    /// teacher-forced prediction. The default implementation calls
    /// [`ModelSession::logits_for`] once per prefix; sessions backed by a
    /// real model should override with a single forward pass.
    ///
    /// # Errors
    ///
    /// Returns an error if any position's logits cannot be produced.
    fn logits_for_all(&self, context_ids: &[u32]) -> Result<Vec<Vec<f32>>> {
        (1..=context_ids.len())
            .map(|end| self.logits_for(&context_ids[..end]))
            .collect()
    }

    /// Tokenize `text`. When `add_special_tokens` is false the encoding must
    /// not prepend sequence markers (used for prefix token counting and for
    /// chat-formatted text that already carries its special tokens).
    fn encode(&self, text: &str, add_special_tokens: bool) -> Vec<u32>;

    /// Decode ids to text, retaining special tokens.
    fn decode(&self, ids: &[u32]) -> String;

    /// The raw sub-token string for an id (word-boundary markers intact).
    fn raw_subtoken(&self, id: u32) -> String;

    /// Render a conversation through the model's chat template.
    fn render_chat(&self, messages: &[ChatMessage], add_generation_prompt: bool) -> String;

    /// Whether the tokenizer carries a chat template.
    fn has_chat_template(&self) -> bool;

    /// End-of-sequence token id.
    fn eos_id(&self) -> u32;

    /// Vocabulary size.
    fn vocab_size(&self) -> usize;

    /// Metadata for trace envelopes.
    fn model_info(&self) -> ModelInfo;
}

/// Builds sessions from model identifiers.
///
/// The service's load/replace path goes through this: loading a model
/// produces a *new* session that replaces the shared handle wholesale.
/// In-flight traces keep the session they started with.
pub trait SessionLoader: Send + Sync {
    /// Build a session for `model_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier cannot be resolved or the model
    /// fails to load.
    fn load(&self, model_id: &str) -> Result<Arc<dyn ModelSession>>;
}

/// Deterministic in-memory session over a toy vocabulary.
///
/// Logits are a fixed function of the context length: every id gets a
/// strictly decreasing base logit, and an optional script makes a chosen
/// token the clear argmax at each position. That keeps greedy decoding,
/// teacher forcing, and boundary accounting fully predictable in tests.
#[derive(Debug, Clone)]
pub struct MockSession {
    vocab: Vec<String>,
    eos: u32,
    chat_template: bool,
    system_prompt: Option<String>,
    script: Vec<u32>,
    name: String,
}

impl MockSession {
    /// Create a session over `vocab` (raw sub-token strings, `Ġ`-prefixed
    /// entries decode with a leading space). `eos` must index into `vocab`.
    #[must_use]
    pub fn new(vocab: Vec<String>, eos: u32) -> Self {
        Self {
            vocab,
            eos,
            chat_template: false,
            system_prompt: None,
            script: Vec::new(),
            name: "mock".to_string(),
        }
    }

    /// Enable a ChatML-style chat template.
    #[must_use]
    pub fn with_chat_template(mut self) -> Self {
        self.chat_template = true;
        self
    }

    /// Prepend a system turn to every chat rendering.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Script the argmax token per context length: at a context of length
    /// `n`, `script[n % script.len()]` wins the distribution.
    #[must_use]
    pub fn with_script(mut self, script: Vec<u32>) -> Self {
        self.script = script;
        self
    }

    /// Override the reported model name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Demo session: ChatML template, a small word vocabulary, and a short
    /// scripted answer. Mirrors what the server's demo mode loads.
    #[must_use]
    pub fn demo() -> Self {
        let vocab = demo_vocab();
        // "Ġfour" then eos
        let four = vocab
            .iter()
            .position(|t| t == "Ġfour")
            .unwrap_or(0) as u32;
        let eos = vocab
            .iter()
            .position(|t| t == "<|im_end|>")
            .unwrap_or(0) as u32;
        Self::new(vocab, eos)
            .with_chat_template()
            .with_script(vec![four, eos])
            .with_name("trazar-demo")
    }

    /// Decoded surface form of a sub-token.
    fn surface(&self, id: u32) -> String {
        match self.vocab.get(id as usize) {
            Some(raw) => match raw.strip_prefix('Ġ') {
                Some(rest) => format!(" {rest}"),
                None => raw.clone(),
            },
            None => String::new(),
        }
    }
}

/// Vocabulary for [`MockSession::demo`].
fn demo_vocab() -> Vec<String> {
    let mut vocab: Vec<String> = [
        "<unk>",
        "<|im_start|>",
        "<|im_end|>",
        "\n",
        "user",
        "assistant",
        "system",
    ]
    .iter()
    .map(ToString::to_string)
    .collect();
    for word in [
        "two", "plus", "is", "four", "what", "the", "answer", "helpful",
    ] {
        vocab.push(format!("Ġ{word}"));
        vocab.push((*word).to_string());
    }
    for ch in ["2", "+", "=", "4", "?", " "] {
        vocab.push((*ch).to_string());
    }
    vocab
}

impl ModelSession for MockSession {
    fn logits_for(&self, context_ids: &[u32]) -> Result<Vec<f32>> {
        if context_ids.is_empty() {
            return Err(TrazarError::Model("empty context".to_string()));
        }
        // Strictly decreasing base keeps the ordering total and deterministic.
        let mut logits: Vec<f32> = (0..self.vocab.len())
            .map(|v| -(v as f32) * 0.25)
            .collect();
        if !self.script.is_empty() {
            let want = self.script[context_ids.len() % self.script.len()] as usize;
            if want < logits.len() {
                logits[want] = 8.0;
            }
        }
        Ok(logits)
    }

    fn encode(&self, text: &str, add_special_tokens: bool) -> Vec<u32> {
        let _ = add_special_tokens; // the toy vocabulary has no BOS marker
        let mut ids = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            // Greedy longest match over decoded surfaces; unknown input is
            // skipped one character at a time rather than failing.
            let mut best: Option<(usize, u32)> = None;
            for (id, _) in self.vocab.iter().enumerate() {
                let surface = self.surface(id as u32);
                if !surface.is_empty() && rest.starts_with(&surface) {
                    let len = surface.len();
                    if best.map_or(true, |(best_len, _)| len > best_len) {
                        best = Some((len, id as u32));
                    }
                }
            }
            match best {
                Some((len, id)) => {
                    ids.push(id);
                    rest = &rest[len..];
                }
                None => {
                    let mut chars = rest.chars();
                    chars.next();
                    rest = chars.as_str();
                }
            }
        }
        ids
    }

    fn decode(&self, ids: &[u32]) -> String {
        ids.iter().map(|&id| self.surface(id)).collect()
    }

    fn raw_subtoken(&self, id: u32) -> String {
        self.vocab
            .get(id as usize)
            .cloned()
            .unwrap_or_else(|| "<unk>".to_string())
    }

    fn render_chat(&self, messages: &[ChatMessage], add_generation_prompt: bool) -> String {
        let mut out = String::new();
        if let Some(ref system) = self.system_prompt {
            out.push_str(&format!("<|im_start|>system\n{system}<|im_end|>\n"));
        }
        for message in messages {
            out.push_str(&format!(
                "<|im_start|>{}\n{}<|im_end|>\n",
                message.role, message.content
            ));
        }
        if add_generation_prompt {
            out.push_str("<|im_start|>assistant\n");
        }
        out
    }

    fn has_chat_template(&self) -> bool {
        self.chat_template
    }

    fn eos_id(&self) -> u32 {
        self.eos
    }

    fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: self.name.clone(),
            architecture: Some("mock".to_string()),
            num_layers: 2,
            hidden_size: 32,
            num_attention_heads: 2,
            vocab_size: self.vocab.len(),
            total_parameters: Some(4_096),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_session() -> MockSession {
        MockSession::new(
            vec![
                "<eos>".to_string(),
                "A".to_string(),
                "B".to_string(),
                "ĠB".to_string(),
            ],
            0,
        )
    }

    #[test]
    fn encode_prefers_longest_match() {
        let session = word_session();
        // " B" must hit the Ġ entry, not skip the space and take "B"
        assert_eq!(session.encode("A B", true), vec![1, 3]);
    }

    #[test]
    fn encode_skips_unknown_characters() {
        let session = word_session();
        assert_eq!(session.encode("A#B", true), vec![1, 2]);
    }

    #[test]
    fn decode_restores_word_boundaries() {
        let session = word_session();
        assert_eq!(session.decode(&[1, 3]), "A B");
    }

    #[test]
    fn logits_are_deterministic_and_scripted() {
        let session = word_session().with_script(vec![2]);
        let a = session.logits_for(&[1]).expect("logits");
        let b = session.logits_for(&[1]).expect("logits");
        assert_eq!(a, b);
        let argmax = a
            .iter()
            .enumerate()
            .max_by(|x, y| x.1.partial_cmp(y.1).expect("finite"))
            .map(|(i, _)| i)
            .expect("non-empty");
        assert_eq!(argmax, 2);
    }

    #[test]
    fn logits_for_empty_context_is_an_error() {
        let session = word_session();
        assert!(session.logits_for(&[]).is_err());
    }

    #[test]
    fn logits_for_all_matches_per_prefix_calls() {
        let session = word_session().with_script(vec![1, 2]);
        let ids = [1, 2, 3];
        let all = session.logits_for_all(&ids).expect("logits");
        assert_eq!(all.len(), 3);
        for (i, row) in all.iter().enumerate() {
            let single = session.logits_for(&ids[..=i]).expect("logits");
            assert_eq!(row, &single);
        }
    }

    #[test]
    fn chat_rendering_includes_system_turn_and_marker() {
        let session = word_session()
            .with_chat_template()
            .with_system_prompt("be terse");
        let rendered = session.render_chat(&[ChatMessage::user("hi")], false);
        assert!(rendered.starts_with("<|im_start|>system"));
        assert!(rendered.contains("<|im_start|>user"));
        assert!(!rendered.contains("assistant"));
        let with_prompt = session.render_chat(&[ChatMessage::user("hi")], true);
        assert!(with_prompt.ends_with("<|im_start|>assistant\n"));
    }

    #[test]
    fn demo_session_round_trips_its_prompt() {
        let session = MockSession::demo();
        let ids = session.encode("2+2=", true);
        assert!(!ids.is_empty());
        assert_eq!(session.decode(&ids), "2+2=");
    }
}
