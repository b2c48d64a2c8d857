//! Display tokens and the per-step display stream
//!
//! A sub-token whose raw form carries the `Ġ` word-boundary marker decodes
//! to text with a leading space; for display that boundary is re-inserted as
//! a visible `Ġ` over the decoded text, so tokens read the way the model
//! splits words. The same rule applies everywhere a token is shown: prompt
//! tokens, generated tokens, and distribution candidates.
//!
//! [`DisplayStream`] keeps the (tokens, token_ids, input_text) view for each
//! step: the context already committed *before* the step's own selection.

use crate::session::ModelSession;

/// Display form of one token id.
///
/// Raw `Ġ`-prefixed sub-tokens use the decoded text with the marker
/// re-inserted; if the decoded text lost its leading space (or decoding
/// produced nothing), the raw sub-token is used as-is. Everything else uses
/// the plain decoded text.
#[must_use]
pub fn display_token(session: &dyn ModelSession, token_id: u32) -> String {
    let decoded = session.decode(&[token_id]);
    let raw = session.raw_subtoken(token_id);
    if raw.starts_with('Ġ') {
        match decoded.strip_prefix(' ') {
            Some(rest) => format!("Ġ{rest}"),
            None => raw,
        }
    } else if decoded.is_empty() {
        raw
    } else {
        decoded
    }
}

/// Display forms for a sequence of ids.
#[must_use]
pub fn display_tokens(session: &dyn ModelSession, ids: &[u32]) -> Vec<String> {
    ids.iter().map(|&id| display_token(session, id)).collect()
}

/// The externally visible token stream for a trace in progress.
///
/// Non-chat mode shows the full accumulated id sequence. Chat mode shows the
/// chat-formatted prompt sliced from the user-turn boundary onward (system
/// tokens dropped, turn markers kept) followed by the tokens generated so
/// far. Selections are appended only *after* their step is recorded.
#[derive(Debug, Clone)]
pub struct DisplayStream {
    prompt_ids: Vec<u32>,
    /// Token offset into `prompt_ids` where the visible prompt begins
    visible_from: usize,
    generated_ids: Vec<u32>,
    generated_tokens: Vec<String>,
}

impl DisplayStream {
    /// Non-chat stream: everything in `prompt_ids` is visible.
    #[must_use]
    pub fn plain(prompt_ids: Vec<u32>) -> Self {
        Self {
            prompt_ids,
            visible_from: 0,
            generated_ids: Vec::new(),
            generated_tokens: Vec::new(),
        }
    }

    /// Chat stream: `prompt_ids` is the fully formatted prompt, visible from
    /// the resolved user-turn `boundary` (clamped to the prompt length).
    #[must_use]
    pub fn chat(prompt_ids: Vec<u32>, boundary: usize) -> Self {
        let visible_from = boundary.min(prompt_ids.len());
        Self {
            prompt_ids,
            visible_from,
            generated_ids: Vec::new(),
            generated_tokens: Vec::new(),
        }
    }

    /// The model context: full prompt plus every selection so far.
    #[must_use]
    pub fn context_ids(&self) -> Vec<u32> {
        let mut ids = self.prompt_ids.clone();
        ids.extend_from_slice(&self.generated_ids);
        ids
    }

    /// The visible (tokens, token_ids, input_text) triple for the current
    /// step. `input_text` is decoded with special tokens retained so turn
    /// markers stay visible.
    #[must_use]
    pub fn view(&self, session: &dyn ModelSession) -> (Vec<String>, Vec<u32>, String) {
        let visible_prompt = &self.prompt_ids[self.visible_from..];
        let mut ids: Vec<u32> = visible_prompt.to_vec();
        ids.extend_from_slice(&self.generated_ids);

        let mut tokens = display_tokens(session, visible_prompt);
        tokens.extend(self.generated_tokens.iter().cloned());

        let text = session.decode(&ids);
        (tokens, ids, text)
    }

    /// Commit a recorded step's selection to the stream.
    pub fn push(&mut self, token: String, token_id: u32) {
        self.generated_tokens.push(token);
        self.generated_ids.push(token_id);
    }

    /// Number of tokens generated so far.
    #[must_use]
    pub fn generated_len(&self) -> usize {
        self.generated_ids.len()
    }
}
