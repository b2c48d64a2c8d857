//! Autoregressive trace recorder
//!
//! Drives the per-step pipeline across the generation loop: obtain logits
//! for the current context, extract the base top-K distribution, select the
//! next token (greedy or temperature-sampled), record the step, then commit
//! the selection to the display stream and the model context. Generation
//! stops at `max_new_tokens`, or immediately after recording a step whose
//! selection is the end-of-sequence token.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::boundary::resolve_user_boundary;
use crate::display::{display_token, DisplayStream};
use crate::distribution::extract_top_k;
use crate::error::{Result, TrazarError};
use crate::sampler;
use crate::session::{ChatMessage, ModelSession};
use crate::trace::{InferenceStep, InferenceTrace, SelectedToken};

/// Options for recording an inference trace.
#[derive(Debug, Clone)]
pub struct InferenceOptions {
    /// Maximum number of new tokens to record
    pub max_new_tokens: usize,
    /// Number of distribution candidates to record per step
    pub top_k: usize,
    /// Sampling temperature; `None` or non-positive means greedy
    pub temperature: Option<f32>,
    /// Whether to run the prompt through the chat template when one exists
    pub apply_chat_template: bool,
    /// Seed for temperature sampling. `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 10,
            top_k: 10,
            temperature: None,
            apply_chat_template: true,
            seed: None,
        }
    }
}

impl InferenceOptions {
    fn validate(&self) -> Result<()> {
        if self.max_new_tokens == 0 {
            return Err(TrazarError::InvalidArgument {
                argument: "max_new_tokens",
                reason: "must be positive".to_string(),
            });
        }
        if self.top_k == 0 {
            return Err(TrazarError::InvalidArgument {
                argument: "top_k",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Records one [`InferenceTrace`] per prompt against a model session.
pub struct InferenceRecorder<'a> {
    session: &'a dyn ModelSession,
}

impl<'a> InferenceRecorder<'a> {
    /// Create a recorder over `session`.
    #[must_use]
    pub fn new(session: &'a dyn ModelSession) -> Self {
        Self { session }
    }

    /// Record the full trace for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid options, or a
    /// [`TrazarError::Generation`] carrying the step index if the model
    /// collaborator fails mid-loop; no partial trace is returned.
    pub fn record(&self, prompt: &str, options: &InferenceOptions) -> Result<InferenceTrace> {
        options.validate()?;
        let session = self.session;

        let chat = options.apply_chat_template && session.has_chat_template();
        let (mut stream, formatted_prompt) = if chat {
            let messages = [ChatMessage::user(prompt)];
            let formatted = session.render_chat(&messages, true);
            let boundary = resolve_user_boundary(session, &messages, prompt);
            if !boundary.is_confident() {
                tracing::debug!(?boundary, "user-turn detection fell back");
            }
            // the formatted text already carries its special tokens
            let prompt_ids = session.encode(&formatted, false);
            (
                DisplayStream::chat(prompt_ids, boundary.token_offset()),
                Some(formatted),
            )
        } else {
            let prompt_ids = session.encode(prompt, true);
            (DisplayStream::plain(prompt_ids), None)
        };

        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let eos = session.eos_id();
        let mut steps = Vec::new();

        for step in 0..options.max_new_tokens {
            let logits = session
                .logits_for(&stream.context_ids())
                .map_err(|e| e.at_step(step))?;
            let top_k = extract_top_k(&logits, options.top_k).map_err(|e| e.at_step(step))?;

            let (rank, method) = sampler::select(&top_k, options.temperature, rng.gen::<f64>());
            let selected_id = top_k.entries[rank].token_id;
            let selected = SelectedToken {
                token: display_token(session, selected_id),
                token_id: selected_id,
                selection_method: method,
            };

            let (tokens, token_ids, input_text) = stream.view(session);
            steps.push(InferenceStep {
                step,
                input_text,
                tokens,
                token_ids,
                output_distribution: top_k.to_distribution(session),
                selected_token: selected.clone(),
                embeddings: None,
            });

            stream.push(selected.token, selected_id);

            if selected_id == eos {
                tracing::info!(step, "eos token reached");
                break;
            }
        }

        Ok(InferenceTrace {
            prompt: prompt.to_string(),
            formatted_prompt,
            generation_steps: steps,
            max_new_tokens: options.max_new_tokens,
            top_k: options.top_k,
            temperature: options.temperature,
        })
    }
}
