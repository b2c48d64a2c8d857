//! Teacher-forced trace recorder
//!
//! A single deterministic pass over a fixed token sequence: for every
//! position, record the distribution the model assigns to the token that
//! actually occurs there, plus its cross-entropy loss. No sampling, no chat
//! accounting.

use crate::display;
use crate::distribution::{full_distribution, top_k_of};
use crate::error::Result;
use crate::session::ModelSession;
use crate::trace::{round4, TokenCandidate, TrainingStep, TrainingTrace};

/// Number of predictions recorded per position, matching what the inference
/// side records by default.
pub const TRAINING_TOP_K: usize = 10;

/// Records one [`TrainingTrace`] per text against a model session.
pub struct TrainingRecorder<'a> {
    session: &'a dyn ModelSession,
}

impl<'a> TrainingRecorder<'a> {
    /// Create a recorder over `session`.
    #[must_use]
    pub fn new(session: &'a dyn ModelSession) -> Self {
        Self { session }
    }

    /// Record the teacher-forced trace for `text`, optionally truncated to
    /// `max_tokens` positions. `source` is carried into the envelope.
    ///
    /// Position 0 has no real predecessor: its predictions are taken from
    /// the model's output *at* position 0 (predicting itself). That matches
    /// the data every existing consumer was built on; see DESIGN.md before
    /// changing it. Every later position `i` uses the output at `i - 1`.
    ///
    /// # Errors
    ///
    /// Returns an error if the model collaborator cannot produce logits for
    /// the sequence; no partial trace is returned.
    pub fn record(
        &self,
        text: &str,
        source: &str,
        max_tokens: Option<usize>,
    ) -> Result<TrainingTrace> {
        let session = self.session;

        let mut token_ids = session.encode(text, true);
        if let Some(limit) = max_tokens {
            token_ids.truncate(limit);
        }
        let tokens = display::display_tokens(session, &token_ids);
        let num_tokens = token_ids.len();

        let all_logits = session
            .logits_for_all(&token_ids)
            .map_err(|e| e.at_step(0))?;

        let mut steps = Vec::with_capacity(num_tokens);
        for step in 0..num_tokens {
            let step_logits = if step > 0 {
                &all_logits[step - 1]
            } else {
                &all_logits[0]
            };

            let (probs, logprobs) = full_distribution(step_logits)?;
            let top_k = top_k_of(&probs, &logprobs, step_logits, TRAINING_TOP_K);
            let predictions = top_k.to_distribution(session).candidates;

            let target_token_id = token_ids[step];
            let target_token = tokens[step].clone();
            // direct lookup: the target need not be among the top-K
            let target_prob = probs[target_token_id as usize];
            let target_logprob = logprobs[target_token_id as usize];

            steps.push(TrainingStep {
                step,
                input_tokens: tokens[..step].to_vec(),
                input_token_ids: token_ids[..step].to_vec(),
                target_token: target_token.clone(),
                target_token_id,
                predictions,
                target_token_prediction: TokenCandidate {
                    token: target_token,
                    token_id: target_token_id,
                    logprob: round4(target_logprob),
                    prob: round4(target_prob),
                },
                target_prob: round4(target_prob),
                target_logprob: round4(target_logprob),
                // single-label cross-entropy in nats
                loss: round4(-target_logprob),
            });
        }

        Ok(TrainingTrace {
            text: text.to_string(),
            source: source.to_string(),
            tokens,
            token_ids,
            num_tokens,
            training_steps: steps,
        })
    }
}
