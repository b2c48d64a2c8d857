//! Base distribution extraction
//!
//! Computes the temperature-1 probability and log-probability distribution
//! over the full vocabulary and extracts the top-K candidates. This is the
//! distribution that goes into every step record; sampling temperature is
//! applied elsewhere ([`crate::sampler`]) and never touches these values.
//!
//! Computation runs in f64; rounding to four decimal digits happens only
//! when candidates are materialized for serialization.

use crate::display;
use crate::error::{Result, TrazarError};
use crate::session::ModelSession;
use crate::trace::{round4, Distribution, TokenCandidate};

/// Full-vocabulary softmax and log-softmax of one logit vector.
///
/// Returns `(probs, logprobs)`, both of vocabulary length, computed with the
/// usual max-shift for numerical stability.
///
/// # Errors
///
/// Returns an error if `logits` is empty.
pub fn full_distribution(logits: &[f32]) -> Result<(Vec<f64>, Vec<f64>)> {
    if logits.is_empty() {
        return Err(TrazarError::InvalidArgument {
            argument: "logits",
            reason: "logits cannot be empty".to_string(),
        });
    }
    let max_logit = logits
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, |acc, x| acc.max(f64::from(x)));
    let exp_sum: f64 = logits
        .iter()
        .map(|&x| (f64::from(x) - max_logit).exp())
        .sum();
    let log_sum = exp_sum.ln();
    let logprobs: Vec<f64> = logits
        .iter()
        .map(|&x| f64::from(x) - max_logit - log_sum)
        .collect();
    let probs: Vec<f64> = logprobs.iter().map(|&lp| lp.exp()).collect();
    Ok((probs, logprobs))
}

/// One entry of a [`TopK`] extraction, at full precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopEntry {
    /// Vocabulary id
    pub token_id: u32,
    /// Raw logit, kept for temperature-scaled sampling
    pub logit: f32,
    /// Base probability (full precision)
    pub prob: f64,
    /// Base log-probability (full precision)
    pub logprob: f64,
}

/// The top-K candidates of one position's base distribution.
///
/// Entries are sorted descending by probability. Ties keep ascending id
/// order (stable sort over an id-ordered input), so extraction is
/// deterministic for a fixed logit vector.
#[derive(Debug, Clone, PartialEq)]
pub struct TopK {
    /// The K that was asked for (before clamping to the vocabulary)
    pub requested: usize,
    /// `min(requested, vocab)` entries, best first
    pub entries: Vec<TopEntry>,
}

impl TopK {
    /// Materialize the serializable [`Distribution`], decoding each id to its
    /// display form and rounding probabilities.
    #[must_use]
    pub fn to_distribution(&self, session: &dyn ModelSession) -> Distribution {
        Distribution {
            top_k: self.requested,
            candidates: self
                .entries
                .iter()
                .map(|entry| TokenCandidate {
                    token: display::display_token(session, entry.token_id),
                    token_id: entry.token_id,
                    logprob: round4(entry.logprob),
                    prob: round4(entry.prob),
                })
                .collect(),
        }
    }
}

/// Extract the top-K candidates from precomputed full-vocabulary
/// probabilities (see [`full_distribution`]).
#[must_use]
pub fn top_k_of(probs: &[f64], logprobs: &[f64], logits: &[f32], k: usize) -> TopK {
    let effective = k.min(logits.len());
    let mut indexed: Vec<usize> = (0..logits.len()).collect();
    indexed.sort_by(|&a, &b| probs[b].partial_cmp(&probs[a]).unwrap_or(std::cmp::Ordering::Equal));
    let entries = indexed
        .into_iter()
        .take(effective)
        .map(|idx| TopEntry {
            token_id: idx as u32,
            logit: logits[idx],
            prob: probs[idx],
            logprob: logprobs[idx],
        })
        .collect();
    TopK {
        requested: k,
        entries,
    }
}

/// Softmax + top-K in one call, for the autoregressive path.
///
/// # Errors
///
/// Returns an error if `logits` is empty or `k` is zero.
pub fn extract_top_k(logits: &[f32], k: usize) -> Result<TopK> {
    if k == 0 {
        return Err(TrazarError::InvalidArgument {
            argument: "top_k",
            reason: "must be positive".to_string(),
        });
    }
    let (probs, logprobs) = full_distribution(logits)?;
    Ok(top_k_of(&probs, &logprobs, logits, k))
}
