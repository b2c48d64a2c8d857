//! Next-token selection over an extracted top-K
//!
//! Greedy selection takes rank 0 of the base distribution. Temperature
//! sampling re-softmaxes the K raw logits divided by τ and draws from that
//! restricted categorical. The already-extracted base distribution is never
//! rescaled or renormalized; the two distributions are kept strictly apart
//! so traces recorded at different temperatures stay comparable.
//!
//! The draw is driven by a caller-supplied uniform value in `[0, 1)`, which
//! keeps this module free of RNG state: the recorder owns the generator.

use crate::distribution::TopK;
use crate::trace::SelectionMethod;

/// Select a candidate rank from `top_k`.
///
/// `temperature` absent or non-positive means greedy; otherwise a
/// temperature-scaled draw restricted to the top-K support. `rng_value`
/// must be uniform in `[0, 1)` and is ignored for greedy selection.
///
/// Returns `(rank, method)` where `rank` indexes `top_k.entries`.
///
/// # Panics
///
/// Panics if `top_k` has no entries; extraction never produces that.
#[must_use]
pub fn select(top_k: &TopK, temperature: Option<f32>, rng_value: f64) -> (usize, SelectionMethod) {
    assert!(!top_k.entries.is_empty(), "top-k extraction yields >= 1 entry");
    match temperature {
        Some(tau) if tau > 0.0 => (sample_scaled(top_k, tau, rng_value), SelectionMethod::Sampling),
        _ => (0, SelectionMethod::Greedy),
    }
}

/// Softmax the K raw logits at temperature `tau` and draw by inverse CDF.
fn sample_scaled(top_k: &TopK, tau: f32, rng_value: f64) -> usize {
    let tau = f64::from(tau);
    let scaled: Vec<f64> = top_k
        .entries
        .iter()
        .map(|entry| f64::from(entry.logit) / tau)
        .collect();
    let max = scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp_sum: f64 = scaled.iter().map(|&x| (x - max).exp()).sum();

    let mut cumulative = 0.0;
    for (rank, &x) in scaled.iter().enumerate() {
        cumulative += (x - max).exp() / exp_sum;
        if rng_value < cumulative {
            return rank;
        }
    }
    // rng_value == ~1.0 with accumulated rounding: last entry
    top_k.entries.len() - 1
}
