//! Property tests for distribution extraction, selection, and filtering

use proptest::prelude::*;

use trazar::distribution::extract_top_k;
use trazar::filter::{filter_steps, is_line_break_token};
use trazar::sampler::select;
use trazar::trace::{round4, Distribution, InferenceStep, SelectedToken, SelectionMethod};

fn logits_strategy() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-20.0f32..20.0, 1..64)
}

proptest! {
    #[test]
    fn candidates_sorted_descending(logits in logits_strategy(), k in 1usize..20) {
        let top = extract_top_k(&logits, k).expect("top-k");
        prop_assert_eq!(top.entries.len(), k.min(logits.len()));
        for pair in top.entries.windows(2) {
            prop_assert!(pair[0].prob >= pair[1].prob);
        }
    }

    #[test]
    fn candidate_ids_unique(logits in logits_strategy(), k in 1usize..20) {
        let top = extract_top_k(&logits, k).expect("top-k");
        let mut ids: Vec<u32> = top.entries.iter().map(|e| e.token_id).collect();
        ids.sort_unstable();
        let len_before = ids.len();
        ids.dedup();
        prop_assert_eq!(ids.len(), len_before);
    }

    #[test]
    fn prob_is_exp_of_logprob(logits in logits_strategy(), k in 1usize..20) {
        let top = extract_top_k(&logits, k).expect("top-k");
        for entry in &top.entries {
            prop_assert!((entry.prob - entry.logprob.exp()).abs() < 1e-9);
            // and it survives 4-digit rounding within tolerance
            prop_assert!((round4(entry.prob) - round4(entry.logprob.exp())).abs() < 1e-9);
        }
    }

    #[test]
    fn probability_mass_at_most_one(logits in logits_strategy(), k in 1usize..20) {
        let top = extract_top_k(&logits, k).expect("top-k");
        let sum: f64 = top.entries.iter().map(|e| e.prob).sum();
        prop_assert!(sum <= 1.0 + 1e-9);
    }

    #[test]
    fn extraction_deterministic(logits in logits_strategy(), k in 1usize..20) {
        let a = extract_top_k(&logits, k).expect("top-k");
        let b = extract_top_k(&logits, k).expect("top-k");
        prop_assert_eq!(a, b);
    }

    #[test]
    fn greedy_always_rank_zero(logits in logits_strategy(), rng_value in 0.0f64..1.0) {
        let top = extract_top_k(&logits, 5).expect("top-k");
        let (rank, method) = select(&top, None, rng_value);
        prop_assert_eq!(rank, 0);
        prop_assert_eq!(method, SelectionMethod::Greedy);
        // non-positive temperatures behave the same
        let (rank, _) = select(&top, Some(0.0), rng_value);
        prop_assert_eq!(rank, 0);
    }

    #[test]
    fn sampling_stays_in_support(
        logits in logits_strategy(),
        tau in 0.01f32..5.0,
        rng_value in 0.0f64..1.0,
    ) {
        let top = extract_top_k(&logits, 5).expect("top-k");
        let (rank, method) = select(&top, Some(tau), rng_value);
        prop_assert!(rank < top.entries.len());
        prop_assert_eq!(method, SelectionMethod::Sampling);
    }
}

// ---------------------------------------------------------------------------
// Filter properties over generated step sequences
// ---------------------------------------------------------------------------

fn token_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => "[a-z]{1,4}",
        1 => Just("\n".to_string()),
        1 => Just("\r\n".to_string()),
        1 => Just("Ġword".to_string()),
    ]
}

fn step_strategy() -> impl Strategy<Value = InferenceStep> {
    (
        prop::collection::vec(token_strategy(), 0..8),
        token_strategy(),
    )
        .prop_map(|(tokens, selected)| InferenceStep {
            step: 0,
            input_text: tokens.concat(),
            token_ids: (0..tokens.len() as u32).collect(),
            tokens,
            output_distribution: Distribution {
                top_k: 5,
                candidates: vec![],
            },
            selected_token: SelectedToken {
                token: selected,
                token_id: 0,
                selection_method: SelectionMethod::Greedy,
            },
            embeddings: None,
        })
}

proptest! {
    #[test]
    fn filter_is_idempotent(steps in prop::collection::vec(step_strategy(), 0..10)) {
        let once = filter_steps(&steps, is_line_break_token);
        let twice = filter_steps(&once, is_line_break_token);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn filter_keeps_arrays_aligned_and_renumbers(
        steps in prop::collection::vec(step_strategy(), 0..10),
    ) {
        let filtered = filter_steps(&steps, is_line_break_token);
        for (index, step) in filtered.iter().enumerate() {
            prop_assert_eq!(step.step, index);
            prop_assert_eq!(step.tokens.len(), step.token_ids.len());
            prop_assert!(!is_line_break_token(&step.selected_token.token));
            for token in &step.tokens {
                prop_assert!(!is_line_break_token(token));
            }
            prop_assert!(!step.input_text.contains('\n'));
            prop_assert!(!step.input_text.contains('\r'));
        }
    }

    #[test]
    fn filter_matching_everything_empties_the_trace(
        steps in prop::collection::vec(step_strategy(), 0..10),
    ) {
        let filtered = filter_steps(&steps, |_| true);
        prop_assert!(filtered.is_empty());
    }
}
