//! Post-trace token filter
//!
//! Removes unwanted tokens from a completed inference trace — by default,
//! anything containing a line break — so the visualization never has to lay
//! out tokens that render as whitespace structure.
//!
//! A pure pass over the trace: steps whose *selected* token matches the
//! predicate are dropped whole; within surviving steps, matching positions
//! are removed from `tokens`, `token_ids`, and every auxiliary per-token
//! array through one shared keep-list, so the parallel arrays stay aligned.
//! Line-break characters are stripped from `input_text` independently of the
//! token-level pass, and surviving steps are renumbered from 0.

use crate::trace::{InferenceStep, InferenceTrace};

/// Default exclusion: any token containing a line-break character.
#[must_use]
pub fn is_line_break_token(token: &str) -> bool {
    token.contains('\n') || token.contains('\r')
}

/// Remove line-break characters from display text.
#[must_use]
pub fn strip_line_breaks(text: &str) -> String {
    text.chars().filter(|&c| c != '\n' && c != '\r').collect()
}

/// Filter one step, or drop it entirely.
fn filter_step<F>(step: &InferenceStep, exclude: &F) -> Option<InferenceStep>
where
    F: Fn(&str) -> bool,
{
    if exclude(&step.selected_token.token) {
        return None;
    }

    let keep: Vec<usize> = step
        .tokens
        .iter()
        .enumerate()
        .filter(|(_, token)| !exclude(token))
        .map(|(i, _)| i)
        .collect();

    let tokens = keep.iter().map(|&i| step.tokens[i].clone()).collect();
    let token_ids = keep
        .iter()
        .filter_map(|&i| step.token_ids.get(i).copied())
        .collect();
    let embeddings = step.embeddings.as_ref().map(|arrays| {
        arrays
            .iter()
            .map(|(name, array)| {
                let filtered = keep
                    .iter()
                    .filter_map(|&i| array.get(i).cloned())
                    .collect();
                (name.clone(), filtered)
            })
            .collect()
    });

    Some(InferenceStep {
        step: step.step,
        input_text: strip_line_breaks(&step.input_text),
        tokens,
        token_ids,
        output_distribution: step.output_distribution.clone(),
        selected_token: step.selected_token.clone(),
        embeddings,
    })
}

/// Filter a step sequence with `exclude`, renumbering survivors from 0.
pub fn filter_steps<F>(steps: &[InferenceStep], exclude: F) -> Vec<InferenceStep>
where
    F: Fn(&str) -> bool,
{
    let mut surviving: Vec<InferenceStep> = steps
        .iter()
        .filter_map(|step| filter_step(step, &exclude))
        .collect();
    for (index, step) in surviving.iter_mut().enumerate() {
        step.step = index;
    }
    surviving
}

/// Produce a new trace with `exclude` applied to every step.
pub fn filter_trace<F>(trace: &InferenceTrace, exclude: F) -> InferenceTrace
where
    F: Fn(&str) -> bool,
{
    InferenceTrace {
        generation_steps: filter_steps(&trace.generation_steps, exclude),
        ..trace.clone()
    }
}

/// [`filter_trace`] with the default line-break predicate.
#[must_use]
pub fn filter_trace_default(trace: &InferenceTrace) -> InferenceTrace {
    filter_trace(trace, is_line_break_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{
        Distribution, SelectedToken, SelectionMethod, TokenArrays, TokenCandidate,
    };

    fn step(index: usize, tokens: &[&str], selected: &str) -> InferenceStep {
        InferenceStep {
            step: index,
            input_text: tokens.join(""),
            tokens: tokens.iter().map(ToString::to_string).collect(),
            token_ids: (0..tokens.len() as u32).collect(),
            output_distribution: Distribution {
                top_k: 5,
                candidates: vec![TokenCandidate {
                    token: selected.to_string(),
                    token_id: 99,
                    logprob: -0.1,
                    prob: 0.9048,
                }],
            },
            selected_token: SelectedToken {
                token: selected.to_string(),
                token_id: 99,
                selection_method: SelectionMethod::Greedy,
            },
            embeddings: None,
        }
    }

    #[test]
    fn line_break_predicate_matches_all_newline_forms() {
        assert!(is_line_break_token("\n"));
        assert!(is_line_break_token("\r\n"));
        assert!(is_line_break_token("Ġ\n"));
        assert!(!is_line_break_token("Ġworld"));
    }

    #[test]
    fn step_with_line_break_selection_is_dropped() {
        let steps = vec![step(0, &["a"], "\n"), step(1, &["a", "b"], "c")];
        let filtered = filter_steps(&steps, is_line_break_token);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].selected_token.token, "c");
    }

    #[test]
    fn surviving_steps_are_renumbered_contiguously() {
        let steps = vec![
            step(0, &["a"], "\n"),
            step(1, &["a"], "x"),
            step(2, &["a"], "\r\n"),
            step(3, &["a"], "y"),
        ];
        let filtered = filter_steps(&steps, is_line_break_token);
        let indices: Vec<usize> = filtered.iter().map(|s| s.step).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn token_positions_filter_through_one_keep_list() {
        let mut s = step(0, &["a", "\n", "b"], "c");
        let mut arrays = TokenArrays::new();
        arrays.insert(
            "input".to_string(),
            vec![vec![0.1], vec![0.2], vec![0.3]],
        );
        s.embeddings = Some(arrays);

        let filtered = filter_steps(&[s], is_line_break_token);
        let out = &filtered[0];
        assert_eq!(out.tokens, vec!["a", "b"]);
        assert_eq!(out.token_ids, vec![0, 2]);
        let embedded = out.embeddings.as_ref().expect("embeddings kept");
        assert_eq!(embedded["input"], vec![vec![0.1], vec![0.3]]);
        assert_eq!(out.tokens.len(), out.token_ids.len());
    }

    #[test]
    fn short_auxiliary_arrays_do_not_panic() {
        let mut s = step(0, &["a", "\n", "b"], "c");
        let mut arrays = TokenArrays::new();
        // one entry short of the token count
        arrays.insert("partial".to_string(), vec![vec![1.0], vec![2.0]]);
        s.embeddings = Some(arrays);

        let filtered = filter_steps(&[s], is_line_break_token);
        let embedded = filtered[0].embeddings.as_ref().expect("embeddings kept");
        // keep-list indices past the array end are skipped
        assert_eq!(embedded["partial"], vec![vec![1.0]]);
    }

    #[test]
    fn input_text_is_stripped_character_level() {
        let mut s = step(0, &["ab"], "c");
        s.input_text = "a\r\nb\n".to_string();
        let filtered = filter_steps(&[s], is_line_break_token);
        assert_eq!(filtered[0].input_text, "ab");
    }

    #[test]
    fn predicate_matching_everything_yields_empty_sequence() {
        let steps = vec![step(0, &["a"], "x"), step(1, &["a"], "y")];
        let filtered = filter_steps(&steps, |_| true);
        assert!(filtered.is_empty());
    }

    #[test]
    fn filtering_is_idempotent() {
        let trace = InferenceTrace {
            prompt: "p".to_string(),
            formatted_prompt: None,
            generation_steps: vec![
                step(0, &["a", "\n"], "x"),
                step(1, &["a", "\n", "x"], "\n"),
                step(2, &["a", "x"], "y"),
            ],
            max_new_tokens: 3,
            top_k: 5,
            temperature: None,
        };
        let once = filter_trace_default(&trace);
        let twice = filter_trace_default(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn filtering_does_not_mutate_the_input() {
        let trace = InferenceTrace {
            prompt: "p".to_string(),
            formatted_prompt: None,
            generation_steps: vec![step(0, &["a", "\n"], "x")],
            max_new_tokens: 1,
            top_k: 5,
            temperature: None,
        };
        let before = trace.clone();
        let _ = filter_trace_default(&trace);
        assert_eq!(trace, before);
    }
}
