//! End-to-end scenarios over the deterministic mock session

use trazar::filter::filter_trace_default;
use trazar::inference::{InferenceOptions, InferenceRecorder};
use trazar::session::{MockSession, ModelSession};
use trazar::trace::{round4, SelectionMethod};
use trazar::training::TrainingRecorder;

/// Scenario: prompt "2+2=", one greedy step.
#[test]
fn single_greedy_step() {
    let session = MockSession::demo();
    let options = InferenceOptions {
        max_new_tokens: 1,
        top_k: 5,
        temperature: Some(0.0),
        apply_chat_template: true,
        seed: None,
    };
    let trace = InferenceRecorder::new(&session)
        .record("2+2=", &options)
        .expect("trace");

    assert_eq!(trace.generation_steps.len(), 1);
    let step = &trace.generation_steps[0];
    assert_eq!(step.step, 0);
    assert_eq!(step.selected_token.selection_method, SelectionMethod::Greedy);
    assert_eq!(
        step.selected_token.token_id,
        step.output_distribution.candidates[0].token_id
    );
    assert_eq!(step.output_distribution.top_k, 5);
    assert_eq!(step.output_distribution.candidates.len(), 5);
    assert_eq!(step.tokens.len(), step.token_ids.len());
}

/// Scenario: training text of two tokens yields exactly two steps.
#[test]
fn two_token_training_text() {
    let session = MockSession::new(
        vec![
            "<eos>".to_string(),
            "A".to_string(),
            "B".to_string(),
        ],
        0,
    );
    let trace = TrainingRecorder::new(&session)
        .record("AB", "test", None)
        .expect("trace");

    assert_eq!(trace.training_steps.len(), 2);
    assert!(trace.training_steps[0].input_tokens.is_empty());
    assert_eq!(trace.training_steps[1].input_tokens, vec!["A"]);
    assert_eq!(trace.training_steps[1].input_token_ids, vec![1]);
}

/// Scenario: a trace whose only generated token is a line break filters to
/// zero surviving steps.
#[test]
fn line_break_only_trace_filters_to_nothing() {
    // vocab with a newline token the script selects immediately
    let session = MockSession::new(
        vec![
            "<eos>".to_string(),
            "a".to_string(),
            "\n".to_string(),
        ],
        0,
    )
    .with_script(vec![2, 2]);

    let options = InferenceOptions {
        max_new_tokens: 1,
        top_k: 3,
        temperature: None,
        apply_chat_template: false,
        seed: None,
    };
    let trace = InferenceRecorder::new(&session)
        .record("a", &options)
        .expect("trace");
    assert_eq!(trace.generation_steps.len(), 1);
    assert_eq!(trace.generation_steps[0].selected_token.token, "\n");

    let filtered = filter_trace_default(&trace);
    assert!(filtered.generation_steps.is_empty());
}

/// The recorded distribution never depends on the sampling temperature.
#[test]
fn distributions_comparable_across_temperatures() {
    let session = MockSession::demo();
    let recorder = InferenceRecorder::new(&session);

    let base = InferenceOptions {
        max_new_tokens: 1,
        top_k: 5,
        temperature: None,
        apply_chat_template: true,
        seed: Some(1),
    };
    let greedy = recorder.record("2+2=", &base).expect("trace");

    for tau in [0.2f32, 1.0, 2.5, 100.0] {
        let options = InferenceOptions {
            temperature: Some(tau),
            ..base.clone()
        };
        let sampled = recorder.record("2+2=", &options).expect("trace");
        assert_eq!(
            greedy.generation_steps[0].output_distribution,
            sampled.generation_steps[0].output_distribution,
            "distribution changed at tau={tau}"
        );
    }
}

/// Training: cross-entropy of the single true label.
#[test]
fn training_loss_is_negative_target_logprob() {
    let session = MockSession::demo();
    let trace = TrainingRecorder::new(&session)
        .record("two plus two is four", "demo", None)
        .expect("trace");
    assert!(trace.num_tokens > 2);
    for step in &trace.training_steps {
        assert_eq!(step.loss, round4(-step.target_logprob));
        assert_eq!(step.target_prob, step.target_token_prediction.prob);
        assert_eq!(step.target_logprob, step.target_token_prediction.logprob);
    }
}

/// The EOS step is recorded before generation stops.
#[test]
fn eos_step_is_part_of_the_trace() {
    let session = MockSession::demo();
    let options = InferenceOptions {
        max_new_tokens: 10,
        top_k: 5,
        temperature: None,
        apply_chat_template: true,
        seed: None,
    };
    let trace = InferenceRecorder::new(&session)
        .record("2+2=", &options)
        .expect("trace");

    // the demo script answers then emits eos, well before the bound
    let last = trace.generation_steps.last().expect("steps");
    assert!(trace.generation_steps.len() < 10);
    assert_eq!(last.selected_token.token_id, session.eos_id());
}

/// Chat accounting: every step's display stream grows by exactly the
/// previous selection, and never contains the step's own selection.
#[test]
fn display_stream_grows_step_by_step() {
    let session = MockSession::demo();
    let options = InferenceOptions {
        max_new_tokens: 3,
        top_k: 5,
        temperature: None,
        apply_chat_template: true,
        seed: None,
    };
    let trace = InferenceRecorder::new(&session)
        .record("2+2=", &options)
        .expect("trace");

    let steps = &trace.generation_steps;
    assert!(steps.len() >= 2);
    for pair in steps.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        assert_eq!(current.token_ids.len(), previous.token_ids.len() + 1);
        assert_eq!(
            current.token_ids.last().copied(),
            Some(previous.selected_token.token_id)
        );
        assert_eq!(current.tokens.len(), current.token_ids.len());
    }
}

/// A serialized inference trace round-trips through JSON unchanged.
#[test]
fn trace_json_roundtrip() {
    let session = MockSession::demo();
    let options = InferenceOptions {
        max_new_tokens: 2,
        top_k: 4,
        temperature: Some(0.7),
        apply_chat_template: true,
        seed: Some(11),
    };
    let trace = InferenceRecorder::new(&session)
        .record("2+2=", &options)
        .expect("trace");

    let json = serde_json::to_string(&trace).expect("serialize");
    let back: trazar::trace::InferenceTrace = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(trace, back);

    let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
    let step = &value["generation_steps"][0];
    for field in ["step", "input_text", "tokens", "token_ids", "output_distribution", "selected_token"] {
        assert!(step.get(field).is_some(), "missing field {field}");
    }
    let candidate = &step["output_distribution"]["candidates"][0];
    for field in ["token", "token_id", "logprob", "prob"] {
        assert!(candidate.get(field).is_some(), "missing candidate field {field}");
    }
}
