//! # Trazar
//!
//! Trace engine for causal language model decoding and teacher-forced
//! prediction. Trazar (Spanish: "to trace") turns a prompt — or a fixed
//! text — plus per-position logit vectors into an ordered, replayable JSON
//! trace for step-by-step visualization.
//!
//! The model and tokenizer live behind the [`session::ModelSession`] trait;
//! trazar never trains or runs a model itself. What it does own:
//!
//! - **Distribution extraction**: the base (temperature-1) top-K
//!   distribution at every position, independent of sampling temperature
//! - **Selection**: greedy or temperature-rescaled sampling restricted to
//!   the extracted top-K
//! - **Display accounting**: which tokens are "already shown" at each step,
//!   with chat-template system turns excluded via boundary detection
//! - **Teacher forcing**: per-position predictions and cross-entropy loss
//!   over a fixed token sequence
//! - **Post-trace filtering**: index-consistent removal of unwanted tokens
//!   (line breaks by default) across all parallel per-token arrays
//!
//! ## Example
//!
//! ```rust
//! use trazar::inference::{InferenceOptions, InferenceRecorder};
//! use trazar::session::MockSession;
//!
//! let session = MockSession::demo();
//! let options = InferenceOptions {
//!     max_new_tokens: 2,
//!     top_k: 5,
//!     ..InferenceOptions::default()
//! };
//! let trace = InferenceRecorder::new(&session)
//!     .record("2+2=", &options)
//!     .unwrap();
//! assert!(!trace.generation_steps.is_empty());
//! ```
//!
//! The `server` feature adds an axum service exposing the engine; the
//! `client` feature adds a blocking client that turns service responses
//! into the JSON documents the visualization app loads.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)] // vocab indices fit in u32
#![allow(clippy::cast_precision_loss)] // usize -> f32 for toy logits
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::float_cmp)] // exact comparisons on rounded values in tests

/// HTTP API exposing the trace engine
#[cfg(feature = "server")]
pub mod api;
/// User-turn boundary detection in chat-formatted prompts
pub mod boundary;
/// HTTP client producing visualization JSON documents
#[cfg(feature = "client")]
pub mod client;
/// Display tokens and the per-step display stream
pub mod display;
/// Base distribution extraction (softmax, top-K)
pub mod distribution;
/// Error types
pub mod error;
/// Post-trace token filter
pub mod filter;
/// Autoregressive trace recorder
pub mod inference;
/// Examples index aggregation
pub mod index;
/// Next-token selection (greedy / temperature sampling)
pub mod sampler;
/// Model session trait and deterministic mock
pub mod session;
/// Trace data model
pub mod trace;
/// Teacher-forced trace recorder
pub mod training;

pub use error::{Result, TrazarError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
