//! HTTP client producing visualization JSON documents
//!
//! Talks to a running trace service, records a trace, post-processes it
//! (inference traces go through the line-break filter), and assembles the
//! self-contained document the visualization app loads from disk.

use std::path::Path;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrazarError};
use crate::filter;
use crate::trace::{InferenceStep, InferenceTrace, ModelInfo, TrainingStep, TrainingTrace};

/// Generation parameters sent to `/generate`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateParams {
    /// The prompt to trace
    pub prompt: String,
    /// Maximum number of new tokens
    pub max_new_tokens: usize,
    /// Distribution candidates per step
    pub top_k: usize,
    /// Sampling temperature; absent or non-positive means greedy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Whether to apply the chat template when one exists
    pub apply_chat_template: bool,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            max_new_tokens: 10,
            top_k: 10,
            temperature: Some(1.0),
            apply_chat_template: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct TrainingParams<'a> {
    text: &'a str,
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

/// Self-contained inference document for the visualization app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceDocument {
    /// Example identifier (also the suggested file stem)
    pub id: String,
    /// The raw prompt
    pub prompt: String,
    /// Language code of the prompt
    pub language: String,
    /// Sampling temperature used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Candidates per step
    pub top_k: usize,
    /// Metadata of the model that produced the trace
    pub model_info: ModelInfo,
    /// Filtered, renumbered steps
    pub generation_steps: Vec<InferenceStep>,
}

/// Self-contained training document for the visualization app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingDocument {
    /// Example identifier
    pub id: String,
    /// Document type tag, always "training"
    #[serde(rename = "type")]
    pub kind: String,
    /// The input text
    pub text: String,
    /// Where the text came from
    pub source: String,
    /// Display tokens of the sequence
    pub tokens: Vec<String>,
    /// Ids matching `tokens`
    pub token_ids: Vec<u32>,
    /// Number of positions processed
    pub num_tokens: usize,
    /// Metadata of the model that produced the trace
    pub model_info: ModelInfo,
    /// One record per position
    pub training_steps: Vec<TrainingStep>,
}

/// Blocking client for the trace service.
pub struct TraceClient {
    base_url: String,
    http: Client,
}

impl TraceClient {
    /// Create a client for the service at `server_url`.
    #[must_use]
    pub fn new(server_url: &str) -> Self {
        Self {
            base_url: server_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|e| TrazarError::Http(e.to_string()))?;
        response
            .json::<T>()
            .map_err(|e| TrazarError::Http(e.to_string()))
    }

    fn post<B: Serialize, T: for<'de> Deserialize<'de>>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|e| TrazarError::Http(e.to_string()))?;
        response
            .json::<T>()
            .map_err(|e| TrazarError::Http(e.to_string()))
    }

    /// Check that the service is up; returns its banner as raw JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the service cannot be reached.
    pub fn check_server(&self) -> Result<serde_json::Value> {
        self.get("/")
    }

    /// Fetch metadata of the loaded model.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure or when no model is loaded.
    pub fn model_info(&self) -> Result<ModelInfo> {
        self.get("/model_info")
    }

    /// Record an inference trace.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure or a service-side error.
    pub fn generate(&self, params: &GenerateParams) -> Result<InferenceTrace> {
        self.post("/generate", params)
    }

    /// Record a teacher-forced trace.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure or a service-side error.
    pub fn process_training(
        &self,
        text: &str,
        source: &str,
        max_tokens: Option<usize>,
    ) -> Result<TrainingTrace> {
        self.post(
            "/process_training",
            &TrainingParams {
                text,
                source,
                max_tokens,
            },
        )
    }

    /// Record, filter, and package an inference trace as a visualization
    /// document. Line-break tokens are removed and steps renumbered.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure or a service-side error.
    pub fn create_inference_document(
        &self,
        params: &GenerateParams,
        language: &str,
        example_id: Option<String>,
    ) -> Result<InferenceDocument> {
        let model_info = self.model_info()?;
        let trace = self.generate(params)?;
        let filtered = filter::filter_trace_default(&trace);
        tracing::info!(
            steps = filtered.generation_steps.len(),
            dropped = trace.generation_steps.len() - filtered.generation_steps.len(),
            "inference trace recorded"
        );
        Ok(InferenceDocument {
            id: example_id.unwrap_or_else(|| timestamped_id("generated")),
            prompt: trace.prompt,
            language: language.to_string(),
            temperature: trace.temperature,
            top_k: trace.top_k,
            model_info,
            generation_steps: filtered.generation_steps,
        })
    }

    /// Record and package a training trace as a visualization document.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure or a service-side error.
    pub fn create_training_document(
        &self,
        text: &str,
        source: &str,
        max_tokens: Option<usize>,
        example_id: Option<String>,
    ) -> Result<TrainingDocument> {
        let model_info = self.model_info()?;
        let trace = self.process_training(text, source, max_tokens)?;
        tracing::info!(steps = trace.training_steps.len(), "training trace recorded");
        Ok(TrainingDocument {
            id: example_id.unwrap_or_else(|| timestamped_id("training")),
            kind: "training".to_string(),
            text: trace.text,
            source: trace.source,
            tokens: trace.tokens,
            token_ids: trace.token_ids,
            num_tokens: trace.num_tokens,
            model_info,
            training_steps: trace.training_steps,
        })
    }
}

/// `prefix_YYYYMMDD_HHMMSS`
fn timestamped_id(prefix: &str) -> String {
    format!("{prefix}_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}

/// Write a document as pretty-printed JSON, creating parent directories.
///
/// # Errors
///
/// Returns an error if the directories or file cannot be written.
pub fn save_document<T: Serialize>(document: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(document)?;
    std::fs::write(path, json)?;
    Ok(())
}
