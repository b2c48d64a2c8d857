//! HTTP API for the trace engine
//!
//! REST endpoints over axum for recording and inspecting traces.
//!
//! ## Endpoints
//!
//! - `GET /` - Service banner and endpoint map
//! - `GET /model_info` - Metadata of the loaded model
//! - `POST /tokenize` - Tokenize a prompt (display tokens)
//! - `POST /token_ids` - Tokenize a prompt (display tokens + ids)
//! - `POST /generate` - Record an inference trace
//! - `POST /process_training` - Record a teacher-forced trace
//! - `POST /load_model` - Replace the model session
//!
//! ## Example
//!
//! ```rust,ignore
//! use trazar::api::{create_router, AppState};
//!
//! let state = AppState::demo();
//! let app = create_router(state);
//! axum::serve(listener, app).await?;
//! ```
//!
//! Requests are handled against an immutable snapshot of the session
//! handle: a concurrent `/load_model` swaps the handle for new requests but
//! never mutates the session an in-flight trace is using.

pub mod types;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::error::TrazarError;
use crate::inference::{InferenceOptions, InferenceRecorder};
use crate::session::{ChatMessage, MockSession, ModelSession, SessionLoader};
use crate::trace::{InferenceTrace, ModelInfo, TrainingTrace};
use crate::training::TrainingRecorder;
use crate::{display, VERSION};

use self::types::{
    ErrorResponse, GenerateRequest, LoadModelRequest, LoadModelResponse, RootResponse,
    TokenIdsResponse, TokenizeRequest, TokenizeResponse, TrainingRequest,
};

/// Shared handle to the loaded session.
type SessionHandle = Arc<RwLock<Option<Arc<dyn ModelSession>>>>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    session: SessionHandle,
    loader: Option<Arc<dyn SessionLoader>>,
}

impl AppState {
    /// State with a loaded session and no reload capability.
    #[must_use]
    pub fn new(session: Arc<dyn ModelSession>) -> Self {
        Self {
            session: Arc::new(RwLock::new(Some(session))),
            loader: None,
        }
    }

    /// State with no session loaded; trace endpoints answer 503 until
    /// `/load_model` succeeds.
    #[must_use]
    pub fn unloaded() -> Self {
        Self {
            session: Arc::new(RwLock::new(None)),
            loader: None,
        }
    }

    /// Attach a loader for the `/load_model` endpoint.
    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn SessionLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Demo state: mock session plus a loader that builds mock sessions
    /// under any requested name.
    #[must_use]
    pub fn demo() -> Self {
        Self::new(Arc::new(MockSession::demo())).with_loader(Arc::new(DemoLoader))
    }

    /// Snapshot the current session.
    fn current(&self) -> Result<Arc<dyn ModelSession>, TrazarError> {
        self.session
            .read()
            .map_err(|_| TrazarError::Model("session lock poisoned".to_string()))?
            .clone()
            .ok_or(TrazarError::ModelNotLoaded)
    }

    /// Replace the session handle.
    fn replace(&self, session: Arc<dyn ModelSession>) -> Result<(), TrazarError> {
        *self
            .session
            .write()
            .map_err(|_| TrazarError::Model("session lock poisoned".to_string()))? = Some(session);
        Ok(())
    }
}

/// Loader used by demo mode: every model id resolves to a mock session.
struct DemoLoader;

impl SessionLoader for DemoLoader {
    fn load(&self, model_id: &str) -> crate::error::Result<Arc<dyn ModelSession>> {
        Ok(Arc::new(MockSession::demo().with_name(model_id)))
    }
}

/// Build the service router over `state`.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/model_info", get(model_info))
        .route("/tokenize", post(tokenize))
        .route("/token_ids", post(token_ids))
        .route("/generate", post(generate))
        .route("/process_training", post(process_training))
        .route("/load_model", post(load_model))
        .with_state(state)
}

/// Map engine errors to HTTP responses.
fn error_response(err: &TrazarError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match err {
        TrazarError::ModelNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
        TrazarError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    let model = state.current().ok().map(|s| s.model_info().name);
    let endpoints: BTreeMap<String, String> = [
        ("model_info", "/model_info"),
        ("tokenize", "/tokenize"),
        ("token_ids", "/token_ids"),
        ("generate", "/generate"),
        ("process_training", "/process_training"),
        ("load_model", "/load_model"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    Json(RootResponse {
        message: format!("trazar trace service v{VERSION}"),
        model,
        endpoints,
    })
}

async fn model_info(
    State(state): State<AppState>,
) -> Result<Json<ModelInfo>, (StatusCode, Json<ErrorResponse>)> {
    let session = state.current().map_err(|e| error_response(&e))?;
    Ok(Json(session.model_info()))
}

/// Shared prompt encoding for the tokenize endpoints.
fn encode_prompt(
    session: &dyn ModelSession,
    prompt: &str,
    apply_chat_template: bool,
) -> (String, Vec<u32>, Vec<String>) {
    let chat = apply_chat_template && session.has_chat_template();
    let text = if chat {
        session.render_chat(&[ChatMessage::user(prompt)], true)
    } else {
        prompt.to_string()
    };
    // chat-formatted text already carries its special tokens
    let ids = session.encode(&text, !chat);
    let tokens = display::display_tokens(session, &ids);
    (text, ids, tokens)
}

async fn tokenize(
    State(state): State<AppState>,
    Json(request): Json<TokenizeRequest>,
) -> Result<Json<TokenizeResponse>, (StatusCode, Json<ErrorResponse>)> {
    let session = state.current().map_err(|e| error_response(&e))?;
    let (formatted_text, _, tokens) =
        encode_prompt(session.as_ref(), &request.prompt, request.apply_chat_template);
    Ok(Json(TokenizeResponse {
        prompt: request.prompt,
        formatted_text,
        num_tokens: tokens.len(),
        tokens,
    }))
}

async fn token_ids(
    State(state): State<AppState>,
    Json(request): Json<TokenizeRequest>,
) -> Result<Json<TokenIdsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let session = state.current().map_err(|e| error_response(&e))?;
    let (formatted_text, ids, tokens) =
        encode_prompt(session.as_ref(), &request.prompt, request.apply_chat_template);
    Ok(Json(TokenIdsResponse {
        prompt: request.prompt,
        formatted_text,
        num_tokens: ids.len(),
        tokens,
        token_ids: ids,
    }))
}

async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<InferenceTrace>, (StatusCode, Json<ErrorResponse>)> {
    let session = state.current().map_err(|e| error_response(&e))?;
    let options = InferenceOptions {
        max_new_tokens: request.max_new_tokens,
        top_k: request.top_k,
        temperature: request.temperature,
        apply_chat_template: request.apply_chat_template,
        seed: request.seed,
    };
    let trace = InferenceRecorder::new(session.as_ref())
        .record(&request.prompt, &options)
        .map_err(|e| {
            tracing::error!(error = %e, "generate failed");
            error_response(&e)
        })?;
    Ok(Json(trace))
}

async fn process_training(
    State(state): State<AppState>,
    Json(request): Json<TrainingRequest>,
) -> Result<Json<TrainingTrace>, (StatusCode, Json<ErrorResponse>)> {
    let session = state.current().map_err(|e| error_response(&e))?;
    let trace = TrainingRecorder::new(session.as_ref())
        .record(&request.text, &request.source, request.max_tokens)
        .map_err(|e| {
            tracing::error!(error = %e, "process_training failed");
            error_response(&e)
        })?;
    Ok(Json(trace))
}

async fn load_model(
    State(state): State<AppState>,
    Json(request): Json<LoadModelRequest>,
) -> Result<Json<LoadModelResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Some(loader) = state.loader.clone() else {
        return Err((
            StatusCode::NOT_IMPLEMENTED,
            Json(ErrorResponse {
                error: "no session loader configured".to_string(),
            }),
        ));
    };
    tracing::info!(model_id = %request.model_id, "loading model");
    let session = loader.load(&request.model_id).map_err(|e| {
        tracing::error!(error = %e, model_id = %request.model_id, "model load failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Failed to load model: {e}"),
            }),
        )
    })?;
    let name = session.model_info().name;
    state.replace(session).map_err(|e| error_response(&e))?;
    Ok(Json(LoadModelResponse {
        status: "success".to_string(),
        model: name.clone(),
        message: format!("Model {name} loaded successfully"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unloaded_state_maps_to_service_unavailable() {
        let state = AppState::unloaded();
        let err = state.current().err().expect("no session");
        let (status, _) = error_response(&err);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn invalid_argument_maps_to_bad_request() {
        let err = TrazarError::InvalidArgument {
            argument: "top_k",
            reason: "must be positive".to_string(),
        };
        let (status, _) = error_response(&err);
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn generation_failure_maps_to_internal_error() {
        let err = TrazarError::Model("backend gone".to_string()).at_step(1);
        let (status, _) = error_response(&err);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn replace_swaps_the_session_for_new_requests() {
        let state = AppState::demo();
        let before = state.current().expect("loaded").model_info().name;
        state
            .replace(Arc::new(MockSession::demo().with_name("swapped")))
            .expect("replace");
        let after = state.current().expect("loaded").model_info().name;
        assert_ne!(before, after);
        assert_eq!(after, "swapped");
    }

    #[test]
    fn encode_prompt_skips_template_when_disabled() {
        let session = MockSession::demo();
        let (text, _, _) = encode_prompt(&session, "2+2=", false);
        assert_eq!(text, "2+2=");
        let (formatted, _, _) = encode_prompt(&session, "2+2=", true);
        assert!(formatted.contains("<|im_start|>user"));
    }
}
