//! HTTP/JSON surface of the service.
//!
//! Every route except `/healthz` and session creation expects the
//! `x-happypics-session` header. Each mutating route answers with a full
//! page render so the client can redraw from one response.

use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use happypics_auth::{AuthError, IdentityProvider};
use happypics_core::{EmotionLabel, HistoryRecord};
use happypics_store::{AppendOutcome, HistoryStore, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::Mode;
use crate::engine::{EngineError, EngineHandle};
use crate::session::{ChartToggles, SessionRegistry};
use crate::view::{self, HistoryEntry, PageView};

pub const SESSION_HEADER: &str = "x-happypics-session";

/// Where history lives for this service instance.
#[derive(Clone)]
pub enum Backend {
    /// Each session keeps its own in-memory history.
    Volatile,
    /// One shared database, scoped by the logged-in identity.
    Durable {
        store: Arc<Mutex<dyn HistoryStore>>,
        identity: Arc<dyn IdentityProvider>,
    },
}

impl Backend {
    fn mode(&self) -> Mode {
        match self {
            Backend::Volatile => Mode::Volatile,
            Backend::Durable { .. } => Mode::Durable,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub backend: Backend,
    pub engine: EngineHandle,
    pub sessions: Arc<SessionRegistry>,
    pub thumbnail_width: u32,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("missing or malformed x-happypics-session header")]
    MissingSession,
    #[error("session not found")]
    UnknownSession,
    #[error("please log in first")]
    Unauthenticated,
    #[error("accounts are not available in volatile mode")]
    AccountsDisabled,
    #[error("{0}")]
    Auth(#[from] AuthError),
    #[error("{0}")]
    SignupRejected(String),
    #[error("history unavailable: {0}")]
    Storage(#[from] StoreError),
    #[error("no history entry at position {0}")]
    NoSuchEntry(usize),
    #[error("could not render thumbnail: {0}")]
    Thumbnail(#[from] image::ImageError),
    #[error("emotion engine unavailable")]
    EngineUnavailable,
    #[error("background task failed")]
    Join(#[from] tokio::task::JoinError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingSession => StatusCode::BAD_REQUEST,
            ApiError::UnknownSession | ApiError::NoSuchEntry(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::AccountsDisabled => StatusCode::NOT_FOUND,
            ApiError::Auth(AuthError::InvalidInput(_)) | ApiError::SignupRejected(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Auth(AuthError::Rejected(_)) => StatusCode::UNAUTHORIZED,
            ApiError::Auth(_) => StatusCode::BAD_GATEWAY,
            ApiError::EngineUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Storage(_) | ApiError::Thumbnail(_) | ApiError::Join(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/session", post(create_session).delete(end_session))
        .route("/v1/signup", post(signup))
        .route("/v1/login", post(login))
        .route("/v1/logout", post(logout))
        .route("/v1/analyze", post(analyze))
        .route("/v1/page", get(page))
        .route("/v1/history", get(history).delete(clear_history))
        .route("/v1/history/:position/thumbnail", get(thumbnail))
        .route("/v1/charts", put(set_charts))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

fn session_id(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or(ApiError::MissingSession)
}

impl AppState {
    /// Run `f` against the history store in scope for `session`.
    ///
    /// Volatile: the session's own history. Durable: the shared database,
    /// scoped by the session identity, which must be logged in.
    fn with_history<R>(
        &self,
        session: &Uuid,
        f: impl FnOnce(&mut dyn HistoryStore, Option<&str>) -> Result<R, StoreError>,
    ) -> Result<R, ApiError> {
        self.sessions
            .with(session, |ctx| match &self.backend {
                Backend::Volatile => Ok(f(&mut ctx.history, None)?),
                Backend::Durable { store, .. } => {
                    let identity = ctx.auth.identity().ok_or(ApiError::Unauthenticated)?;
                    let mut store = store.lock().unwrap_or_else(|p| p.into_inner());
                    Ok(f(&mut *store, Some(identity.as_str()))?)
                }
            })
            .ok_or(ApiError::UnknownSession)?
    }

    fn records(&self, session: &Uuid) -> Result<Vec<HistoryRecord>, ApiError> {
        self.with_history(session, |store, identity| store.list(identity))
    }

    /// Full re-render of the session's page.
    fn render(&self, session: &Uuid) -> Result<PageView, ApiError> {
        let records = self.records(session)?;
        let (identity, toggles) = self
            .sessions
            .with(session, |ctx| {
                (ctx.auth.identity().map(|i| i.to_string()), ctx.toggles)
            })
            .ok_or(ApiError::UnknownSession)?;
        Ok(PageView::render(self.backend.mode(), identity, toggles, &records))
    }

    /// Fail early when the session cannot reach any history.
    fn ensure_ready(&self, session: &Uuid) -> Result<(), ApiError> {
        let authenticated = self
            .sessions
            .with(session, |ctx| ctx.auth.is_authenticated())
            .ok_or(ApiError::UnknownSession)?;
        match self.backend {
            Backend::Durable { .. } if !authenticated => Err(ApiError::Unauthenticated),
            _ => Ok(()),
        }
    }

    fn identity_provider(&self) -> Result<Arc<dyn IdentityProvider>, ApiError> {
        match &self.backend {
            Backend::Durable { identity, .. } => Ok(identity.clone()),
            Backend::Volatile => Err(ApiError::AccountsDisabled),
        }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
    mode: Mode,
    models_loaded: bool,
    sessions: usize,
}

async fn healthz(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        mode: state.backend.mode(),
        models_loaded: state.engine.is_running(),
        sessions: state.sessions.len(),
    })
}

#[derive(Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: Uuid,
}

async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionCreated>) {
    let session_id = state.sessions.create();
    (StatusCode::CREATED, Json(SessionCreated { session_id }))
}

async fn end_session(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode, ApiError> {
    let id = session_id(&headers)?;
    if state.sessions.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::UnknownSession)
    }
}

#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(creds): Json<Credentials>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = session_id(&headers)?;
    state.sessions.with(&id, |_| ()).ok_or(ApiError::UnknownSession)?;
    let provider = state.identity_provider()?;

    tokio::task::spawn_blocking(move || provider.sign_up(&creds.email, &creds.password))
        .await?
        .map_err(|e| match e {
            // e.g. EMAIL_EXISTS
            AuthError::Rejected(reason) => ApiError::SignupRejected(reason),
            other => ApiError::Auth(other),
        })?;

    Ok(Json(MessageResponse {
        message: "Account created successfully. Please log in.".into(),
    }))
}

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(creds): Json<Credentials>,
) -> Result<Json<PageView>, ApiError> {
    let id = session_id(&headers)?;
    state.sessions.with(&id, |_| ()).ok_or(ApiError::UnknownSession)?;
    let provider = state.identity_provider()?;

    let outcome =
        tokio::task::spawn_blocking(move || provider.sign_in(&creds.email, &creds.password)).await?;

    state
        .sessions
        .with(&id, |ctx| ctx.auth.finish_login(outcome))
        .ok_or(ApiError::UnknownSession)??;

    Ok(Json(state.render(&id)?))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<PageView>, ApiError> {
    let id = session_id(&headers)?;
    state.sessions.with(&id, |_| ()).ok_or(ApiError::UnknownSession)?;
    state.identity_provider()?;
    state
        .sessions
        .with(&id, |ctx| ctx.logout())
        .ok_or(ApiError::UnknownSession)?;

    Ok(Json(PageView::render(
        state.backend.mode(),
        None,
        ChartToggles::default(),
        &[],
    )))
}

/// Result of one upload, as shown above the page.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalyzeOutcome {
    Detected {
        emotion: EmotionLabel,
        score: f32,
        /// False when the upload repeated the previous one or saving failed.
        stored: bool,
    },
    NoFace,
    Failed {
        reason: String,
    },
}

#[derive(Serialize)]
struct AnalyzeResponse {
    outcome: AnalyzeOutcome,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
    page: PageView,
}

async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    upload: Bytes,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let id = session_id(&headers)?;
    state.ensure_ready(&id)?;

    let mut warning = None;
    let (outcome, message) = match state.engine.analyze(upload.to_vec()).await {
        Ok(Some(detection)) => {
            let score = detection.score;
            let appended = state.with_history(&id, |store, identity| {
                let outcome = store.append(identity, detection.stored_image, score)?;
                tracing::debug!(session = %id, records = ?store.count(identity).ok(), ?outcome, "history updated");
                Ok(outcome)
            });
            let stored = match appended {
                Ok(AppendOutcome::Inserted) => true,
                Ok(AppendOutcome::DuplicateSuppressed) => false,
                Err(ApiError::Storage(e)) => {
                    tracing::warn!(error = %e, "could not save analysis to history");
                    warning = Some(format!("Could not save to history: {e}"));
                    false
                }
                Err(other) => return Err(other),
            };
            let message = format!(
                "Detected emotion: {} with confidence {:.2}",
                score.label, score.score
            );
            (
                AnalyzeOutcome::Detected {
                    emotion: score.label,
                    score: score.score,
                    stored,
                },
                message,
            )
        }
        Ok(None) => (
            AnalyzeOutcome::NoFace,
            "No face detected or unable to detect emotions".to_string(),
        ),
        Err(EngineError::Inference(e)) => (
            AnalyzeOutcome::Failed { reason: e.to_string() },
            format!("Error processing the image: {e}"),
        ),
        Err(e) => {
            tracing::error!(error = %e, "engine request failed");
            return Err(ApiError::EngineUnavailable);
        }
    };

    Ok(Json(AnalyzeResponse {
        outcome,
        message,
        warning,
        page: state.render(&id)?,
    }))
}

async fn page(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<PageView>, ApiError> {
    let id = session_id(&headers)?;
    Ok(Json(state.render(&id)?))
}

async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let id = session_id(&headers)?;
    Ok(Json(HistoryEntry::list(&state.records(&id)?)))
}

async fn thumbnail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(position): Path<usize>,
) -> Result<Response, ApiError> {
    let id = session_id(&headers)?;
    let records = state.records(&id)?;
    let record = position
        .checked_sub(1)
        .and_then(|i| records.get(i))
        .ok_or(ApiError::NoSuchEntry(position))?;

    let png = view::thumbnail(&record.image, state.thumbnail_width)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

#[derive(Serialize)]
struct ClearResponse {
    removed: usize,
    page: PageView,
}

async fn clear_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ClearResponse>, ApiError> {
    let id = session_id(&headers)?;
    let removed = state.with_history(&id, |store, identity| store.clear(identity))?;
    tracing::info!(session = %id, removed, "history cleared");
    Ok(Json(ClearResponse {
        removed,
        page: state.render(&id)?,
    }))
}

async fn set_charts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(toggles): Json<ChartToggles>,
) -> Result<Json<PageView>, ApiError> {
    let id = session_id(&headers)?;
    state
        .sessions
        .with(&id, |ctx| ctx.toggles = toggles)
        .ok_or(ApiError::UnknownSession)?;
    Ok(Json(state.render(&id)?))
}
