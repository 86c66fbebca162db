//! Axum handlers exposing the reconciliation console to an operator front-end.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::client::AdminApi;
use crate::console::{
    ConsoleView, LogDetailView, LogFilter, ReconciliationConsole, SearchOutcome, UserPanel,
};
use crate::errors::ConsoleError;
use crate::models::{ActionOutcome, Page, Transaction, TransactionQuery, UserQuery};
use crate::token::TokenStore;

pub struct ApiState<C> {
    pub console: ReconciliationConsole<C>,
    pub tokens: TokenStore,
}

type ApiResult<T> = std::result::Result<Json<T>, ConsoleError>;

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Deserialize)]
pub struct SessionRequest {
    pub token: String,
}

#[derive(Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct NoteRequest {
    /// `None` is a cancelled prompt.
    pub note: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ReprocessRequest {
    pub confirm: bool,
}

#[derive(Deserialize)]
pub struct TopupFormRequest {
    /// Raw operator input; validated by the console, not here.
    #[serde(default)]
    pub credits: Value,
    #[serde(default)]
    pub note: String,
}

impl IntoResponse for ConsoleError {
    fn into_response(self) -> Response {
        let status = match &self {
            ConsoleError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ConsoleError::Busy(_) | ConsoleError::Conflict(_) => StatusCode::CONFLICT,
            ConsoleError::NotFound(_) => StatusCode::NOT_FOUND,
            ConsoleError::Api { .. } => StatusCode::BAD_GATEWAY,
            _ => {
                error!("Console error: {self}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

// ─────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────

pub fn router<C: AdminApi + 'static>(state: Arc<ApiState<C>>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/session", put(save_session::<C>).delete(clear_session::<C>))
        .route("/console", get(view::<C>))
        .route("/console/logs/refresh", post(refresh_logs::<C>))
        .route("/console/logs/:id/select", post(select_log::<C>))
        .route("/console/search", post(search_users::<C>))
        .route("/console/users/:id/choose", post(choose_user::<C>))
        .route("/console/assign", post(assign::<C>))
        .route("/console/reprocess", post(reprocess::<C>))
        .route("/console/ignore", post(ignore::<C>))
        .route("/console/roster", post(load_roster::<C>))
        .route("/console/users/:id/open", post(open_user::<C>))
        .route("/console/users/transactions", post(load_user_transactions::<C>))
        .route("/console/topup", post(topup::<C>))
        .route("/console/transactions", get(browse_transactions::<C>))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `PUT /session`
async fn save_session<C: AdminApi>(
    State(state): State<Arc<ApiState<C>>>,
    Json(req): Json<SessionRequest>,
) -> std::result::Result<StatusCode, ConsoleError> {
    if req.token.trim().is_empty() {
        return Err(ConsoleError::validation("Token must not be empty"));
    }
    state.tokens.save(req.token.trim())?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /session`
async fn clear_session<C: AdminApi>(
    State(state): State<Arc<ApiState<C>>>,
) -> std::result::Result<StatusCode, ConsoleError> {
    state.tokens.clear()?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /console`
async fn view<C: AdminApi>(State(state): State<Arc<ApiState<C>>>) -> Json<ConsoleView> {
    Json(state.console.view())
}

/// `POST /console/logs/refresh`
///
/// An empty body reuses the last filter.
async fn refresh_logs<C: AdminApi>(
    State(state): State<Arc<ApiState<C>>>,
    body: Option<Json<LogFilter>>,
) -> ApiResult<ConsoleView> {
    state.console.refresh_logs(body.map(|Json(f)| f)).await?;
    Ok(Json(state.console.view()))
}

/// `POST /console/logs/:id/select`. `null` when a newer selection won.
async fn select_log<C: AdminApi>(
    State(state): State<Arc<ApiState<C>>>,
    Path(id): Path<String>,
) -> ApiResult<Option<LogDetailView>> {
    Ok(Json(state.console.select_log(&id).await?))
}

/// `POST /console/search`
async fn search_users<C: AdminApi>(
    State(state): State<Arc<ApiState<C>>>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<SearchOutcome> {
    Ok(Json(state.console.search_users(&req.text).await?))
}

/// `POST /console/users/:id/choose`
async fn choose_user<C: AdminApi>(
    State(state): State<Arc<ApiState<C>>>,
    Path(id): Path<String>,
) -> ApiResult<ConsoleView> {
    state.console.choose_user(&id)?;
    Ok(Json(state.console.view()))
}

/// `POST /console/assign`
async fn assign<C: AdminApi>(
    State(state): State<Arc<ApiState<C>>>,
    body: Option<Json<NoteRequest>>,
) -> ApiResult<ActionOutcome> {
    if let Some(Json(NoteRequest { note: Some(note) })) = body {
        state.console.set_assign_note(&note);
    }
    Ok(Json(state.console.assign().await?))
}

/// `POST /console/reprocess`
async fn reprocess<C: AdminApi>(
    State(state): State<Arc<ApiState<C>>>,
    body: Option<Json<ReprocessRequest>>,
) -> ApiResult<ActionOutcome> {
    let confirmed = body.map(|Json(r)| r.confirm).unwrap_or(false);
    Ok(Json(state.console.reprocess(confirmed).await?))
}

/// `POST /console/ignore`
async fn ignore<C: AdminApi>(
    State(state): State<Arc<ApiState<C>>>,
    body: Option<Json<NoteRequest>>,
) -> ApiResult<ActionOutcome> {
    let note = body.and_then(|Json(r)| r.note);
    Ok(Json(state.console.ignore(note.as_deref()).await?))
}

/// `POST /console/roster`
async fn load_roster<C: AdminApi>(
    State(state): State<Arc<ApiState<C>>>,
    body: Option<Json<UserQuery>>,
) -> ApiResult<ConsoleView> {
    state.console.load_roster(body.map(|Json(q)| q)).await?;
    Ok(Json(state.console.view()))
}

/// `POST /console/users/:id/open`
async fn open_user<C: AdminApi>(
    State(state): State<Arc<ApiState<C>>>,
    Path(id): Path<String>,
) -> ApiResult<UserPanel> {
    Ok(Json(state.console.open_user(&id).await?))
}

/// `POST /console/users/transactions`
async fn load_user_transactions<C: AdminApi>(
    State(state): State<Arc<ApiState<C>>>,
    body: Option<Json<TransactionQuery>>,
) -> ApiResult<ConsoleView> {
    state
        .console
        .load_user_transactions(body.map(|Json(q)| q))
        .await?;
    Ok(Json(state.console.view()))
}

/// `POST /console/topup`
async fn topup<C: AdminApi>(
    State(state): State<Arc<ApiState<C>>>,
    Json(req): Json<TopupFormRequest>,
) -> ApiResult<ActionOutcome> {
    let credits = match req.credits {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    };
    state.console.set_topup_form(&credits, &req.note)?;
    Ok(Json(state.console.topup().await?))
}

/// `GET /console/transactions`
async fn browse_transactions<C: AdminApi>(
    State(state): State<Arc<ApiState<C>>>,
    Query(query): Query<TransactionQuery>,
) -> ApiResult<Page<Transaction>> {
    Ok(Json(state.console.browse_transactions(query).await?))
}
