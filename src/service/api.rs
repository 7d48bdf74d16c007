use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequest, Path, Request, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value, json};
use taskboard_core::{TreeError, TreeMutator};
use tracing::{debug, error, info};

use super::db::DbHandle;
#[cfg(test)]
use super::db::BoardDb;
use super::identity::{Authenticator, CurrentUser, HeaderAuthenticator};
use super::models::{Board, BoardChanges, NewBoard, UserChanges};
use crate::errors::TaskboardError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub mutator: TreeMutator,
    pub authenticator: Arc<dyn Authenticator>,
}

impl AppState {
    pub fn new(db: DbHandle) -> Self {
        Self {
            db,
            mutator: TreeMutator::new(),
            authenticator: Arc::new(HeaderAuthenticator::default()),
        }
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub boards_title: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBoardRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub custom_title: Option<String>,
    pub position: Option<i64>,
}

/// Partial board update. `description` and `customTitle` distinguish an
/// absent key (keep) from an explicit `null` (clear).
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBoardRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub custom_title: Option<Option<String>>,
    pub position: Option<i64>,
    pub lists: Option<Value>,
}

#[derive(Deserialize)]
pub struct PositionRequest {
    pub position: Option<i64>,
}

#[derive(Deserialize)]
pub struct DescriptionRequest {
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
}

/// Titles and descriptions are stored as sent, whatever their JSON type.
#[derive(Deserialize)]
pub struct CreateListRequest {
    pub title: Option<Value>,
}

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub title: Option<Value>,
    pub description: Option<Value>,
}

/// Maps a present key to `Some`, so `null` becomes `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// `Json` whose rejections answer with the API's error body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Internal(msg) => {
                error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(json!({"message": message}))).into_response()
    }
}

impl From<TaskboardError> for ApiError {
    fn from(err: TaskboardError) -> Self {
        let message = err.to_string();
        match err {
            e if e.is_not_found() => ApiError::NotFound(message),
            TaskboardError::EmailTaken { .. } | TaskboardError::InvalidRequest(_) => {
                ApiError::BadRequest(message)
            }
            TaskboardError::MissingIdentity => ApiError::Unauthorized(message),
            TaskboardError::Forbidden { .. } => ApiError::Forbidden(message),
            _ => ApiError::Internal(message),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<TreeError> for ApiError {
    fn from(err: TreeError) -> Self {
        TaskboardError::from(err).into()
    }
}

/// Store failures arrive as `anyhow`; domain errors raised inside a store
/// closure keep their mapping.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<TaskboardError>() {
            Ok(domain) => domain.into(),
            Err(err) => ApiError::Internal(format!("{:#}", err)),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/users", post(create_user))
        .route("/api/users/{user_id}", get(get_user).put(update_user))
        .route("/api/boards", get(list_boards).post(create_board))
        .route(
            "/api/boards/{id}",
            get(get_board).put(update_board).delete(delete_board),
        )
        .route("/api/boards/{id}/position", put(update_position))
        .route("/api/boards/{id}/description", put(update_description))
        .route("/api/boards/{id}/lists", post(create_list))
        .route(
            "/api/boards/{id}/lists/{list_id}",
            put(update_list).delete(delete_list),
        )
        .route("/api/boards/{id}/lists/{list_id}/tasks", post(create_task))
        .route(
            "/api/boards/{id}/lists/{list_id}/tasks/{task_id}",
            put(update_task).delete(delete_task),
        )
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

async fn load_board(state: &SharedState, id: i64, user_id: i64) -> Result<Board, ApiError> {
    state
        .db
        .call(move |db| db.get_board(id, user_id))
        .await?
        .ok_or_else(|| TaskboardError::BoardNotFound { id }.into())
}

/// Persist a board's mutated tree. This is a separate store call from the
/// load, so concurrent writers to one board resolve last-write-wins.
async fn store_lists(state: &SharedState, board: Board) -> Result<Board, ApiError> {
    let (id, user_id, lists) = (board.id, board.user_id, board.lists);
    state
        .db
        .call(move |db| db.save_lists(id, user_id, &lists))
        .await?
        .ok_or_else(|| TaskboardError::BoardNotFound { id }.into())
}

async fn apply_changes(
    state: &SharedState,
    id: i64,
    user_id: i64,
    changes: BoardChanges,
) -> Result<Board, ApiError> {
    if changes.is_empty() {
        return load_board(state, id, user_id).await;
    }
    state
        .db
        .call(move |db| db.update_board(id, user_id, &changes))
        .await?
        .ok_or_else(|| TaskboardError::BoardNotFound { id }.into())
}

fn message(text: &str) -> Json<Value> {
    Json(json!({"message": text}))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn create_user(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.unwrap_or_default().trim().to_string();
    let email = req.email.unwrap_or_default().trim().to_string();
    if name.is_empty() || email.is_empty() {
        return Err(TaskboardError::InvalidRequest("Name and email are required".into()).into());
    }
    validate_email(&email)?;
    let user = state
        .db
        .call(move |db| db.create_user(&name, &email))
        .await?;
    info!(user_id = user.id, "User created");
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if user.id != user_id {
        return Err(TaskboardError::Forbidden { action: "access" }.into());
    }
    Ok(Json(user))
}

async fn update_user(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<i64>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if user.id != user_id {
        return Err(TaskboardError::Forbidden { action: "update" }.into());
    }
    if let Some(email) = &req.email {
        validate_email(email)?;
    }
    let changes = UserChanges {
        name: req.name,
        email: req.email,
        boards_title: req.boards_title,
    };
    let updated = state
        .db
        .call(move |db| db.update_user(user_id, &changes))
        .await?
        .ok_or(TaskboardError::UserNotFound { id: user_id })?;
    Ok(Json(updated))
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(TaskboardError::InvalidRequest("Please provide a valid email".into()).into()),
    }
}

async fn list_boards(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let boards = state.db.call(move |db| db.list_boards(user.id)).await?;
    Ok(Json(boards))
}

async fn create_board(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<CreateBoardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = match req.name {
        Some(name) if !name.is_empty() => name,
        _ => return Err(TaskboardError::InvalidRequest("Board name is required".into()).into()),
    };
    let new = NewBoard {
        name,
        description: req.description.filter(|d| !d.is_empty()),
        custom_title: req.custom_title,
        position: req.position.unwrap_or(0),
        lists: None,
    };
    let board = state
        .db
        .call(move |db| db.create_board(user.id, &new))
        .await?;
    info!(board_id = board.id, user_id = board.user_id, "Board created");
    Ok((StatusCode::CREATED, Json(board)))
}

async fn get_board(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(load_board(&state, id, user.id).await?))
}

async fn update_board(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<UpdateBoardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let changes = BoardChanges {
        name: req.name.filter(|n| !n.is_empty()),
        description: req.description,
        custom_title: req.custom_title,
        position: req.position,
        lists: req.lists,
    };
    let board = apply_changes(&state, id, user.id, changes).await?;
    Ok(Json(board))
}

async fn delete_board(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .call(move |db| db.delete_board(id, user.id))
        .await?;
    if !deleted {
        return Err(TaskboardError::BoardNotFound { id }.into());
    }
    info!(board_id = id, "Board deleted");
    Ok(message("Board deleted"))
}

async fn update_position(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<PositionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let changes = BoardChanges {
        position: req.position,
        ..Default::default()
    };
    let board = apply_changes(&state, id, user.id, changes).await?;
    Ok(Json(json!({"message": "Board position updated", "board": board})))
}

async fn update_description(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<DescriptionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let changes = BoardChanges {
        description: req.description,
        ..Default::default()
    };
    let board = apply_changes(&state, id, user.id, changes).await?;
    Ok(Json(json!({"message": "Board description updated", "board": board})))
}

async fn create_list(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<CreateListRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut board = load_board(&state, id, user.id).await?;
    let list = state.mutator.append_list(&mut board.lists, req.title);
    store_lists(&state, board).await?;
    debug!(board_id = id, list_id = %list.id, "List added");
    Ok((StatusCode::CREATED, Json(list)))
}

async fn update_list(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path((id, list_id)): Path<(i64, String)>,
    ApiJson(patch): ApiJson<Map<String, Value>>,
) -> Result<impl IntoResponse, ApiError> {
    let mut board = load_board(&state, id, user.id).await?;
    let list = state.mutator.replace_list(&mut board.lists, &list_id, &patch)?;
    store_lists(&state, board).await?;
    debug!(board_id = id, list_id = %list.id, "List updated");
    Ok(Json(list))
}

async fn delete_list(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path((id, list_id)): Path<(i64, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let mut board = load_board(&state, id, user.id).await?;
    state.mutator.remove_list(&mut board.lists, &list_id)?;
    store_lists(&state, board).await?;
    debug!(board_id = id, list_id = %list_id, "List deleted");
    Ok(message("List deleted"))
}

async fn create_task(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path((id, list_id)): Path<(i64, String)>,
    ApiJson(req): ApiJson<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut board = load_board(&state, id, user.id).await?;
    let task = state
        .mutator
        .append_task(&mut board.lists, &list_id, req.title, req.description)?;
    store_lists(&state, board).await?;
    debug!(board_id = id, list_id = %list_id, task_id = %task.id, "Task added");
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path((id, list_id, task_id)): Path<(i64, String, String)>,
    ApiJson(patch): ApiJson<Map<String, Value>>,
) -> Result<impl IntoResponse, ApiError> {
    let mut board = load_board(&state, id, user.id).await?;
    let task = state
        .mutator
        .replace_task(&mut board.lists, &list_id, &task_id, &patch)?;
    store_lists(&state, board).await?;
    debug!(board_id = id, list_id = %list_id, task_id = %task_id, "Task updated");
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path((id, list_id, task_id)): Path<(i64, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let mut board = load_board(&state, id, user.id).await?;
    state
        .mutator
        .remove_task(&mut board.lists, &list_id, &task_id)?;
    store_lists(&state, board).await?;
    debug!(board_id = id, list_id = %list_id, task_id = %task_id, "Task deleted");
    Ok(message("Task deleted"))
}

// ── Tests ─────────────────────────────────────────────────────────────
