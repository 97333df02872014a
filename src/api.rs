use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};

use crate::board::{Board, NewCard, RankPolicy, StackGuard};
use crate::db::{Db, DbHandle};
use crate::errors::{BoardError, ScopeError};
use crate::scope::{
    Decision, ProjectRegistry, Realm, ResourceRef, ScopeAction, ScopeFilter, ScopeTarget,
};

/// Header carrying the authenticated subject. Missing means `anonymous`.
pub const REMOTE_USER_HEADER: &str = "x-remote-user";

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub registry: Arc<ProjectRegistry>,
    pub filter: Arc<ScopeFilter>,
    pub rank_policy: RankPolicy,
    /// Permission card mutations require; empty disables the check.
    pub required_permission: String,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AddCardRequest {
    pub title: String,
    pub color: Option<String>,
    /// Expected version of the target stack
    pub version: Option<i64>,
}

#[derive(Deserialize)]
pub struct UpdateCardRequest {
    pub title: Option<String>,
    pub color: Option<String>,
    pub version: Option<i64>,
}

#[derive(Deserialize)]
pub struct MoveCardRequest {
    pub stack: String,
    pub rank: i64,
    /// Expected version of the destination stack
    pub version: Option<i64>,
    /// Expected version of the stack the card is leaving
    pub from_version: Option<i64>,
}

#[derive(Deserialize)]
pub struct VersionQuery {
    pub version: Option<i64>,
}

#[derive(Deserialize)]
pub struct StacksQuery {
    pub names: Option<String>,
}

#[derive(Deserialize)]
pub struct ActionQuery {
    pub action: Option<String>,
}

#[derive(Serialize)]
pub struct AccessResponse {
    pub subject: String,
    pub action: ScopeAction,
    pub target: ScopeTarget,
    pub decision: Decision,
}

#[derive(Serialize)]
pub struct ReloadResponse {
    pub projects: usize,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Forbidden(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let msg = err.to_string();
        if let Some(e) = err.downcast_ref::<BoardError>() {
            return match e {
                BoardError::CardNotFound { .. } => ApiError::NotFound(msg),
                BoardError::InvalidRank { .. } | BoardError::BadRequest(_) => {
                    ApiError::BadRequest(msg)
                }
                BoardError::VersionConflict { .. } => ApiError::Conflict(msg),
                BoardError::Database(_) => ApiError::Internal(msg),
            };
        }
        if let Some(e) = err.downcast_ref::<ScopeError>() {
            return match e {
                ScopeError::ProjectNotFound { .. }
                | ScopeError::ProjectNameNotFound { .. }
                | ScopeError::ResourceNotFound { .. } => ApiError::NotFound(msg),
                ScopeError::InvalidRealm(_) | ScopeError::BadRequest(_) => ApiError::BadRequest(msg),
                ScopeError::PermissionDenied { .. } => ApiError::Forbidden(msg),
                ScopeError::ClosureLimitExceeded { .. }
                | ScopeError::Database(_)
                | ScopeError::LockPoisoned => ApiError::Internal(msg),
            };
        }
        tracing::error!(error = %msg, "Unhandled API error");
        ApiError::Internal(msg)
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/stacks", get(get_stacks))
        .route(
            "/api/stacks/{stack}/cards",
            get(list_stack_cards).post(add_card),
        )
        .route(
            "/api/cards/{id}",
            get(get_card).patch(update_card).delete(delete_card),
        )
        .route("/api/cards/{id}/move", patch(move_card))
        .route("/api/projects", get(list_projects))
        .route("/api/access/project/{id}", get(check_project_access))
        .route("/api/access/{realm}/{name}", get(check_resource_access))
        .route("/api/registry/reload", post(reload_registry))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

fn subject_from(headers: &HeaderMap) -> String {
    headers
        .get(REMOTE_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(crate::scope::groups::ANONYMOUS)
        .to_string()
}

fn parse_action(query: &ActionQuery) -> Result<ScopeAction, ApiError> {
    match query.action.as_deref() {
        None => Ok(ScopeAction::default()),
        Some(s) => s.parse().map_err(ApiError::BadRequest),
    }
}

/// Fail with `PermissionDenied` unless `subject` holds the card-admin permission.
pub fn require_permission(
    db: &Db,
    registry: &ProjectRegistry,
    filter: &ScopeFilter,
    subject: &str,
    action: &str,
) -> Result<(), ScopeError> {
    if action.is_empty() {
        return Ok(());
    }
    let snapshot = registry.snapshot(db)?;
    if filter.has_permission(&snapshot, subject, action)? {
        Ok(())
    } else {
        Err(ScopeError::PermissionDenied {
            subject: subject.to_string(),
            action: action.to_string(),
            target: "cards".to_string(),
        })
    }
}

/// Run a card mutation after the permission gate, on the blocking pool.
async fn mutate_cards<F, R>(state: &SharedState, subject: String, f: F) -> Result<R, ApiError>
where
    F: FnOnce(&Board<'_>) -> Result<R, BoardError> + Send + 'static,
    R: Send + 'static,
{
    let registry = state.registry.clone();
    let filter = state.filter.clone();
    let required = state.required_permission.clone();
    let policy = state.rank_policy;
    let result = state
        .db
        .call(move |db| {
            require_permission(db, &registry, &filter, &subject, &required)?;
            Ok(f(&Board::new(db, policy))?)
        })
        .await?;
    Ok(result)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn get_stacks(
    State(state): State<SharedState>,
    Query(query): Query<StacksQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let names: Vec<String> = query
        .names
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if names.is_empty() {
        return Err(ApiError::BadRequest("names must list at least one stack".into()));
    }
    let policy = state.rank_policy;
    let stacks = state
        .db
        .call(move |db| Ok(Board::new(db, policy).get_stacks(&names)?))
        .await?;
    Ok(Json(stacks))
}

async fn list_stack_cards(
    State(state): State<SharedState>,
    Path(stack): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let policy = state.rank_policy;
    let cards = state
        .db
        .call(move |db| Ok(Board::new(db, policy).list_cards(&stack)?))
        .await?;
    Ok(Json(cards))
}

async fn add_card(
    State(state): State<SharedState>,
    Path(stack): Path<String>,
    headers: HeaderMap,
    Json(req): Json<AddCardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let guard = req.version.map(|v| StackGuard::new(stack.clone(), v));
    let card = NewCard {
        stack,
        title: req.title,
        color: req.color.unwrap_or_default(),
    };
    let card = mutate_cards(&state, subject_from(&headers), move |board| {
        board.add(&card, guard.as_ref())
    })
    .await?;
    Ok((StatusCode::CREATED, Json(card)))
}

async fn get_card(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let policy = state.rank_policy;
    let card = state
        .db
        .call(move |db| {
            Board::new(db, policy)
                .get_card(id)?
                .ok_or_else(|| BoardError::CardNotFound { id }.into())
        })
        .await?;
    Ok(Json(card))
}

async fn update_card(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<UpdateCardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let card = mutate_cards(&state, subject_from(&headers), move |board| {
        let guard = match req.version {
            Some(v) => Some(StackGuard::new(current_stack(board, id)?, v)),
            None => None,
        };
        board.update_card(id, req.title.as_deref(), req.color.as_deref(), guard.as_ref())
    })
    .await?;
    Ok(Json(card))
}

async fn move_card(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<MoveCardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let card = mutate_cards(&state, subject_from(&headers), move |board| {
        let mut guards = Vec::new();
        if let Some(v) = req.from_version {
            guards.push(StackGuard::new(current_stack(board, id)?, v));
        }
        if let Some(v) = req.version {
            guards.push(StackGuard::new(req.stack.clone(), v));
        }
        board.move_card(id, &req.stack, req.rank, &guards)
    })
    .await?;
    Ok(Json(card))
}

async fn delete_card(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Query(query): Query<VersionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    mutate_cards(&state, subject_from(&headers), move |board| {
        let guard = match query.version {
            Some(v) => Some(StackGuard::new(current_stack(board, id)?, v)),
            None => None,
        };
        board.delete(id, guard.as_ref())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn current_stack(board: &Board<'_>, id: i64) -> Result<String, BoardError> {
    board
        .get_card(id)?
        .map(|c| c.stack)
        .ok_or(BoardError::CardNotFound { id })
}

async fn list_projects(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let subject = subject_from(&headers);
    let registry = state.registry.clone();
    let filter = state.filter.clone();
    let projects = state
        .db
        .call(move |db| {
            let snapshot = registry.snapshot(db)?;
            Ok(filter.visible_projects(&snapshot, &subject)?)
        })
        .await?;
    Ok(Json(projects))
}

async fn check_project_access(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Query(query): Query<ActionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let action = parse_action(&query)?;
    check_access(&state, subject_from(&headers), action, ScopeTarget::Project { id }).await
}

async fn check_resource_access(
    State(state): State<SharedState>,
    Path((realm, name)): Path<(String, String)>,
    headers: HeaderMap,
    Query(query): Query<ActionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let action = parse_action(&query)?;
    let realm: Realm = realm
        .parse()
        .map_err(|e: ScopeError| ApiError::BadRequest(e.to_string()))?;
    let target = ScopeTarget::Resource {
        resource: ResourceRef::new(realm, name),
    };
    check_access(&state, subject_from(&headers), action, target).await
}

async fn check_access(
    state: &SharedState,
    subject: String,
    action: ScopeAction,
    target: ScopeTarget,
) -> Result<Json<AccessResponse>, ApiError> {
    let registry = state.registry.clone();
    let filter = state.filter.clone();
    let response = state
        .db
        .call(move |db| {
            let snapshot = registry.snapshot(db)?;
            let decision = filter.check(&snapshot, &subject, action, &target)?;
            Ok(AccessResponse {
                subject,
                action,
                target,
                decision,
            })
        })
        .await?;
    Ok(Json(response))
}

async fn reload_registry(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let registry = state.registry.clone();
    let projects = state
        .db
        .call(move |db| Ok(registry.reload(db)?.projects().count()))
        .await?;
    Ok(Json(ReloadResponse { projects }))
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::NewProject;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state(required_permission: &str) -> SharedState {
        let db = Db::open_in_memory().unwrap();
        db.grant("alice", "CARDS_ADMIN").unwrap();
        Arc::new(AppState {
            db: DbHandle::new(db),
            registry: Arc::new(ProjectRegistry::new()),
            filter: Arc::new(ScopeFilter::default()),
            rank_policy: RankPolicy::Reject,
            required_permission: required_permission.to_string(),
        })
    }

    fn test_app(state: SharedState) -> Router {
        api_router().with_state(state)
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, user: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header(REMOTE_USER_HEADER, user)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str, user: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(user) = user {
            builder = builder.header(REMOTE_USER_HEADER, user);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn add(app: &Router, stack: &str, title: &str) -> serde_json::Value {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/stacks/{}/cards", stack),
                "alice",
                serde_json::json!({"title": title}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response.into_body()).await
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = test_app(test_state("CARDS_ADMIN"));
        let response = app.oneshot(get_request("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_add_and_list_cards() {
        let app = test_app(test_state("CARDS_ADMIN"));
        let first = add(&app, "todo", "a").await;
        let second = add(&app, "todo", "b").await;
        assert_eq!(first["rank"], 0);
        assert_eq!(second["rank"], 1);

        let response = app
            .oneshot(get_request("/api/stacks/todo/cards", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cards: Vec<serde_json::Value> = body_json(response.into_body()).await;
        let titles: Vec<_> = cards.iter().map(|c| c["title"].as_str().unwrap()).collect();
        assert_eq!(titles, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_move_card_reorders() {
        let app = test_app(test_state("CARDS_ADMIN"));
        add(&app, "todo", "a").await;
        add(&app, "todo", "b").await;
        let c = add(&app, "todo", "c").await;

        let response = app
            .clone()
            .oneshot(json_request(
                "PATCH",
                &format!("/api/cards/{}/move", c["id"]),
                "alice",
                serde_json::json!({"stack": "todo", "rank": 0}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(get_request("/api/stacks/todo/cards", None))
            .await
            .unwrap();
        let cards: Vec<serde_json::Value> = body_json(response.into_body()).await;
        let titles: Vec<_> = cards.iter().map(|c| c["title"].as_str().unwrap()).collect();
        assert_eq!(titles, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_out_of_range_rank_is_bad_request() {
        let app = test_app(test_state("CARDS_ADMIN"));
        let a = add(&app, "todo", "a").await;
        let response = app
            .oneshot(json_request(
                "PATCH",
                &format!("/api/cards/{}/move", a["id"]),
                "alice",
                serde_json::json!({"stack": "todo", "rank": 5}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert!(body["error"].as_str().unwrap().contains("out of range"));
    }

    #[tokio::test]
    async fn test_stale_version_is_conflict() {
        let app = test_app(test_state("CARDS_ADMIN"));
        add(&app, "todo", "a").await;
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/stacks/todo/cards",
                "alice",
                serde_json::json!({"title": "b", "version": 0}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_stack_versions() {
        let app = test_app(test_state("CARDS_ADMIN"));
        add(&app, "todo", "a").await;
        let response = app
            .oneshot(get_request("/api/stacks?names=todo,done", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let stacks: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert_eq!(stacks.len(), 2);
        assert_eq!(stacks[0]["name"], "done");
        assert_eq!(stacks[0]["version"], 0);
        assert_eq!(stacks[1]["version"], 1);
    }

    #[tokio::test]
    async fn test_mutation_without_permission_is_forbidden() {
        let app = test_app(test_state("CARDS_ADMIN"));
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/stacks/todo/cards",
                "mallory",
                serde_json::json!({"title": "x"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_empty_required_permission_disables_gate() {
        let app = test_app(test_state(""));
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/stacks/todo/cards",
                "anonymous",
                serde_json::json!({"title": "x"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_delete_missing_card_is_not_found() {
        let app = test_app(test_state("CARDS_ADMIN"));
        let request = Request::builder()
            .method("DELETE")
            .uri("/api/cards/99")
            .header(REMOTE_USER_HEADER, "alice")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_card_closes_gap() {
        let app = test_app(test_state("CARDS_ADMIN"));
        let a = add(&app, "todo", "a").await;
        add(&app, "todo", "b").await;
        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/api/cards/{}?version=2", a["id"]))
            .header(REMOTE_USER_HEADER, "alice")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(get_request("/api/stacks/todo/cards", None))
            .await
            .unwrap();
        let cards: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0]["rank"], 0);
    }

    #[tokio::test]
    async fn test_access_decisions_follow_membership() {
        let state = test_state("CARDS_ADMIN");
        let project_id = {
            let db = state.db.lock_sync().unwrap();
            let p = db
                .create_project(&NewProject {
                    name: "secret".into(),
                    restricted: true,
                    ..NewProject::default()
                })
                .unwrap();
            db.grant_membership(p.id, "dev").unwrap();
            db.add_group_member("alice", "dev").unwrap();
            db.link_resource(&ResourceRef::new(Realm::Ticket, "7"), p.id)
                .unwrap();
            p.id
        };
        let app = test_app(state);

        let response = app
            .clone()
            .oneshot(get_request(
                &format!("/api/access/project/{}", project_id),
                Some("alice"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["decision"], "allow");

        let response = app
            .clone()
            .oneshot(get_request("/api/access/ticket/7?action=access", None))
            .await
            .unwrap();
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["decision"], "deny");
        assert_eq!(body["subject"], "anonymous");

        let response = app
            .clone()
            .oneshot(get_request("/api/access/wiki/Start", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(get_request("/api/projects", Some("bob")))
            .await
            .unwrap();
        let projects: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert!(projects.is_empty());
    }

    #[tokio::test]
    async fn test_reload_picks_up_new_projects() {
        let state = test_state("CARDS_ADMIN");
        let app = test_app(state.clone());

        let response = app
            .clone()
            .oneshot(get_request("/api/projects", None))
            .await
            .unwrap();
        let projects: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert!(projects.is_empty());

        state
            .db
            .lock_sync()
            .unwrap()
            .create_project(&NewProject::named("open"))
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/registry/reload")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["projects"], 1);

        let response = app
            .oneshot(get_request("/api/projects", None))
            .await
            .unwrap();
        let projects: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert_eq!(projects.len(), 1);
    }
}
