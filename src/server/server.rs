use anyhow::Result;
use std::{sync::Arc, time::Duration};

use tower_http::services::ServeDir;
use tracing::{error, info};

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::api_error::ApiError;
use super::{http_cache, log_requests, metrics, state::*, ServerConfig};
use crate::catalog_store::{
    CatalogError, CatalogResult, ItemUpdate, NewItem, NewSuggestion, PageRequest,
    SuggestionStatus,
};
use crate::ranking::RankingEngine;

type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub version: String,
    pub ranked_slots_occupied: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Deserialize, Debug)]
struct ListItemsQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Deserialize, Debug)]
struct ListSuggestionsQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Deserialize, Debug)]
struct ClaimRankBody {
    pub rank: i64,
}

#[derive(Deserialize, Debug)]
struct ApproveBody {
    pub reviewer_id: String,
    #[serde(default)]
    pub rank: Option<i64>,
}

#[derive(Deserialize, Debug)]
struct RejectBody {
    pub reviewer_id: String,
}

/// Run a write on the blocking pool: writes hold the SQLite write lock and
/// may sleep between conflict retries.
async fn run_blocking<T, F>(work: F) -> ApiResult<T>
where
    F: FnOnce() -> CatalogResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => {
            error!("Blocking catalog task failed: {}", e);
            Err(ApiError::internal("catalog task failed"))
        }
    }
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let ranked_slots_occupied = state
        .ranking_engine
        .current_ranked_set()
        .map(|ranked| ranked.len())
        .unwrap_or_default();
    Json(ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ranked_slots_occupied,
    })
}

async fn get_top5(State(engine): State<GuardedRankingEngine>) -> ApiResult<impl IntoResponse> {
    Ok(Json(engine.current_ranked_set()?))
}

async fn list_items(
    State(items): State<GuardedItemManager>,
    query: Result<Query<ListItemsQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let page = PageRequest::new(query.page, query.per_page);
    Ok(Json(items.list_unranked(page)?))
}

async fn get_item(
    State(items): State<GuardedItemManager>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(items.get_item(&id)?))
}

async fn post_item(
    State(items): State<GuardedItemManager>,
    body: Result<Json<NewItem>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(new_item) = body?;
    let item = run_blocking(move || items.create_item(new_item)).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn put_item(
    State(items): State<GuardedItemManager>,
    Path(id): Path<String>,
    body: Result<Json<ItemUpdate>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(update) = body?;
    let item = run_blocking(move || items.update_item(&id, update)).await?;
    Ok(Json(item))
}

async fn delete_item(
    State(items): State<GuardedItemManager>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    run_blocking(move || items.delete_item(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn put_item_rank(
    State(engine): State<GuardedRankingEngine>,
    Path(id): Path<String>,
    body: Result<Json<ClaimRankBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(ClaimRankBody { rank }) = body?;
    let item = run_blocking(move || engine.claim_rank(rank, &id)).await?;
    Ok(Json(item))
}

async fn delete_item_rank(
    State(engine): State<GuardedRankingEngine>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let item = run_blocking(move || engine.release_rank(&id)).await?;
    Ok(Json(item))
}

async fn post_suggestion(
    State(moderation): State<GuardedModerationManager>,
    body: Result<Json<NewSuggestion>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(new_suggestion) = body?;
    let suggestion = run_blocking(move || moderation.submit(new_suggestion)).await?;
    Ok((StatusCode::CREATED, Json(suggestion)))
}

async fn list_suggestions(
    State(moderation): State<GuardedModerationManager>,
    query: Result<Query<ListSuggestionsQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(SuggestionStatus::from_str(raw).ok_or_else(|| {
            CatalogError::InvalidInput {
                field: "status",
                reason: format!("unknown status '{}'", raw),
            }
        })?),
    };
    Ok(Json(moderation.list(status, query.limit)?))
}

async fn get_suggestion(
    State(moderation): State<GuardedModerationManager>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(moderation.get(&id)?))
}

async fn approve_suggestion(
    State(moderation): State<GuardedModerationManager>,
    Path(id): Path<String>,
    body: Result<Json<ApproveBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let approval =
        run_blocking(move || moderation.approve(&id, &body.reviewer_id, body.rank)).await?;
    Ok(Json(approval))
}

async fn reject_suggestion(
    State(moderation): State<GuardedModerationManager>,
    Path(id): Path<String>,
    body: Result<Json<RejectBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let suggestion = run_blocking(move || moderation.reject(&id, &body.reviewer_id)).await?;
    Ok(Json(suggestion))
}

pub fn make_app(config: ServerConfig, ranking_engine: Arc<RankingEngine>) -> Router {
    let state = ServerState::new(config.clone(), ranking_engine);

    let top5_routes: Router = Router::new()
        .route("/items/top5", get(get_top5))
        .layer(middleware::from_fn_with_state(
            config.content_cache_age_sec,
            http_cache,
        ))
        .with_state(state.clone());

    let item_routes: Router = Router::new()
        .route("/items", get(list_items).post(post_item))
        .route(
            "/items/{id}",
            get(get_item).put(put_item).delete(delete_item),
        )
        .route("/items/{id}/rank", put(put_item_rank).delete(delete_item_rank))
        .with_state(state.clone());

    let suggestion_routes: Router = Router::new()
        .route("/suggestions", get(list_suggestions).post(post_suggestion))
        .route("/suggestions/{id}", get(get_suggestion))
        .route("/suggestions/{id}/approve", post(approve_suggestion))
        .route("/suggestions/{id}/reject", post(reject_suggestion))
        .with_state(state.clone());

    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    let v1_routes = top5_routes.merge(item_routes).merge(suggestion_routes);

    home_router
        .nest("/v1", v1_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

pub fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics::metrics_handler))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

pub async fn run_server(config: ServerConfig, ranking_engine: Arc<RankingEngine>) -> Result<()> {
    let port = config.port;
    let metrics_port = config.metrics_port;
    let app = make_app(config, ranking_engine);

    let metrics_listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", metrics_port)).await?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, make_metrics_app()).await {
            error!("Metrics server stopped: {}", e);
        }
    });

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("Ready to serve at port {}!", port);
    info!("Metrics available at port {}!", metrics_port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
