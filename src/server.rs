// server.rs
//
// HTTP request surface: a single query endpoint returning the assembled
// graph JSON, plus a health check. Every request independently reloads
// and recomputes the full graph — the filtering parameters vary per
// request and there is no shared cache. Any failure, including bad
// numeric parameters, is returned as a structured error payload with an
// empty graph rather than a bare transport fault.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::warn;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::graph_build::build_graph_for_mode;
use crate::models::{FilterParams, Mode};

#[derive(Clone)]
pub struct AppState {
    data_dir: PathBuf,
}

pub fn build_router(data_dir: PathBuf) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/graph", get(api_graph))
        .route("/api/health", get(api_health))
        .layer(cors)
        .with_state(AppState { data_dir })
}

async fn api_health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

fn int_param(params: &HashMap<String, String>, key: &str, default: i64) -> Result<i64> {
    match params.get(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid integer for '{}': '{}'", key, raw)),
        None => Ok(default),
    }
}

/// Parse the query string into (mode, filter params). Unknown modes fall
/// back to `full`; malformed integers are an error the caller turns into
/// the structured error payload.
pub fn parse_params(params: &HashMap<String, String>) -> Result<(Mode, FilterParams)> {
    let mode = params
        .get("mode")
        .map(|m| Mode::from_str_lenient(m))
        .unwrap_or(Mode::Full);

    let defaults = FilterParams::default();
    let filter = FilterParams {
        org_min_degree: int_param(params, "org_min_degree", defaults.org_min_degree)?,
        actor_min_degree: int_param(params, "actor_min_degree", defaults.actor_min_degree)?,
        bipartite_k_core: int_param(params, "bipartite_k_core", defaults.bipartite_k_core)?,
        min_edge_weight: int_param(params, "min_edge_weight", defaults.min_edge_weight)?,
        keep_isolates: params
            .get("keep_isolates")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(defaults.keep_isolates),
    };
    Ok((mode, filter))
}

fn error_response(err: anyhow::Error) -> Response {
    warn!("Graph request failed: {:#}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": format!("{:#}", err),
            "nodes": [],
            "links": [],
        })),
    )
        .into_response()
}

async fn api_graph(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let (mode, filter) = match parse_params(&params) {
        Ok(parsed) => parsed,
        Err(err) => return error_response(err),
    };

    // The build is sync file I/O plus pure compute; keep it off the
    // async executor.
    let data_dir = state.data_dir.clone();
    let built =
        tokio::task::spawn_blocking(move || build_graph_for_mode(mode, &filter, &data_dir)).await;

    match built {
        Ok(Ok(graph)) => Json(graph).into_response(),
        Ok(Err(err)) => error_response(err),
        Err(err) => error_response(anyhow::anyhow!("Graph build task panicked: {}", err)),
    }
}
