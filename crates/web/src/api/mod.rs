use axum::{
    response::IntoResponse,
    routing::{get, on},
    Json, Router,
};
use serde_json::json;

pub mod weather;

use crate::{
    common::{route_not_found, METHOD_FILTER_ALL},
    WebState,
};

pub fn routes(state: WebState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .merge(weather::routes(state))
        .fallback_service(on(METHOD_FILTER_ALL, route_not_found))
}

async fn ping() -> impl IntoResponse {
    Json(json!({
        "message": "pong!"
    }))
}
