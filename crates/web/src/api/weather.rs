use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use model::{weather::WeatherPoint, WithId};
use serde::Deserialize;
use serde_json::{json, Value};
use utility::id::Id;
use weather::{validator::WeatherPointPayload, RequestError, RequestResult};

use crate::{
    common::{schema, RouteErrorResponse},
    RouteResult, WebState,
};

pub(crate) fn routes(state: WebState) -> Router {
    Router::new()
        .route("/weather/schema", get(schema::<WeatherPoint>))
        .route("/weather", get(get_weather).post(post_weather))
        .route("/erase", delete(erase))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CoordinateQuery {
    lat: Option<String>,
    lon: Option<String>,
}

/// GET /weather — all weather points, or the ones at an exact coordinate.
async fn get_weather(
    State(WebState { weather_service }): State<WebState>,
    Query(params): Query<CoordinateQuery>,
) -> RouteResult<Json<Vec<WithId<WeatherPoint>>>> {
    weather_service
        .list(params.lat.as_deref(), params.lon.as_deref())
        .await
        .map(Json)
        .map_err(RouteErrorResponse::from)
}

/// POST /weather — store one weather point.
async fn post_weather(
    State(WebState { weather_service }): State<WebState>,
    Json(payload): Json<WeatherPointPayload>,
) -> RouteResult<(StatusCode, Json<Value>)> {
    insert_response(weather_service.insert(&payload).await)
}

fn insert_response(
    result: RequestResult<Id<WeatherPoint>>,
) -> RouteResult<(StatusCode, Json<Value>)> {
    match result {
        Ok(_) => Ok((StatusCode::CREATED, Json(json!({ "status": "ok" })))),
        // A store failure on the insert path answers 400 like a conflict,
        // not 500; the transaction was already rolled back.
        Err(RequestError::Store(why)) => {
            log::error!("Storing weather point failed: {}", why);
            Err(RouteErrorResponse::insert_failed())
        }
        Err(why) => Err(why.into()),
    }
}

#[derive(Debug, Deserialize)]
struct EraseQuery {
    start: Option<String>,
    end: Option<String>,
    lat: Option<String>,
    lon: Option<String>,
}

/// DELETE /erase — everything, or a date range at an exact coordinate.
async fn erase(
    State(WebState { weather_service }): State<WebState>,
    Query(params): Query<EraseQuery>,
) -> RouteResult<Json<Value>> {
    weather_service
        .erase(
            params.start.as_deref(),
            params.end.as_deref(),
            params.lat.as_deref(),
            params.lon.as_deref(),
        )
        .await
        .map(|_| Json(json!({ "status": "ok" })))
        .map_err(RouteErrorResponse::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_insert_answers_created_with_ok_status() {
        let (status, Json(body)) = insert_response(Ok(Id::new(1))).unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[test]
    fn insert_store_failure_answers_bad_request_not_server_error() {
        let result = insert_response(Err(RequestError::Store(
            "connection reset".into(),
        )));
        let response = result.unwrap_err();
        assert_eq!(response.status_code, StatusCode::BAD_REQUEST);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "status": "error" })
        );
    }

    #[test]
    fn insert_conflict_answers_bad_request_with_error_status() {
        let response =
            insert_response(Err(RequestError::Conflict)).unwrap_err();
        assert_eq!(response.status_code, StatusCode::BAD_REQUEST);
        assert_eq!(response.status, Some("error"));
    }
}
