use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::{error, instrument};

use super::client::MAX_FORECAST_DAYS;
use super::dto::{Forecast, Location};
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    extract::AppQuery,
    state::AppState,
};

pub fn weather_routes() -> Router<AppState> {
    Router::new()
        .route("/weather/search", get(search))
        .route("/weather/forecast", get(forecast))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    pub lat: f64,
    pub lon: f64,
    #[serde(default = "default_days")]
    pub days: u8,
}
fn default_days() -> u8 {
    3
}

fn upstream(e: anyhow::Error) -> ApiError {
    error!(error = ?e, "weather provider failed");
    ApiError::Upstream("Weather service unavailable".into())
}

#[instrument(skip(state))]
pub async fn search(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    AppQuery(p): AppQuery<SearchQuery>,
) -> ApiResult<Json<Vec<Location>>> {
    let q = p.q.trim();
    if q.len() < 2 {
        return Err(ApiError::bad_request("Query must be at least 2 characters"));
    }
    let locations = state.weather.search(q).await.map_err(upstream)?;
    Ok(Json(locations))
}

#[instrument(skip(state))]
pub async fn forecast(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    AppQuery(p): AppQuery<ForecastQuery>,
) -> ApiResult<Json<Forecast>> {
    if !(-90.0..=90.0).contains(&p.lat) || !(-180.0..=180.0).contains(&p.lon) {
        return Err(ApiError::bad_request("Coordinates out of range"));
    }
    if p.days == 0 || p.days > MAX_FORECAST_DAYS {
        return Err(ApiError::bad_request("days must be between 1 and 10"));
    }
    let f = state
        .weather
        .forecast(p.lat, p.lon, p.days)
        .await
        .map_err(upstream)?;
    Ok(Json(f))
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::{app::build_app, auth::JwtKeys, config::AppConfig, state::AppState};

    async fn get(uri: &str) -> (axum::http::StatusCode, serde_json::Value) {
        let token = JwtKeys::from_config(&AppConfig::for_tests().jwt)
            .sign_access(Uuid::new_v4())
            .unwrap();
        let req = Request::builder()
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let res = build_app(AppState::fake()).oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    #[tokio::test]
    async fn forecast_goes_through_provider() {
        let (status, body) = get("/api/weather/forecast?lat=46.5&lon=7.9").await;
        assert_eq!(status, axum::http::StatusCode::OK);
        assert_eq!(body["current"]["condition"]["text"], "Light snow");
        assert_eq!(body["location"]["lat"], 46.5);
    }

    #[tokio::test]
    async fn bad_inputs_are_rejected_before_the_provider() {
        let (status, _) = get("/api/weather/forecast?lat=123&lon=7.9").await;
        assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
        let (status, _) = get("/api/weather/forecast?lat=46.5&lon=7.9&days=11").await;
        assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
        let (status, body) = get("/api/weather/search?q=a").await;
        assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Query must be at least 2 characters");
    }
}
