use axum::{
    extract::{FromRef, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::{object_key, PRESIGN_TTL_SECS};
use crate::{
    auth::{AuthUser, JwtKeys},
    error::{ApiError, ApiResult},
    extract::AppQuery,
    state::AppState,
};

const ALLOWED_CONTENT_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/heic"];

pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/upload/presigned", get(presigned_upload))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignQuery {
    pub file_name: String,
    pub content_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUpload {
    pub url: String,
    pub object_key: String,
    pub grant: String,
    pub expires_in: u64,
}

#[instrument(skip(state))]
pub async fn presigned_upload(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppQuery(q): AppQuery<PresignQuery>,
) -> ApiResult<Json<PresignedUpload>> {
    if q.file_name.trim().is_empty() {
        return Err(ApiError::bad_request("fileName is required"));
    }
    if !ALLOWED_CONTENT_TYPES.contains(&q.content_type.as_str()) {
        return Err(ApiError::bad_request("Unsupported content type"));
    }

    let key = object_key(user_id, &q.file_name);
    let url = state
        .storage
        .presign_put(&key, &q.content_type, PRESIGN_TTL_SECS)
        .await?;
    let grant = JwtKeys::from_ref(&state).sign_upload_grant(user_id, &key)?;

    info!(%user_id, object_key = %key, "upload presigned");
    Ok(Json(PresignedUpload {
        url,
        object_key: key,
        grant,
        expires_in: PRESIGN_TTL_SECS,
    }))
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::{app::build_app, config::AppConfig};

    async fn presign(uri: &str, user: Uuid) -> (axum::http::StatusCode, serde_json::Value) {
        let token = JwtKeys::from_config(&AppConfig::for_tests().jwt)
            .sign_access(user)
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
    async fn issues_url_key_and_grant() {
        let user = Uuid::new_v4();
        let (status, body) = presign(
            "/api/upload/presigned?fileName=my%20tent.jpg&contentType=image/jpeg",
            user,
        )
        .await;
        assert_eq!(status, axum::http::StatusCode::OK);

        let key = body["objectKey"].as_str().unwrap();
        assert!(key.starts_with(&format!("{user}/")));
        assert!(key.ends_with("-my_tent.jpg"));
        assert!(body["url"].as_str().unwrap().starts_with("https://fake.local/"));

        let keys = JwtKeys::from_config(&AppConfig::for_tests().jwt);
        let grant = body["grant"].as_str().unwrap();
        assert!(keys.verify_upload_grant(grant, user, key).is_ok());
    }

    #[tokio::test]
    async fn rejects_non_image_content() {
        let (status, body) = presign(
            "/api/upload/presigned?fileName=notes.pdf&contentType=application/pdf",
            Uuid::new_v4(),
        )
        .await;
        assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unsupported content type");
    }
}
