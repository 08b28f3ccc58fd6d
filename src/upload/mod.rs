pub mod handlers;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use uuid::Uuid;

use crate::auth::JwtKeys;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::storage::StorageClient;

pub const PRESIGN_TTL_SECS: u64 = 15 * 60;
const MAX_FILE_NAME: usize = 100;

pub fn router() -> Router<AppState> {
    handlers::upload_routes()
}

/// Keeps letters, digits, `.`, `-` and `_`; everything else becomes `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(&['/', '\\'][..]).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

pub fn object_key(user_id: Uuid, file_name: &str) -> String {
    format!("{}/{}-{}", user_id, Uuid::new_v4(), sanitize_file_name(file_name))
}

/// 302 to a short-lived presigned GET of `key`.
pub async fn image_redirect(storage: &dyn StorageClient, key: &str) -> ApiResult<Response> {
    let url = storage.presign_get(key, PRESIGN_TTL_SECS).await.map_err(|e| {
        tracing::warn!(error = %e, key, "presign failed");
        e
    })?;
    Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response())
}

/// An image reference may only be attached with the grant issued alongside
/// its presigned upload URL.
pub fn verify_image_grant(
    keys: &JwtKeys,
    user_id: Uuid,
    image: Option<&str>,
    grant: Option<&str>,
) -> ApiResult<()> {
    let Some(image) = image else {
        return Ok(());
    };
    let grant = grant.ok_or_else(|| ApiError::forbidden("imageGrant is required to attach an image"))?;
    keys.verify_upload_grant(grant, user_id, image).map_err(|e| {
        tracing::warn!(%user_id, error = %e, "rejected upload grant");
        ApiError::forbidden("Image does not belong to you")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("tent photo.JPG"), "tent_photo.JPG");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("..."), "upload");
        assert_eq!(sanitize_file_name(""), "upload");
    }

    #[test]
    fn keys_are_scoped_to_the_user() {
        let user = Uuid::new_v4();
        let key = object_key(user, "stove.png");
        assert!(key.starts_with(&format!("{user}/")));
        assert!(key.ends_with("-stove.png"));
    }

    #[tokio::test]
    async fn image_redirect_is_a_302_to_the_presigned_url() {
        let state = AppState::fake();
        let res = image_redirect(state.storage.as_ref(), "u1/abc-tent.jpg").await.unwrap();
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(
            res.headers()[header::LOCATION],
            "https://fake.local/u1/abc-tent.jpg"
        );
    }

    #[test]
    fn image_requires_matching_grant() {
        let keys = JwtKeys::from_config(&AppConfig::for_tests().jwt);
        let owner = Uuid::new_v4();
        let key = object_key(owner, "pack.jpg");
        let grant = keys.sign_upload_grant(owner, &key).unwrap();

        assert!(verify_image_grant(&keys, owner, None, None).is_ok());
        assert!(verify_image_grant(&keys, owner, Some(&key), Some(&grant)).is_ok());

        let missing = verify_image_grant(&keys, owner, Some(&key), None).unwrap_err();
        assert_eq!(missing.status(), axum::http::StatusCode::FORBIDDEN);

        let stolen = verify_image_grant(&keys, Uuid::new_v4(), Some(&key), Some(&grant)).unwrap_err();
        assert_eq!(stolen.status(), axum::http::StatusCode::FORBIDDEN);
    }
}
