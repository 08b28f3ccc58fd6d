use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{ChangesQuery, CreateItemRequest, UpdateItemRequest},
    repo,
    repo_types::PackItem,
};
use crate::{
    auth::{AuthUser, JwtKeys},
    error::{is_foreign_key_violation, is_unique_violation, ApiError, ApiResult},
    extract::{AppJson, AppPath, AppQuery},
    state::AppState,
    upload::{image_redirect, verify_image_grant},
};

pub fn item_routes() -> Router<AppState> {
    Router::new()
        .route("/packs/:id/items", get(list_pack_items).post(create_item))
        .route("/items", get(list_changed_items))
        .route(
            "/items/:item_id",
            get(get_item).patch(update_item).delete(delete_item),
        )
        .route("/items/:item_id/image", get(item_image))
}

fn item_not_found() -> ApiError {
    ApiError::not_found("Item not found")
}

fn item_write_error(e: anyhow::Error) -> ApiError {
    if is_unique_violation(&e) {
        ApiError::conflict("Item already exists")
    } else if is_foreign_key_violation(&e) {
        ApiError::bad_request("Unknown catalog item")
    } else {
        e.into()
    }
}

#[instrument(skip(state))]
pub async fn list_pack_items(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(pack_id): AppPath<Uuid>,
) -> ApiResult<Json<Vec<PackItem>>> {
    if !repo::owns_pack(&state.db, user_id, pack_id).await? {
        return Err(ApiError::not_found("Pack not found"));
    }
    Ok(Json(repo::list_by_pack(&state.db, pack_id).await?))
}

/// Sync pull: every item of the caller changed after `updatedSince`.
#[instrument(skip(state))]
pub async fn list_changed_items(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppQuery(q): AppQuery<ChangesQuery>,
) -> ApiResult<Json<Vec<PackItem>>> {
    Ok(Json(
        repo::list_for_user(&state.db, user_id, q.updated_since).await?,
    ))
}

#[instrument(skip(state, body))]
pub async fn create_item(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(pack_id): AppPath<Uuid>,
    AppJson(body): AppJson<CreateItemRequest>,
) -> ApiResult<(StatusCode, Json<PackItem>)> {
    body.validate()?;
    verify_image_grant(
        &JwtKeys::from_ref(&state),
        user_id,
        body.image.as_deref(),
        body.image_grant.as_deref(),
    )?;
    if !repo::owns_pack(&state.db, user_id, pack_id).await? {
        return Err(ApiError::not_found("Pack not found"));
    }

    let item = repo::insert(&state.db, user_id, pack_id, &body)
        .await
        .map_err(item_write_error)?;
    info!(%user_id, %pack_id, item_id = %item.id, "item created");
    Ok((StatusCode::CREATED, Json(item)))
}

#[instrument(skip(state))]
pub async fn get_item(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(item_id): AppPath<Uuid>,
) -> ApiResult<Json<PackItem>> {
    repo::get(&state.db, user_id, item_id)
        .await?
        .map(Json)
        .ok_or_else(item_not_found)
}

#[instrument(skip(state, body))]
pub async fn update_item(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(item_id): AppPath<Uuid>,
    AppJson(body): AppJson<UpdateItemRequest>,
) -> ApiResult<Json<PackItem>> {
    body.validate()?;
    verify_image_grant(
        &JwtKeys::from_ref(&state),
        user_id,
        body.image.as_ref().and_then(|i| i.as_deref()),
        body.image_grant.as_deref(),
    )?;
    let item = repo::update(&state.db, user_id, item_id, &body)
        .await
        .map_err(item_write_error)?
        .ok_or_else(item_not_found)?;
    info!(%user_id, %item_id, "item updated");
    Ok(Json(item))
}

#[instrument(skip(state))]
pub async fn delete_item(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(item_id): AppPath<Uuid>,
) -> ApiResult<StatusCode> {
    if !repo::soft_delete(&state.db, user_id, item_id).await? {
        return Err(item_not_found());
    }
    info!(%user_id, %item_id, "item deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// 302 to a short-lived URL for the item's image.
#[instrument(skip(state))]
pub async fn item_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(item_id): AppPath<Uuid>,
) -> ApiResult<Response> {
    let item = repo::get(&state.db, user_id, item_id)
        .await?
        .ok_or_else(item_not_found)?;
    let Some(key) = item.image else {
        return Err(ApiError::not_found("Item has no image"));
    };
    image_redirect(state.storage.as_ref(), &key).await
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use sqlx::error::{DatabaseError, ErrorKind};
    use tower::ServiceExt;

    use super::*;
    use crate::app::build_app;

    #[derive(Debug)]
    struct ConstraintError {
        foreign_key: bool,
    }

    impl fmt::Display for ConstraintError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("constraint violated")
        }
    }

    impl std::error::Error for ConstraintError {}

    impl DatabaseError for ConstraintError {
        fn message(&self) -> &str {
            "constraint violated"
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            if self.foreign_key {
                ErrorKind::ForeignKeyViolation
            } else {
                ErrorKind::UniqueViolation
            }
        }
    }

    fn db_error(foreign_key: bool) -> anyhow::Error {
        anyhow::Error::new(sqlx::Error::Database(Box::new(ConstraintError { foreign_key })))
            .context("insert item")
    }

    #[test]
    fn unknown_catalog_item_is_a_bad_request() {
        let err = item_write_error(db_error(true));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Unknown catalog item");

        let dup = item_write_error(db_error(false));
        assert_eq!(dup.status(), StatusCode::CONFLICT);

        let other = item_write_error(anyhow::anyhow!("pool timed out"));
        assert_eq!(other.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn malformed_item_id_is_a_json_bad_request() {
        let keys = JwtKeys::from_ref(&AppState::fake());
        let token = keys.sign_access(uuid::Uuid::new_v4()).unwrap();
        let res = build_app(AppState::fake())
            .oneshot(
                Request::builder()
                    .uri("/api/items/not-a-uuid")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].is_string());
    }
}
