use std::collections::HashMap;

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
    dto::{CreatePackRequest, PackQuery, PackResponse, PackSummary, UnitQuery, UpdatePackRequest},
    repo,
};
use crate::{
    auth::{AuthUser, JwtKeys},
    error::{is_unique_violation, ApiError, ApiResult},
    extract::{AppJson, AppPath, AppQuery},
    items::{self, PackItem},
    state::AppState,
    upload::{image_redirect, verify_image_grant},
    weights::{compute_category_summaries, compute_pack_weights},
};

pub fn pack_routes() -> Router<AppState> {
    Router::new()
        .route("/packs", get(list_packs).post(create_pack))
        .route(
            "/packs/:id",
            get(get_pack).put(update_pack).delete(delete_pack),
        )
        .route("/packs/:id/summary", get(pack_summary))
        .route("/packs/:id/image", get(pack_image))
}

fn pack_not_found() -> ApiError {
    ApiError::not_found("Pack not found")
}

#[instrument(skip(state))]
pub async fn list_packs(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppQuery(q): AppQuery<PackQuery>,
) -> ApiResult<Json<Vec<PackResponse>>> {
    let packs = repo::list_by_user(&state.db, user_id, q.updated_since).await?;
    let ids: Vec<Uuid> = packs.iter().map(|p| p.id).collect();
    let mut by_pack: HashMap<Uuid, Vec<PackItem>> = HashMap::new();
    for item in items::repo::list_by_packs(&state.db, &ids).await? {
        by_pack.entry(item.pack_id).or_default().push(item);
    }
    let out = packs
        .into_iter()
        .map(|p| {
            let items = by_pack.remove(&p.id).unwrap_or_default();
            PackResponse::new(p, items, q.unit)
        })
        .collect();
    Ok(Json(out))
}

#[instrument(skip(state, body))]
pub async fn create_pack(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppJson(body): AppJson<CreatePackRequest>,
) -> ApiResult<(StatusCode, Json<PackResponse>)> {
    body.validate()?;
    verify_image_grant(
        &JwtKeys::from_ref(&state),
        user_id,
        body.image.as_deref(),
        body.image_grant.as_deref(),
    )?;
    let pack = repo::insert(&state.db, user_id, &body).await.map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::conflict("Pack already exists")
        } else {
            e.into()
        }
    })?;
    info!(%user_id, pack_id = %pack.id, "pack created");
    Ok((
        StatusCode::CREATED,
        Json(PackResponse::new(pack, Vec::new(), Default::default())),
    ))
}

#[instrument(skip(state))]
pub async fn get_pack(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(pack_id): AppPath<Uuid>,
    AppQuery(q): AppQuery<UnitQuery>,
) -> ApiResult<Json<PackResponse>> {
    let pack = repo::get_visible(&state.db, user_id, pack_id)
        .await?
        .ok_or_else(pack_not_found)?;
    let items = items::repo::list_by_pack(&state.db, pack.id).await?;
    Ok(Json(PackResponse::new(pack, items, q.unit)))
}

#[instrument(skip(state, body))]
pub async fn update_pack(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(pack_id): AppPath<Uuid>,
    AppJson(body): AppJson<UpdatePackRequest>,
) -> ApiResult<Json<PackResponse>> {
    body.validate()?;
    verify_image_grant(
        &JwtKeys::from_ref(&state),
        user_id,
        body.image.as_ref().and_then(|i| i.as_deref()),
        body.image_grant.as_deref(),
    )?;
    let pack = repo::update(&state.db, user_id, pack_id, &body)
        .await?
        .ok_or_else(pack_not_found)?;
    let items = items::repo::list_by_pack(&state.db, pack.id).await?;
    info!(%user_id, %pack_id, "pack updated");
    Ok(Json(PackResponse::new(pack, items, Default::default())))
}

#[instrument(skip(state))]
pub async fn delete_pack(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(pack_id): AppPath<Uuid>,
) -> ApiResult<StatusCode> {
    if !repo::soft_delete(&state.db, user_id, pack_id).await? {
        return Err(pack_not_found());
    }
    info!(%user_id, %pack_id, "pack deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn pack_summary(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(pack_id): AppPath<Uuid>,
    AppQuery(q): AppQuery<UnitQuery>,
) -> ApiResult<Json<PackSummary>> {
    let pack = repo::get_visible(&state.db, user_id, pack_id)
        .await?
        .ok_or_else(pack_not_found)?;
    let items = items::repo::list_by_pack(&state.db, pack.id).await?;
    let weights = compute_pack_weights(&items, q.unit);
    Ok(Json(PackSummary {
        pack_id: pack.id,
        base_weight: weights.base_weight,
        total_weight: weights.total_weight,
        weight_unit: weights.unit,
        categories: compute_category_summaries(&items, q.unit),
    }))
}

/// 302 to a short-lived URL for the pack's image.
#[instrument(skip(state))]
pub async fn pack_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(pack_id): AppPath<Uuid>,
) -> ApiResult<Response> {
    let pack = repo::get_visible(&state.db, user_id, pack_id)
        .await?
        .ok_or_else(pack_not_found)?;
    let Some(key) = pack.image else {
        return Err(ApiError::not_found("Pack has no image"));
    };
    image_redirect(state.storage.as_ref(), &key).await
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::{app::build_app, state::AppState};

    async fn get(uri: &str, auth: Option<&str>) -> (axum::http::StatusCode, serde_json::Value) {
        let app = build_app(AppState::fake());
        let mut req = Request::builder().uri(uri);
        if let Some(a) = auth {
            req = req.header("authorization", a);
        }
        let res = app.oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    #[tokio::test]
    async fn pack_without_token_is_unauthorized() {
        let (status, body) =
            get("/api/packs/8a1c0a5e-3b1f-4a43-9d1e-0f0f3e6f7a10", None).await;
        assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);
        assert_eq!(body.as_object().unwrap().keys().collect::<Vec<_>>(), vec!["error"]);
    }

    #[tokio::test]
    async fn pack_with_garbage_token_is_unauthorized() {
        let (status, body) = get(
            "/api/packs/8a1c0a5e-3b1f-4a43-9d1e-0f0f3e6f7a10",
            Some("Bearer not.a.jwt"),
        )
        .await;
        assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid or expired token");
        assert!(body.get("name").is_none());
    }
}
