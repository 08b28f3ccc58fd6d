use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, instrument, warn};

use super::{
    dto::{
        AppleSignInRequest, AuthResponse, EmailRequest, GoogleSignInRequest, LoginRequest,
        MessageResponse, PublicUser, RefreshRequest, RegisterRequest, ResetPasswordRequest,
        VerifyEmailRequest,
    },
    jwt::AuthUser,
    repo_types::{Provider, User},
    services,
};
use crate::{
    error::{ApiError, ApiResult},
    extract::AppJson,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/resend-verification", post(resend_verification))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/google", post(google_sign_in))
        .route("/auth/apple", post(apple_sign_in))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(me))
}

fn message(text: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: text.to_string(),
        user: None,
    })
}

#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let user = services::register(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Registered. Check your email for a verification code.".into(),
            user: Some(user),
        }),
    ))
}

#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn verify_email(
    State(state): State<AppState>,
    AppJson(payload): AppJson<VerifyEmailRequest>,
) -> ApiResult<Json<AuthResponse>> {
    Ok(Json(services::verify_email(&state, &payload.email, &payload.code).await?))
}

#[instrument(skip(state, payload))]
pub async fn resend_verification(
    State(state): State<AppState>,
    AppJson(payload): AppJson<EmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    services::resend_verification(&state, &payload.email).await?;
    Ok(message("If the account exists, a new code has been sent."))
}

#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    Ok(Json(services::login(&state, &payload.email, &payload.password).await?))
}

#[instrument(skip_all)]
pub async fn refresh(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RefreshRequest>,
) -> ApiResult<Json<AuthResponse>> {
    Ok(Json(services::refresh(&state, &payload.refresh_token).await?))
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RefreshRequest>,
) -> ApiResult<Json<MessageResponse>> {
    services::logout(&state, &payload.refresh_token).await?;
    Ok(message("Logged out"))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<EmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    services::forgot_password(&state, &payload.email).await?;
    Ok(message("If the account exists, a reset code has been sent."))
}

#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn reset_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    services::reset_password(&state, payload).await?;
    Ok(message("Password updated. Please sign in again."))
}

async fn external_sign_in(state: &AppState, provider: Provider, token: &str) -> ApiResult<AuthResponse> {
    if token.trim().is_empty() {
        return Err(ApiError::bad_request("Identity token is required"));
    }
    let identity = state.identity.verify(provider, token).await.map_err(|e| {
        warn!(error = %e, provider = ?provider, "identity token rejected");
        ApiError::unauthorized("Invalid identity token")
    })?;
    services::oauth_sign_in(state, identity).await
}

#[instrument(skip_all)]
pub async fn google_sign_in(
    State(state): State<AppState>,
    AppJson(payload): AppJson<GoogleSignInRequest>,
) -> ApiResult<Json<AuthResponse>> {
    Ok(Json(external_sign_in(&state, Provider::Google, &payload.id_token).await?))
}

#[instrument(skip_all)]
pub async fn apple_sign_in(
    State(state): State<AppState>,
    AppJson(payload): AppJson<AppleSignInRequest>,
) -> ApiResult<Json<AuthResponse>> {
    Ok(Json(
        external_sign_in(&state, Provider::Apple, &payload.identity_token).await?,
    ))
}

#[instrument(skip(state))]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<PublicUser>> {
    let user = User::find_by_id(&state.db, user_id).await?.ok_or_else(|| {
        error!(user_id = %user_id, "user not found");
        ApiError::unauthorized("User not found")
    })?;
    Ok(Json(user.into()))
}
