use anyhow::Context;
use axum::extract::FromRef;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};

use super::{
    dto::{normalize_email, AuthResponse, PublicUser, RegisterRequest, ResetPasswordRequest},
    jwt::JwtKeys,
    oauth::ExternalIdentity,
    password::{check_password_policy, hash_password, is_valid_email, verify_password},
    repo::NewUser,
    repo_types::{AuthProviderLink, OneTimePassword, OtpPurpose, Provider, RefreshToken, User},
    session::{
        self, check_otp, generate_otp_code, issue_session, OtpCheck, Session, MAX_OTP_ATTEMPTS,
        OTP_TTL,
    },
};
use crate::{
    error::{is_unique_violation, ApiError, ApiResult},
    mailer::{password_reset_email, verification_email},
    state::AppState,
};

fn refresh_ttl(state: &AppState) -> Duration {
    Duration::days(state.config.jwt.refresh_ttl_days)
}

fn auth_response(session: Session, user: User) -> AuthResponse {
    AuthResponse {
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        user: user.into(),
    }
}

fn validate_email(email: &str) -> ApiResult<()> {
    if !is_valid_email(email) {
        warn!(email, "invalid email");
        return Err(ApiError::bad_request("Invalid email"));
    }
    Ok(())
}

fn validate_password(password: &str) -> ApiResult<()> {
    check_password_policy(password).map_err(|reason| {
        warn!(reason, "password rejected by policy");
        ApiError::bad_request(reason)
    })
}

async fn send_code(state: &AppState, user: &User, purpose: OtpPurpose) -> anyhow::Result<()> {
    let code = generate_otp_code();
    OneTimePassword::replace(
        &state.db,
        user.id,
        purpose,
        &code,
        OffsetDateTime::now_utc() + OTP_TTL,
    )
    .await?;
    let (subject, text) = match purpose {
        OtpPurpose::VerifyEmail => verification_email(&code),
        OtpPurpose::ResetPassword => password_reset_email(&code),
    };
    state.mailer.send(&user.email, subject, &text).await
}

fn invalid_code() -> ApiError {
    ApiError::bad_request("Invalid or expired code")
}

/// Checks `code` against the user's outstanding code. Every guess uses up
/// one attempt; the code is burnt once expired or out of attempts.
async fn take_code(
    state: &AppState,
    user: &User,
    purpose: OtpPurpose,
    code: &str,
) -> ApiResult<OneTimePassword> {
    let otp = OneTimePassword::find_current(&state.db, user.id, purpose)
        .await?
        .ok_or_else(invalid_code)?;
    let outcome = check_otp(&otp, code, OffsetDateTime::now_utc());
    if matches!(outcome, OtpCheck::Expired | OtpCheck::Exhausted) {
        OneTimePassword::delete(&state.db, otp.id).await?;
        return Err(invalid_code());
    }

    let Some(used) = OneTimePassword::use_attempt(&state.db, otp.id, MAX_OTP_ATTEMPTS).await? else {
        // Another request spent the last attempt.
        OneTimePassword::delete(&state.db, otp.id).await?;
        return Err(invalid_code());
    };
    if outcome == OtpCheck::Wrong {
        warn!(user_id = %user.id, ?purpose, attempts = used, "wrong one-time code");
        if used >= MAX_OTP_ATTEMPTS {
            OneTimePassword::delete(&state.db, otp.id).await?;
            warn!(user_id = %user.id, ?purpose, "one-time code burnt after too many attempts");
        }
        return Err(invalid_code());
    }
    Ok(otp)
}

pub async fn register(state: &AppState, payload: RegisterRequest) -> ApiResult<PublicUser> {
    let email = normalize_email(&payload.email);
    validate_email(&email)?;
    validate_password(&payload.password)?;

    if User::find_by_email(&state.db, &email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(ApiError::conflict("Email already registered"));
    }

    let hash = hash_password(&payload.password)?;
    let mut tx = state.db.begin().await.context("begin tx")?;
    let user = User::create(
        &mut *tx,
        NewUser {
            email: &email,
            password_hash: Some(&hash),
            first_name: payload.first_name.as_deref(),
            last_name: payload.last_name.as_deref(),
            email_verified: false,
        },
    )
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::conflict("Email already registered")
        } else {
            e.into()
        }
    })?;
    AuthProviderLink::link(&mut *tx, user.id, Provider::Email, &email).await?;
    tx.commit().await.context("commit tx")?;

    if let Err(e) = send_code(state, &user, OtpPurpose::VerifyEmail).await {
        // The account exists; the user can ask for a new code.
        error!(error = ?e, user_id = %user.id, "sending verification code failed");
    }

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user.into())
}

pub async fn verify_email(state: &AppState, email: &str, code: &str) -> ApiResult<AuthResponse> {
    let email = normalize_email(email);
    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(invalid_code)?;
    let otp = take_code(state, &user, OtpPurpose::VerifyEmail, code).await?;

    let keys = JwtKeys::from_ref(state);
    let mut tx = state.db.begin().await.context("begin tx")?;
    User::mark_verified(&mut *tx, user.id).await?;
    OneTimePassword::delete(&mut *tx, otp.id).await?;
    let session = issue_session(&mut *tx, &keys, refresh_ttl(state), user.id, None).await?;
    tx.commit().await.context("commit tx")?;

    info!(user_id = %user.id, "email verified");
    let user = User {
        email_verified: true,
        ..user
    };
    Ok(auth_response(session, user))
}

/// The user a verification code should go to, if any. Unknown and already
/// verified accounts get the same silent answer.
pub fn awaiting_verification(user: Option<User>) -> Option<User> {
    user.filter(|u| !u.email_verified)
}

pub async fn resend_verification(state: &AppState, email: &str) -> ApiResult<()> {
    let email = normalize_email(email);
    match awaiting_verification(User::find_by_email(&state.db, &email).await?) {
        Some(user) => {
            send_code(state, &user, OtpPurpose::VerifyEmail).await?;
            info!(user_id = %user.id, "verification code resent");
        }
        None => info!(email = %email, "resend for unknown or verified email; nothing sent"),
    }
    Ok(())
}

pub async fn login(state: &AppState, email: &str, password: &str) -> ApiResult<AuthResponse> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        warn!(email = %email, "login with malformed email");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let user = User::find_by_email(&state.db, &email).await?.ok_or_else(|| {
        warn!(email = %email, "login unknown email");
        ApiError::unauthorized("Invalid credentials")
    })?;

    let Some(hash) = user.password_hash.as_deref() else {
        warn!(user_id = %user.id, "password login on oauth-only account");
        return Err(ApiError::unauthorized("Invalid credentials"));
    };
    if !verify_password(password, hash)? {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }
    if !user.email_verified {
        return Err(ApiError::forbidden("Please verify your email before signing in"));
    }

    let keys = JwtKeys::from_ref(state);
    let session = issue_session(&state.db, &keys, refresh_ttl(state), user.id, None).await?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(auth_response(session, user))
}

pub async fn refresh(state: &AppState, refresh_token: &str) -> ApiResult<AuthResponse> {
    let keys = JwtKeys::from_ref(state);
    let (user_id, session) = session::rotate(&state.db, &keys, refresh_ttl(state), refresh_token).await?;
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;
    Ok(auth_response(session, user))
}

pub async fn logout(state: &AppState, refresh_token: &str) -> ApiResult<()> {
    if RefreshToken::revoke(&state.db, refresh_token, None).await? {
        info!("refresh token revoked on logout");
    }
    Ok(())
}

pub async fn forgot_password(state: &AppState, email: &str) -> ApiResult<()> {
    let email = normalize_email(email);
    match User::find_by_email(&state.db, &email).await? {
        Some(user) => {
            send_code(state, &user, OtpPurpose::ResetPassword).await?;
            info!(user_id = %user.id, "password reset code sent");
        }
        None => warn!(email = %email, "password reset for unknown email"),
    }
    Ok(())
}

pub async fn reset_password(state: &AppState, payload: ResetPasswordRequest) -> ApiResult<()> {
    let email = normalize_email(&payload.email);
    validate_password(&payload.new_password)?;
    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(invalid_code)?;
    let otp = take_code(state, &user, OtpPurpose::ResetPassword, &payload.code).await?;

    let hash = hash_password(&payload.new_password)?;
    let mut tx = state.db.begin().await.context("begin tx")?;
    User::set_password(&mut *tx, user.id, &hash).await?;
    OneTimePassword::delete(&mut *tx, otp.id).await?;
    let revoked = RefreshToken::revoke_all_for_user(&mut *tx, user.id).await?;
    tx.commit().await.context("commit tx")?;

    info!(user_id = %user.id, revoked, "password reset");
    Ok(())
}

/// Whether `user` may be linked to `identity`. `existing` is the user's
/// current link for the same provider, if any.
pub fn check_provider_link(
    existing: Option<&AuthProviderLink>,
    identity: &ExternalIdentity,
) -> ApiResult<bool> {
    match existing {
        None => Ok(true),
        Some(link) if link.provider_id == identity.provider_id => Ok(false),
        Some(_) => Err(ApiError::conflict(
            "This account is already linked to a different provider identity",
        )),
    }
}

/// The provider's email, normalized, when it may be used to find or create
/// an account. An address the provider has not verified proves nothing.
pub fn trusted_email(identity: &ExternalIdentity) -> ApiResult<String> {
    let email = identity
        .email
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("Provider did not share an email address"))?;
    if !identity.email_verified {
        warn!(provider = ?identity.provider, "provider email not verified");
        return Err(ApiError::unauthorized("Provider email is not verified"));
    }
    Ok(normalize_email(email))
}

pub async fn oauth_sign_in(state: &AppState, identity: ExternalIdentity) -> ApiResult<AuthResponse> {
    let mut tx = state.db.begin().await.context("begin tx")?;

    let user = match AuthProviderLink::find(&mut *tx, identity.provider, &identity.provider_id).await? {
        Some(link) => User::find_by_id(&mut *tx, link.user_id)
            .await?
            .context("auth provider points at a missing user")?,
        None => {
            let email = trusted_email(&identity)?;
            match User::find_by_email(&mut *tx, &email).await? {
                Some(user) => {
                    let existing =
                        AuthProviderLink::find_for_user(&mut *tx, user.id, identity.provider).await?;
                    if check_provider_link(existing.as_ref(), &identity)? {
                        AuthProviderLink::link(&mut *tx, user.id, identity.provider, &identity.provider_id)
                            .await?;
                        info!(user_id = %user.id, provider = ?identity.provider, "provider linked");
                    }
                    if !user.email_verified {
                        User::mark_verified(&mut *tx, user.id).await?;
                    }
                    user
                }
                None => {
                    let user = User::create(
                        &mut *tx,
                        NewUser {
                            email: &email,
                            password_hash: None,
                            first_name: identity.first_name.as_deref(),
                            last_name: identity.last_name.as_deref(),
                            email_verified: true,
                        },
                    )
                    .await?;
                    AuthProviderLink::link(&mut *tx, user.id, identity.provider, &identity.provider_id)
                        .await?;
                    info!(user_id = %user.id, provider = ?identity.provider, "user created from provider");
                    user
                }
            }
        }
    };

    let keys = JwtKeys::from_ref(state);
    let session = issue_session(&mut *tx, &keys, refresh_ttl(state), user.id, None).await?;
    tx.commit().await.context("commit tx")?;
    info!(user_id = %user.id, provider = ?identity.provider, "oauth sign-in");
    Ok(auth_response(session, user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn identity(provider_id: &str) -> ExternalIdentity {
        ExternalIdentity {
            provider: Provider::Google,
            provider_id: provider_id.into(),
            email: Some("hiker@example.com".into()),
            email_verified: true,
            first_name: None,
            last_name: None,
        }
    }

    fn link(provider_id: &str) -> AuthProviderLink {
        AuthProviderLink {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            provider: Provider::Google,
            provider_id: provider_id.into(),
        }
    }

    fn user(verified: bool) -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            email: "hiker@example.com".into(),
            password_hash: None,
            first_name: None,
            last_name: None,
            email_verified: verified,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn only_provider_verified_email_is_trusted() {
        let mut id = identity("g-1");
        id.email = Some("  Hiker@Example.com ".into());
        assert_eq!(trusted_email(&id).unwrap(), "hiker@example.com");

        id.email_verified = false;
        let err = trusted_email(&id).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);

        id.email = None;
        let err = trusted_email(&id).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn resend_is_silent_for_verified_accounts() {
        assert!(awaiting_verification(None).is_none());
        assert!(awaiting_verification(Some(user(true))).is_none());
        assert!(awaiting_verification(Some(user(false))).is_some());
    }

    #[test]
    fn linking_rules() {
        assert!(check_provider_link(None, &identity("g-1")).unwrap());
        assert!(!check_provider_link(Some(&link("g-1")), &identity("g-1")).unwrap());
        let err = check_provider_link(Some(&link("g-2")), &identity("g-1")).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);
    }
}
