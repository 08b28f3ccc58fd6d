use anyhow::Context;
use rand::{distributions::Alphanumeric, Rng};
use sqlx::{PgExecutor, PgPool};
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    jwt::JwtKeys,
    repo_types::{OneTimePassword, RefreshToken},
};
use crate::error::{ApiError, ApiResult};

const REFRESH_TOKEN_LEN: usize = 64;
const OTP_DIGITS: u32 = 5;
pub const OTP_TTL: Duration = Duration::minutes(10);
/// Guesses allowed per code before it is burnt.
pub const MAX_OTP_ATTEMPTS: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpCheck {
    Valid,
    Wrong,
    Expired,
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
}

pub fn generate_refresh_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Numeric code mailed to the user, zero-padded to a fixed width.
pub fn generate_otp_code() -> String {
    let upper = 10u32.pow(OTP_DIGITS);
    let n = rand::thread_rng().gen_range(0..upper);
    format!("{:0width$}", n, width = OTP_DIGITS as usize)
}

pub fn check_otp(otp: &OneTimePassword, presented: &str, now: OffsetDateTime) -> OtpCheck {
    if otp.expires_at <= now {
        OtpCheck::Expired
    } else if otp.attempts >= MAX_OTP_ATTEMPTS {
        OtpCheck::Exhausted
    } else if otp.code != presented.trim() {
        OtpCheck::Wrong
    } else {
        OtpCheck::Valid
    }
}

/// A refresh token may be used once, before it expires.
pub fn check_refresh_token(row: &RefreshToken, now: OffsetDateTime) -> ApiResult<()> {
    if row.revoked_at.is_some() {
        warn!(user_id = %row.user_id, "revoked refresh token presented");
        return Err(ApiError::unauthorized("Refresh token has been revoked"));
    }
    if row.expires_at <= now {
        return Err(ApiError::unauthorized("Refresh token has expired"));
    }
    Ok(())
}

/// Signs an access token and stores a fresh refresh token for `user_id`.
pub async fn issue_session(
    db: impl PgExecutor<'_>,
    keys: &JwtKeys,
    refresh_ttl: Duration,
    user_id: Uuid,
    device: Option<&str>,
) -> anyhow::Result<Session> {
    let access_token = keys.sign_access(user_id)?;
    let refresh_token = generate_refresh_token();
    let expires_at = OffsetDateTime::now_utc() + refresh_ttl;
    RefreshToken::insert(db, user_id, &refresh_token, expires_at, device).await?;
    Ok(Session {
        access_token,
        refresh_token,
    })
}

/// Revokes `presented` and chains it to a newly issued session.
pub async fn rotate(
    db: &PgPool,
    keys: &JwtKeys,
    refresh_ttl: Duration,
    presented: &str,
) -> ApiResult<(Uuid, Session)> {
    let mut tx = db.begin().await.context("begin tx")?;
    let row = RefreshToken::find_for_update(&mut *tx, presented)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;
    check_refresh_token(&row, OffsetDateTime::now_utc())?;

    let session = issue_session(&mut *tx, keys, refresh_ttl, row.user_id, row.device.as_deref()).await?;
    RefreshToken::revoke(&mut *tx, presented, Some(&session.refresh_token)).await?;
    tx.commit().await.context("commit tx")?;

    info!(user_id = %row.user_id, "refresh token rotated");
    Ok((row.user_id, session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::OtpPurpose;

    fn token_row(expires_in: Duration, revoked: bool) -> RefreshToken {
        let now = OffsetDateTime::now_utc();
        RefreshToken {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token: generate_refresh_token(),
            expires_at: now + expires_in,
            revoked_at: revoked.then_some(now),
            replaced_by_token: revoked.then(generate_refresh_token),
            device: None,
            created_at: now,
        }
    }

    #[test]
    fn revoked_token_is_unauthorized() {
        let row = token_row(Duration::days(30), true);
        let err = check_refresh_token(&row, OffsetDateTime::now_utc()).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let row = token_row(Duration::seconds(-1), false);
        let err = check_refresh_token(&row, OffsetDateTime::now_utc()).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn live_token_passes() {
        let row = token_row(Duration::days(30), false);
        assert!(check_refresh_token(&row, OffsetDateTime::now_utc()).is_ok());
    }

    fn otp(code: &str, expires_in: Duration, attempts: i32) -> OneTimePassword {
        OneTimePassword {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            code: code.into(),
            purpose: OtpPurpose::ResetPassword,
            expires_at: OffsetDateTime::now_utc() + expires_in,
            attempts,
        }
    }

    #[test]
    fn otp_checks() {
        let now = OffsetDateTime::now_utc();
        let live = otp("04217", Duration::minutes(5), 0);
        assert_eq!(check_otp(&live, " 04217 ", now), OtpCheck::Valid);
        assert_eq!(check_otp(&live, "04218", now), OtpCheck::Wrong);

        let stale = otp("04217", Duration::seconds(-1), 0);
        assert_eq!(check_otp(&stale, "04217", now), OtpCheck::Expired);
    }

    #[test]
    fn otp_is_exhausted_after_max_attempts() {
        let now = OffsetDateTime::now_utc();
        let almost = otp("11111", Duration::minutes(5), MAX_OTP_ATTEMPTS - 1);
        assert_eq!(check_otp(&almost, "11111", now), OtpCheck::Valid);

        // Even the right code is refused once the guesses are spent.
        let burnt = otp("11111", Duration::minutes(5), MAX_OTP_ATTEMPTS);
        assert_eq!(check_otp(&burnt, "11111", now), OtpCheck::Exhausted);
    }

    #[test]
    fn generated_secrets_have_expected_shape() {
        let t = generate_refresh_token();
        assert_eq!(t.len(), REFRESH_TOKEN_LEN);
        assert_ne!(t, generate_refresh_token());

        for _ in 0..50 {
            let code = generate_otp_code();
            assert_eq!(code.len(), 5);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
