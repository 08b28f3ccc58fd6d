use anyhow::Context;
use sqlx::{PgExecutor, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{AuthProviderLink, OneTimePassword, OtpPurpose, Provider, RefreshToken, User};

const USER_COLUMNS: &str =
    "id, email, password_hash, first_name, last_name, email_verified, created_at, updated_at";

pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: Option<&'a str>,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    pub email_verified: bool,
}

impl User {
    /// Find a user by email.
    pub async fn find_by_email(db: impl PgExecutor<'_>, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    pub async fn find_by_id(db: impl PgExecutor<'_>, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    pub async fn create(db: impl PgExecutor<'_>, new: NewUser<'_>) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name, email_verified)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.first_name)
        .bind(new.last_name)
        .bind(new.email_verified)
        .fetch_one(db)
        .await
        .context("insert user")?;
        Ok(user)
    }

    pub async fn mark_verified(db: impl PgExecutor<'_>, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET email_verified = TRUE, updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(db)
            .await
            .context("mark user verified")?;
        Ok(())
    }

    pub async fn set_password(db: impl PgExecutor<'_>, id: Uuid, hash: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(db)
            .await
            .context("update password hash")?;
        Ok(())
    }
}

impl AuthProviderLink {
    pub async fn find(
        db: impl PgExecutor<'_>,
        provider: Provider,
        provider_id: &str,
    ) -> anyhow::Result<Option<AuthProviderLink>> {
        let link = sqlx::query_as::<_, AuthProviderLink>(
            r#"
            SELECT id, user_id, provider, provider_id
            FROM auth_providers
            WHERE provider = $1 AND provider_id = $2
            "#,
        )
        .bind(provider)
        .bind(provider_id)
        .fetch_optional(db)
        .await
        .context("find auth provider")?;
        Ok(link)
    }

    pub async fn find_for_user(
        db: impl PgExecutor<'_>,
        user_id: Uuid,
        provider: Provider,
    ) -> anyhow::Result<Option<AuthProviderLink>> {
        let link = sqlx::query_as::<_, AuthProviderLink>(
            r#"
            SELECT id, user_id, provider, provider_id
            FROM auth_providers
            WHERE user_id = $1 AND provider = $2
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .fetch_optional(db)
        .await
        .context("find auth provider for user")?;
        Ok(link)
    }

    pub async fn link(
        db: impl PgExecutor<'_>,
        user_id: Uuid,
        provider: Provider,
        provider_id: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO auth_providers (user_id, provider, provider_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (provider, provider_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .bind(provider_id)
        .execute(db)
        .await
        .context("link auth provider")?;
        Ok(())
    }
}

impl RefreshToken {
    pub async fn insert(
        db: impl PgExecutor<'_>,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
        device: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token, expires_at, device)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .bind(device)
        .execute(db)
        .await
        .context("insert refresh token")?;
        Ok(())
    }

    /// Locks the row so two concurrent refreshes cannot both rotate it.
    pub async fn find_for_update(
        db: impl PgExecutor<'_>,
        token: &str,
    ) -> anyhow::Result<Option<RefreshToken>> {
        let row = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT id, user_id, token, expires_at, revoked_at, replaced_by_token, device, created_at
            FROM refresh_tokens
            WHERE token = $1
            FOR UPDATE
            "#,
        )
        .bind(token)
        .fetch_optional(db)
        .await
        .context("find refresh token")?;
        Ok(row)
    }

    pub async fn revoke(
        db: impl PgExecutor<'_>,
        token: &str,
        replaced_by: Option<&str>,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE refresh_tokens
               SET revoked_at = now(), replaced_by_token = $2
             WHERE token = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(token)
        .bind(replaced_by)
        .execute(db)
        .await
        .context("revoke refresh token")?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn revoke_all_for_user(db: impl PgExecutor<'_>, user_id: Uuid) -> anyhow::Result<u64> {
        let res = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = now() WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(db)
        .await
        .context("revoke user refresh tokens")?;
        Ok(res.rows_affected())
    }
}

impl OneTimePassword {
    /// Replaces any outstanding code of the same purpose.
    pub async fn replace(
        db: &PgPool,
        user_id: Uuid,
        purpose: OtpPurpose,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        let mut tx = db.begin().await.context("begin tx")?;
        sqlx::query("DELETE FROM one_time_passwords WHERE user_id = $1 AND purpose = $2")
            .bind(user_id)
            .bind(purpose)
            .execute(&mut *tx)
            .await
            .context("clear one-time passwords")?;
        sqlx::query(
            r#"
            INSERT INTO one_time_passwords (user_id, code, purpose, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(code)
        .bind(purpose)
        .bind(expires_at)
        .execute(&mut *tx)
        .await
        .context("insert one-time password")?;
        tx.commit().await.context("commit tx")?;
        Ok(())
    }

    /// The outstanding code for `purpose`; issuing replaces older ones.
    pub async fn find_current(
        db: impl PgExecutor<'_>,
        user_id: Uuid,
        purpose: OtpPurpose,
    ) -> anyhow::Result<Option<OneTimePassword>> {
        let row = sqlx::query_as::<_, OneTimePassword>(
            r#"
            SELECT id, user_id, code, purpose, expires_at, attempts
            FROM one_time_passwords
            WHERE user_id = $1 AND purpose = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(purpose)
        .fetch_optional(db)
        .await
        .context("find one-time password")?;
        Ok(row)
    }

    /// Spends one attempt and returns the new count, or `None` when none
    /// are left.
    pub async fn use_attempt(
        db: impl PgExecutor<'_>,
        id: Uuid,
        max_attempts: i32,
    ) -> anyhow::Result<Option<i32>> {
        let used = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE one_time_passwords SET attempts = attempts + 1
            WHERE id = $1 AND attempts < $2
            RETURNING attempts
            "#,
        )
        .bind(id)
        .bind(max_attempts)
        .fetch_optional(db)
        .await
        .context("count one-time password attempt")?;
        Ok(used)
    }

    pub async fn delete(db: impl PgExecutor<'_>, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM one_time_passwords WHERE id = $1")
            .bind(id)
            .execute(db)
            .await
            .context("delete one-time password")?;
        Ok(())
    }
}
