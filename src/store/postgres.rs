//! Postgres adapters for the credential and refresh-token stores.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

use super::{CredentialStore, NewRefreshToken, RefreshTokenRecord, RefreshTokenStore};
use crate::user::{Role, UserRecord, UserStatus};

/// Apply the crate's schema migrations.
///
/// # Errors
///
/// Returns an error when a migration fails to apply or the pool is
/// unreachable.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("failed to run migrations")?;
    Ok(())
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &PgRow) -> Result<UserRecord> {
    let role: String = row.get("role");
    let status: String = row.get("status");
    Ok(UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        full_name: row.get("full_name"),
        role: Role::from_name(&role).with_context(|| format!("unknown role: {role}"))?,
        status: UserStatus::from_name(&status)
            .with_context(|| format!("unknown user status: {status}"))?,
    })
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let query = r"
            SELECT id, email, password_hash, full_name, role, status
            FROM users
            WHERE lower(email) = lower($1)
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by email")?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        let query = r"
            SELECT id, email, password_hash, full_name, role, status
            FROM users
            WHERE id = $1
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by id")?;

        row.as_ref().map(user_from_row).transpose()
    }
}

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const TOKEN_COLUMNS: &str = "id, user_id, token_hash, family, issued_at, expires_at, revoked_at, ip_address, user_agent, last_used_at";

fn token_from_row(row: &PgRow) -> RefreshTokenRecord {
    RefreshTokenRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        token_hash: row.get("token_hash"),
        family: row.get("family"),
        issued_at: row.get("issued_at"),
        expires_at: row.get("expires_at"),
        revoked_at: row.get("revoked_at"),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
        last_used_at: row.get("last_used_at"),
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn create(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord> {
        let query = r"
            INSERT INTO refresh_tokens
                (user_id, token_hash, family, issued_at, expires_at, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token.user_id)
            .bind(&token.token_hash)
            .bind(token.family)
            .bind(token.issued_at)
            .bind(token.expires_at)
            .bind(token.ip_address.as_deref())
            .bind(token.user_agent.as_deref())
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    anyhow::Error::new(err).context("refresh token hash already exists")
                } else {
                    anyhow::Error::new(err).context("failed to insert refresh token")
                }
            })?;

        Ok(RefreshTokenRecord {
            id: row.get("id"),
            user_id: token.user_id,
            token_hash: token.token_hash,
            family: token.family,
            issued_at: token.issued_at,
            expires_at: token.expires_at,
            revoked_at: None,
            ip_address: token.ip_address,
            user_agent: token.user_agent,
            last_used_at: None,
        })
    }

    async fn find_valid_by_hash(
        &self,
        hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>> {
        let query = format!(
            r"
            SELECT {TOKEN_COLUMNS}
            FROM refresh_tokens
            WHERE token_hash = $1
              AND revoked_at IS NULL
              AND expires_at > $2
            LIMIT 1
        "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup valid refresh token")?;

        Ok(row.as_ref().map(token_from_row))
    }

    async fn find_revoked_by_hash(&self, hash: &[u8]) -> Result<Option<RefreshTokenRecord>> {
        let query = format!(
            r"
            SELECT {TOKEN_COLUMNS}
            FROM refresh_tokens
            WHERE token_hash = $1
              AND revoked_at IS NOT NULL
            LIMIT 1
        "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup revoked refresh token")?;

        Ok(row.as_ref().map(token_from_row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RefreshTokenRecord>> {
        let query = format!(
            r"
            SELECT {TOKEN_COLUMNS}
            FROM refresh_tokens
            WHERE id = $1
            LIMIT 1
        "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup refresh token by id")?;

        Ok(row.as_ref().map(token_from_row))
    }

    async fn revoke(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        // Conditional so racing rotations of the same token cannot both
        // win; only the caller that flips the row proceeds.
        let query = r"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE id = $1
              AND revoked_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke refresh token")?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<u64> {
        let query = r"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE user_id = $1
              AND revoked_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke user refresh tokens")?;

        Ok(result.rows_affected())
    }

    async fn revoke_all_for_family(&self, family: Uuid, at: DateTime<Utc>) -> Result<u64> {
        let query = r"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE family = $1
              AND revoked_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(family)
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke token family")?;

        Ok(result.rows_affected())
    }

    async fn update_last_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let query = r"
            UPDATE refresh_tokens
            SET last_used_at = $2
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update refresh token last_used_at")?;
        Ok(())
    }

    async fn active_sessions_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>> {
        let query = format!(
            r"
            SELECT {TOKEN_COLUMNS}
            FROM refresh_tokens
            WHERE user_id = $1
              AND revoked_at IS NULL
              AND expires_at > $2
            ORDER BY issued_at DESC
        "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(now)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list active sessions")?;

        Ok(rows.iter().map(token_from_row).collect())
    }
}
