//! Pending registrations and password reset requests

use chrono::{DateTime, Utc};
use common::error::DatabaseResult;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::models::{PasswordReset, PendingRegistration};

/// Fields needed to (re)issue a pending registration
#[derive(Debug, Clone)]
pub struct NewPendingRegistration<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub name: &'a str,
    /// Kept only outside production
    pub otp: Option<&'a str>,
    pub otp_hash: &'a str,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct OtpRepository {
    pool: PgPool,
}

fn map_pending(row: &PgRow) -> PendingRegistration {
    PendingRegistration {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password"),
        name: row.get("name"),
        otp_hash: row.get("otp_hash"),
        expires_at: row.get("expires_at"),
        attempts: row.get("attempts"),
    }
}

fn map_reset(row: &PgRow) -> PasswordReset {
    PasswordReset {
        id: row.get("id"),
        email: row.get("email"),
        otp_hash: row.get("otp_hash"),
        expires_at: row.get("expires_at"),
        attempts: row.get("attempts"),
    }
}

impl OtpRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Replace any earlier pending registration for the same email
    pub async fn replace_pending(&self, new: &NewPendingRegistration<'_>) -> DatabaseResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM pending_registrations WHERE email = $1")
            .bind(new.email)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO pending_registrations (email, password, name, otp, otp_hash, expires_at, attempts)
            VALUES ($1, $2, $3, $4, $5, $6, 0)
            "#,
        )
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.name)
        .bind(new.otp)
        .bind(new.otp_hash)
        .bind(new.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn find_pending(&self, email: &str) -> DatabaseResult<Option<PendingRegistration>> {
        let row = sqlx::query(
            "SELECT id, email, password, name, otp_hash, expires_at, attempts \
             FROM pending_registrations WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(map_pending))
    }

    pub async fn delete_pending(&self, id: Uuid) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM pending_registrations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn increment_pending_attempts(&self, id: Uuid) -> DatabaseResult<()> {
        sqlx::query("UPDATE pending_registrations SET attempts = attempts + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// New code for an existing pending registration; `None` when none exists
    pub async fn reissue_pending(
        &self,
        email: &str,
        otp: Option<&str>,
        otp_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> DatabaseResult<Option<PendingRegistration>> {
        let row = sqlx::query(
            r#"
            UPDATE pending_registrations
            SET otp = $2, otp_hash = $3, expires_at = $4, attempts = 0
            WHERE email = $1
            RETURNING id, email, password, name, otp_hash, expires_at, attempts
            "#,
        )
        .bind(email)
        .bind(otp)
        .bind(otp_hash)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(map_pending))
    }

    /// Create or refresh the reset request for an email
    pub async fn upsert_reset(
        &self,
        email: &str,
        otp_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> DatabaseResult<()> {
        sqlx::query(
            r#"
            INSERT INTO password_resets (email, otp_hash, expires_at, attempts)
            VALUES ($1, $2, $3, 0)
            ON CONFLICT (email) DO UPDATE
            SET otp_hash = EXCLUDED.otp_hash, expires_at = EXCLUDED.expires_at, attempts = 0
            "#,
        )
        .bind(email)
        .bind(otp_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_reset(&self, email: &str) -> DatabaseResult<Option<PasswordReset>> {
        let row = sqlx::query(
            "SELECT id, email, otp_hash, expires_at, attempts FROM password_resets WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(map_reset))
    }

    pub async fn delete_reset(&self, id: Uuid) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM password_resets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn increment_reset_attempts(&self, id: Uuid) -> DatabaseResult<()> {
        sqlx::query("UPDATE password_resets SET attempts = attempts + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
