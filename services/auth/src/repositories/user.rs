//! User repository for database operations

use common::error::{DatabaseError, DatabaseResult};
use common::jwt::Role;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use crate::models::{PendingRegistration, UpdateProfileRequest, User};

const USER_COLUMNS: &str = "id, email, password, name, avatar, phone, address, role, is_active, \
                            points, tier, total_spent, order_count, created_at";

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

fn map_user(row: &PgRow) -> DatabaseResult<User> {
    let role: String = row.get("role");
    let role = role
        .parse::<Role>()
        .map_err(|e| DatabaseError::Query(sqlx::Error::Decode(e.into())))?;

    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password"),
        name: row.get("name"),
        avatar: row.get("avatar"),
        phone: row.get("phone"),
        address: row.get("address"),
        role,
        is_active: row.get("is_active"),
        points: row.get("points"),
        tier: row.get("tier"),
        total_spent: row.get("total_spent"),
        order_count: row.get("order_count"),
        created_at: row.get("created_at"),
    })
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a user by normalized email
    pub async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(map_user).transpose()
    }

    /// Find a user by ID
    pub async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(map_user).transpose()
    }

    pub async fn email_exists(&self, email: &str) -> DatabaseResult<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1) AS taken")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("taken"))
    }

    /// Turn a confirmed pending registration into a user, in one transaction
    pub async fn create_from_pending(&self, pending: &PendingRegistration) -> DatabaseResult<User> {
        info!("Creating user from pending registration: {}", pending.email);

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "INSERT INTO users (email, password, name, role, is_active) \
             VALUES ($1, $2, $3, 'user', TRUE) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&pending.email)
        .bind(&pending.password_hash)
        .bind(&pending.name)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM pending_registrations WHERE id = $1")
            .bind(pending.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        map_user(&row)
    }

    /// Apply the provided profile fields
    pub async fn update_profile(
        &self,
        id: Uuid,
        update: &UpdateProfileRequest,
    ) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!(
            "UPDATE users SET \
                name = COALESCE($2, name), \
                phone = COALESCE($3, phone), \
                address = COALESCE($4, address), \
                avatar = COALESCE($5, avatar), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(&update.name)
        .bind(&update.phone)
        .bind(&update.address)
        .bind(&update.avatar)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_user).transpose()
    }

    pub async fn update_password(&self, id: Uuid, password_hash: &str) -> DatabaseResult<()> {
        sqlx::query("UPDATE users SET password = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Set a new password and consume the reset request together
    pub async fn reset_password(&self, email: &str, password_hash: &str) -> DatabaseResult<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE users SET password = $2, updated_at = NOW() WHERE email = $1")
            .bind(email)
            .bind(password_hash)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM password_resets WHERE email = $1")
            .bind(email)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(updated > 0)
    }
}
