//! Back-office account management: staff and customers

use common::{
    error::{DatabaseError, DatabaseResult},
    jwt::Role,
};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use crate::{
    listing::{Pagination, SortDirection, SortSpec, SortWhitelist, like_pattern},
    models::{CustomerDetail, CustomerOrder, CustomerSummary, StaffMember},
    repositories::order::{ORDER_COLUMNS, map_order},
};

pub const STAFF_SORT: SortWhitelist = SortWhitelist {
    columns: &[
        ("created_at", "u.created_at"),
        ("name", "u.name"),
        ("email", "u.email"),
    ],
    default_column: "u.created_at",
    default_direction: SortDirection::Desc,
};

pub const CUSTOMER_SORT: SortWhitelist = SortWhitelist {
    columns: &[
        ("created_at", "u.created_at"),
        ("name", "u.name"),
        ("email", "u.email"),
        ("role", "u.role"),
    ],
    default_column: "u.created_at",
    default_direction: SortDirection::Desc,
};

const STAFF_COLUMNS: &str = "u.id, u.email, u.name, u.phone, u.role, u.is_active, u.created_at";

const CUSTOMER_SELECT: &str = "SELECT u.id, u.email, u.name, u.avatar, u.phone, u.address, u.role, \
     u.is_active, u.created_at, \
     (SELECT COUNT(*) FROM orders o WHERE o.user_id = u.id) AS orders_count, \
     (SELECT COALESCE(SUM(o.total), 0)::BIGINT FROM orders o \
      WHERE o.user_id = u.id AND o.status <> 'cancelled') AS total_spent \
     FROM users u";

/// Role and activation flag of any account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountState {
    pub role: Role,
    pub is_active: bool,
}

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

fn parse_role(row: &PgRow) -> DatabaseResult<Role> {
    let role: String = row.get("role");
    role.parse()
        .map_err(|e: String| DatabaseError::Query(sqlx::Error::Decode(e.into())))
}

fn map_staff(row: &PgRow) -> DatabaseResult<StaffMember> {
    Ok(StaffMember {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        phone: row.get("phone"),
        role: parse_role(row)?,
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    })
}

fn map_customer(row: &PgRow) -> DatabaseResult<CustomerSummary> {
    Ok(CustomerSummary {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        avatar: row.get("avatar"),
        phone: row.get("phone"),
        address: row.get("address"),
        role: parse_role(row)?,
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        orders_count: row.get("orders_count"),
        total_spent: row.get("total_spent"),
    })
}

fn push_staff_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    search: Option<&str>,
    role: Option<Role>,
) {
    builder.push(" WHERE u.role <> 'user'");
    if let Some(term) = search {
        let pattern = like_pattern(term);
        builder
            .push(" AND (u.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(role) = role {
        builder.push(" AND u.role = ").push_bind(role.as_str());
    }
}

fn push_customer_filters(builder: &mut QueryBuilder<'_, Postgres>, search: Option<&str>) {
    builder.push(" WHERE TRUE");
    if let Some(term) = search {
        let pattern = like_pattern(term);
        builder
            .push(" AND (u.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.phone ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn account_state(&self, id: Uuid) -> DatabaseResult<Option<AccountState>> {
        let row = sqlx::query("SELECT role, is_active FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref()
            .map(|row| {
                Ok(AccountState {
                    role: parse_role(row)?,
                    is_active: row.get("is_active"),
                })
            })
            .transpose()
    }

    pub async fn list_staff(
        &self,
        search: Option<&str>,
        role: Option<Role>,
        pagination: Pagination,
        sort: SortSpec,
    ) -> DatabaseResult<(Vec<StaffMember>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS count FROM users u");
        push_staff_filters(&mut count, search, role);
        let total: i64 = count.build().fetch_one(&self.pool).await?.get("count");

        let mut query =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM users u", STAFF_COLUMNS));
        push_staff_filters(&mut query, search, role);
        query.push(sort.order_by());
        query.push(" LIMIT ").push_bind(pagination.limit);
        query.push(" OFFSET ").push_bind(pagination.offset());

        let rows = query.build().fetch_all(&self.pool).await?;
        let staff = rows.iter().map(map_staff).collect::<DatabaseResult<Vec<_>>>()?;
        Ok((staff, total))
    }

    pub async fn find_staff(&self, id: Uuid) -> DatabaseResult<Option<StaffMember>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users u WHERE u.id = $1 AND u.role <> 'user'",
            STAFF_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_staff).transpose()
    }

    pub async fn email_taken(&self, email: &str) -> DatabaseResult<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1) AS taken")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("taken"))
    }

    /// Inserts an active staff account; the password is already hashed
    pub async fn create_staff(
        &self,
        email: &str,
        password_hash: &str,
        name: &str,
        role: Role,
        phone: Option<&str>,
    ) -> DatabaseResult<StaffMember> {
        let row = sqlx::query(&format!(
            "INSERT INTO users AS u (email, password, name, role, phone, is_active) \
             VALUES ($1, $2, $3, $4, $5, TRUE) RETURNING {}",
            STAFF_COLUMNS
        ))
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .bind(role.as_str())
        .bind(phone)
        .fetch_one(&self.pool)
        .await?;

        let staff = map_staff(&row)?;
        info!("Created {} account {}", staff.role, staff.email);
        Ok(staff)
    }

    pub async fn update_staff(
        &self,
        id: Uuid,
        name: Option<&str>,
        role: Option<Role>,
        phone: Option<&str>,
    ) -> DatabaseResult<Option<StaffMember>> {
        let row = sqlx::query(&format!(
            "UPDATE users AS u SET \
                 name = COALESCE($2, u.name), \
                 role = COALESCE($3, u.role), \
                 phone = COALESCE($4, u.phone), \
                 updated_at = NOW() \
             WHERE u.id = $1 AND u.role <> 'user' RETURNING {}",
            STAFF_COLUMNS
        ))
        .bind(id)
        .bind(name)
        .bind(role.map(|r| r.as_str()))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_staff).transpose()
    }

    pub async fn set_password(&self, id: Uuid, password_hash: &str) -> DatabaseResult<bool> {
        let result =
            sqlx::query("UPDATE users SET password = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(password_hash)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_active(&self, id: Uuid, is_active: bool) -> DatabaseResult<bool> {
        let result =
            sqlx::query("UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(is_active)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, id: Uuid) -> DatabaseResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Read without a lock: two concurrent demotions can both see a count of two
    pub async fn count_active_admins(&self) -> DatabaseResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM users WHERE role = 'admin' AND is_active = TRUE",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("count"))
    }

    pub async fn count_admins(&self) -> DatabaseResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM users WHERE role = 'admin'")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("count"))
    }

    pub async fn list_customers(
        &self,
        search: Option<&str>,
        pagination: Pagination,
        sort: SortSpec,
    ) -> DatabaseResult<(Vec<CustomerSummary>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS count FROM users u");
        push_customer_filters(&mut count, search);
        let total: i64 = count.build().fetch_one(&self.pool).await?.get("count");

        let mut query = QueryBuilder::<Postgres>::new(CUSTOMER_SELECT);
        push_customer_filters(&mut query, search);
        query.push(sort.order_by());
        query.push(" LIMIT ").push_bind(pagination.limit);
        query.push(" OFFSET ").push_bind(pagination.offset());

        let rows = query.build().fetch_all(&self.pool).await?;
        let customers = rows.iter().map(map_customer).collect::<DatabaseResult<Vec<_>>>()?;
        Ok((customers, total))
    }

    pub async fn find_customer(&self, id: Uuid) -> DatabaseResult<Option<CustomerSummary>> {
        let row = sqlx::query(&format!("{} WHERE u.id = $1", CUSTOMER_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(map_customer).transpose()
    }

    /// Customer profile with every order they placed, newest first
    pub async fn customer_detail(&self, id: Uuid) -> DatabaseResult<Option<CustomerDetail>> {
        let Some(customer) = self.find_customer(id).await? else {
            return Ok(None);
        };

        let rows = sqlx::query(&format!(
            "SELECT {}, (SELECT COUNT(*) FROM order_items oi WHERE oi.order_id = o.id) AS items_count \
             FROM orders o WHERE o.user_id = $1 ORDER BY o.created_at DESC",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let orders = rows
            .iter()
            .map(|row| {
                Ok(CustomerOrder {
                    order: map_order(row)?,
                    items_count: row.get("items_count"),
                })
            })
            .collect::<DatabaseResult<Vec<_>>>()?;

        Ok(Some(CustomerDetail { customer, orders }))
    }

    pub async fn update_customer(
        &self,
        id: Uuid,
        name: Option<&str>,
        phone: Option<&str>,
        address: Option<&str>,
        role: Option<Role>,
    ) -> DatabaseResult<Option<CustomerSummary>> {
        let updated = sqlx::query(
            "UPDATE users SET \
                 name = COALESCE($2, name), \
                 phone = COALESCE($3, phone), \
                 address = COALESCE($4, address), \
                 role = COALESCE($5, role), \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(name)
        .bind(phone)
        .bind(address)
        .bind(role.map(|r| r.as_str()))
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_customer(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staff_sort_whitelist() {
        let sort = STAFF_SORT.resolve(Some("email"), Some("asc"));
        assert_eq!(sort.column, "u.email");
        assert_eq!(sort.direction, SortDirection::Asc);

        // unknown columns fall back to newest first
        let sort = STAFF_SORT.resolve(Some("password"), None);
        assert_eq!(sort.column, "u.created_at");
    }

    #[test]
    fn test_customer_sort_accepts_role() {
        assert_eq!(CUSTOMER_SORT.resolve(Some("role"), None).column, "u.role");
    }
}
