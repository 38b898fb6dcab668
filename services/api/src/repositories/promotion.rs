use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use crate::{
    listing::Pagination,
    models::{
        Promotion, PromotionType,
        promotion::{CreatePromotionRequest, UpdatePromotionRequest},
    },
};

pub(crate) const PROMOTION_COLUMNS: &str = "id, code, name, description, type, value, min_order_value, \
     max_discount, usage_limit, used_count, start_date, end_date, is_active, created_at";

/// `status` filter values of the staff list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionState {
    Active,
    Expired,
    Inactive,
}

impl PromotionState {
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        match raw? {
            "active" => Some(PromotionState::Active),
            "expired" => Some(PromotionState::Expired),
            "inactive" => Some(PromotionState::Inactive),
            _ => None,
        }
    }

    fn condition(&self) -> &'static str {
        match self {
            PromotionState::Active => {
                " AND is_active = TRUE AND (start_date IS NULL OR start_date <= NOW()) \
                 AND (end_date IS NULL OR end_date >= NOW())"
            }
            PromotionState::Expired => {
                " AND (end_date < NOW() OR (usage_limit IS NOT NULL AND used_count >= usage_limit))"
            }
            PromotionState::Inactive => " AND is_active = FALSE",
        }
    }
}

#[derive(Clone)]
pub struct PromotionRepository {
    pool: PgPool,
}

pub(crate) fn map_promotion(row: &PgRow) -> DatabaseResult<Promotion> {
    let kind: String = row.get("type");
    let promotion_type = kind
        .parse::<PromotionType>()
        .map_err(|e| DatabaseError::Query(sqlx::Error::Decode(e.into())))?;

    Ok(Promotion {
        id: row.get("id"),
        code: row.get("code"),
        name: row.get("name"),
        description: row.get("description"),
        promotion_type,
        value: row.get("value"),
        min_order_value: row.get("min_order_value"),
        max_discount: row.get("max_discount"),
        usage_limit: row.get("usage_limit"),
        used_count: row.get("used_count"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    })
}

impl PromotionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, id: Uuid) -> DatabaseResult<Option<Promotion>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM promotions WHERE id = $1",
            PROMOTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_promotion).transpose()
    }

    /// Case-insensitive code lookup limited to promotions that can be used right now
    pub async fn find_redeemable_by_code(&self, code: &str) -> DatabaseResult<Option<Promotion>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM promotions WHERE UPPER(code) = UPPER($1) AND is_active = TRUE \
             AND (start_date IS NULL OR start_date <= NOW()) \
             AND (end_date IS NULL OR end_date >= NOW()) \
             AND (usage_limit IS NULL OR used_count < usage_limit)",
            PROMOTION_COLUMNS
        ))
        .bind(code.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_promotion).transpose()
    }

    pub async fn code_taken(&self, code: &str, except: Option<Uuid>) -> DatabaseResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM promotions WHERE UPPER(code) = UPPER($1) \
             AND ($2::UUID IS NULL OR id <> $2)) AS taken",
        )
        .bind(code.trim())
        .bind(except)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("taken"))
    }

    pub async fn list(
        &self,
        state: Option<PromotionState>,
        pagination: Pagination,
    ) -> DatabaseResult<(Vec<Promotion>, i64)> {
        let condition = state.map(|s| s.condition()).unwrap_or("");

        let total: i64 = sqlx::query(&format!(
            "SELECT COUNT(*) AS count FROM promotions WHERE TRUE{}",
            condition
        ))
        .fetch_one(&self.pool)
        .await?
        .get("count");

        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM promotions WHERE TRUE{} ORDER BY created_at DESC LIMIT ",
            PROMOTION_COLUMNS, condition
        ));
        query.push_bind(pagination.limit);
        query.push(" OFFSET ").push_bind(pagination.offset());

        let rows = query.build().fetch_all(&self.pool).await?;
        let promotions = rows.iter().map(map_promotion).collect::<DatabaseResult<Vec<_>>>()?;

        Ok((promotions, total))
    }

    pub async fn create(&self, req: &CreatePromotionRequest) -> DatabaseResult<Promotion> {
        let row = sqlx::query(&format!(
            "INSERT INTO promotions (code, name, description, type, value, min_order_value, \
             max_discount, usage_limit, start_date, end_date, is_active) \
             VALUES (UPPER($1), $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {}",
            PROMOTION_COLUMNS
        ))
        .bind(req.code.trim())
        .bind(req.name.trim())
        .bind(&req.description)
        .bind(req.promotion_type.as_str())
        .bind(req.value)
        .bind(req.min_order_value.unwrap_or(0))
        .bind(req.max_discount)
        .bind(req.usage_limit)
        .bind(req.start_date)
        .bind(req.end_date)
        .bind(req.is_active.unwrap_or(true))
        .fetch_one(&self.pool)
        .await?;

        let promotion = map_promotion(&row)?;
        info!("Created promotion {}", promotion.code);
        Ok(promotion)
    }

    pub async fn update(
        &self,
        id: Uuid,
        req: &UpdatePromotionRequest,
    ) -> DatabaseResult<Option<Promotion>> {
        let row = sqlx::query(&format!(
            "UPDATE promotions SET \
                 code = COALESCE(UPPER($2), code), \
                 name = COALESCE($3, name), \
                 description = COALESCE($4, description), \
                 type = COALESCE($5, type), \
                 value = COALESCE($6, value), \
                 min_order_value = COALESCE($7, min_order_value), \
                 max_discount = $8, \
                 usage_limit = $9, \
                 start_date = $10, \
                 end_date = $11, \
                 is_active = COALESCE($12, is_active), \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            PROMOTION_COLUMNS
        ))
        .bind(id)
        .bind(req.code.as_deref().map(str::trim))
        .bind(req.name.as_deref().map(str::trim))
        .bind(&req.description)
        .bind(req.promotion_type.map(|t| t.as_str()))
        .bind(req.value)
        .bind(req.min_order_value)
        .bind(req.max_discount)
        .bind(req.usage_limit)
        .bind(req.start_date)
        .bind(req.end_date)
        .bind(req.is_active)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_promotion).transpose()
    }

    pub async fn delete(&self, id: Uuid) -> DatabaseResult<bool> {
        let result = sqlx::query("DELETE FROM promotions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn toggle(&self, id: Uuid) -> DatabaseResult<Option<Promotion>> {
        let row = sqlx::query(&format!(
            "UPDATE promotions SET is_active = NOT is_active, updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            PROMOTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_promotion).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parse() {
        assert_eq!(PromotionState::parse(Some("expired")), Some(PromotionState::Expired));
        assert_eq!(PromotionState::parse(Some("all")), None);
        assert_eq!(PromotionState::parse(None), None);
    }
}
