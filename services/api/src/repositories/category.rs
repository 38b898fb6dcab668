use common::error::DatabaseResult;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::models::{
    Category,
    category::{CreateCategoryRequest, UpdateCategoryRequest},
};

const CATEGORY_SELECT: &str = "SELECT c.id, c.name, c.slug, c.icon, c.description, \
     (SELECT COUNT(*) FROM products p WHERE p.category_id = c.id AND p.status = 'active') AS product_count \
     FROM categories c";

#[derive(Clone)]
pub struct CategoryRepository {
    pool: PgPool,
}

fn map_category(row: &PgRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        icon: row.get("icon"),
        description: row.get("description"),
        product_count: row.get("product_count"),
    }
}

impl CategoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All categories by name, with their active product counts
    pub async fn list(&self) -> DatabaseResult<Vec<Category>> {
        let rows = sqlx::query(&format!("{} ORDER BY c.name ASC", CATEGORY_SELECT))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(map_category).collect())
    }

    pub async fn find_by_slug(&self, slug: &str) -> DatabaseResult<Option<Category>> {
        let row = sqlx::query(&format!("{} WHERE c.slug = $1", CATEGORY_SELECT))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(map_category))
    }

    pub async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Category>> {
        let row = sqlx::query(&format!("{} WHERE c.id = $1", CATEGORY_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(map_category))
    }

    pub async fn slug_taken(&self, slug: &str, except: Option<Uuid>) -> DatabaseResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM categories WHERE slug = $1 AND ($2::UUID IS NULL OR id <> $2)) AS taken",
        )
        .bind(slug)
        .bind(except)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("taken"))
    }

    pub async fn create(&self, req: &CreateCategoryRequest, slug: &str) -> DatabaseResult<Category> {
        let row = sqlx::query(
            "WITH c AS (\
               INSERT INTO categories (name, slug, icon, description) VALUES ($1, $2, $3, $4) RETURNING *\
             ) SELECT c.id, c.name, c.slug, c.icon, c.description, 0::BIGINT AS product_count FROM c",
        )
        .bind(req.name.trim())
        .bind(slug)
        .bind(&req.icon)
        .bind(&req.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(map_category(&row))
    }

    /// Partial update; `None` when the category does not exist
    pub async fn update(
        &self,
        id: Uuid,
        req: &UpdateCategoryRequest,
        slug: Option<&str>,
    ) -> DatabaseResult<Option<Category>> {
        let result = sqlx::query(
            "UPDATE categories SET \
                 name = COALESCE($2, name), \
                 slug = COALESCE($3, slug), \
                 icon = COALESCE($4, icon), \
                 description = COALESCE($5, description) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(req.name.as_deref().map(str::trim))
        .bind(slug)
        .bind(&req.icon)
        .bind(&req.description)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    /// Delete only while no active product points at the category
    pub async fn delete_if_empty(&self, id: Uuid) -> DatabaseResult<bool> {
        let result = sqlx::query(
            "DELETE FROM categories c WHERE c.id = $1 \
             AND NOT EXISTS (SELECT 1 FROM products p WHERE p.category_id = c.id AND p.status = 'active')",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn exists(&self, id: Uuid) -> DatabaseResult<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1) AS found")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("found"))
    }
}
