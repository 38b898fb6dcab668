//! Product repository for database operations

use common::error::{DatabaseError, DatabaseResult};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use crate::{
    listing::{Pagination, SortDirection, SortSpec, SortWhitelist, like_pattern},
    models::{
        Product, ProductStatus,
        product::{CreateProductRequest, UpdateProductRequest},
    },
};

const PRODUCT_SELECT: &str = "SELECT p.id, p.name, p.slug, p.description, p.price, p.original_price, \
     p.images, p.category_id, c.name AS category_name, c.slug AS category_slug, p.brand, p.specs, \
     p.stock, p.low_stock_threshold, p.rating, p.review_count, p.is_new, p.is_featured, p.discount, \
     p.status, p.created_at, p.updated_at \
     FROM products p LEFT JOIN categories c ON c.id = p.category_id";

pub const PUBLIC_PRODUCT_SORT: SortWhitelist = SortWhitelist {
    columns: &[
        ("name", "p.name"),
        ("price", "p.price"),
        ("created_at", "p.created_at"),
        ("rating", "p.rating"),
        ("newest", "p.created_at"),
    ],
    default_column: "p.created_at",
    default_direction: SortDirection::Desc,
};

pub const ADMIN_PRODUCT_SORT: SortWhitelist = SortWhitelist {
    columns: &[
        ("name", "p.name"),
        ("price", "p.price"),
        ("stock", "p.stock"),
        ("created_at", "p.created_at"),
        ("rating", "p.rating"),
    ],
    default_column: "p.created_at",
    default_direction: SortDirection::Desc,
};

/// Filters for product lists; only active products are ever listed
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub search: Option<String>,
    /// Also search the brand column
    pub search_brand: bool,
    pub category_slug: Option<String>,
    pub featured: Option<bool>,
    pub is_new: Option<bool>,
}

#[derive(Clone)]
pub struct ProductRepository {
    pool: PgPool,
}

pub(crate) fn map_product(row: &PgRow) -> DatabaseResult<Product> {
    let status: String = row.get("status");
    let status = status
        .parse::<ProductStatus>()
        .map_err(|e| DatabaseError::Query(sqlx::Error::Decode(e.into())))?;

    Ok(Product {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        price: row.get("price"),
        original_price: row.get("original_price"),
        images: row.get("images"),
        category_id: row.get("category_id"),
        category_name: row.get("category_name"),
        category_slug: row.get("category_slug"),
        brand: row.get("brand"),
        specs: row.get("specs"),
        stock: row.get("stock"),
        low_stock_threshold: row.get("low_stock_threshold"),
        rating: row.get("rating"),
        review_count: row.get("review_count"),
        is_new: row.get("is_new"),
        is_featured: row.get("is_featured"),
        discount: row.get("discount"),
        status,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    builder.push(" WHERE p.status = 'active'");

    if let Some(term) = &filter.search {
        let pattern = like_pattern(term);
        builder
            .push(" AND (p.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.description ILIKE ")
            .push_bind(pattern.clone());
        if filter.search_brand {
            builder.push(" OR p.brand ILIKE ").push_bind(pattern);
        }
        builder.push(")");
    }
    if let Some(slug) = &filter.category_slug {
        builder.push(" AND c.slug = ").push_bind(slug.clone());
    }
    if let Some(featured) = filter.featured {
        builder.push(" AND p.is_featured = ").push_bind(featured);
    }
    if let Some(is_new) = filter.is_new {
        builder.push(" AND p.is_new = ").push_bind(is_new);
    }
}

fn images_value(images: &[String]) -> Value {
    Value::Array(images.iter().cloned().map(Value::String).collect())
}

impl ProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// One page of active products plus the total match count
    pub async fn list(
        &self,
        filter: &ProductFilter,
        pagination: Pagination,
        sort: SortSpec,
    ) -> DatabaseResult<(Vec<Product>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) AS count FROM products p LEFT JOIN categories c ON c.id = p.category_id",
        );
        push_filters(&mut count, filter);
        let total: i64 = count.build().fetch_one(&self.pool).await?.get("count");

        let mut query = QueryBuilder::<Postgres>::new(PRODUCT_SELECT);
        push_filters(&mut query, filter);
        query.push(sort.order_by());
        query.push(", p.id LIMIT ").push_bind(pagination.limit);
        query.push(" OFFSET ").push_bind(pagination.offset());

        let rows = query.build().fetch_all(&self.pool).await?;
        let products = rows.iter().map(map_product).collect::<DatabaseResult<Vec<_>>>()?;

        Ok((products, total))
    }

    pub async fn find_by_slug(&self, slug: &str) -> DatabaseResult<Option<Product>> {
        let row = sqlx::query(&format!(
            "{} WHERE p.slug = $1 AND p.status = 'active'",
            PRODUCT_SELECT
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_product).transpose()
    }

    /// Active product by id
    pub async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Product>> {
        let row = sqlx::query(&format!(
            "{} WHERE p.id = $1 AND p.status = 'active'",
            PRODUCT_SELECT
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_product).transpose()
    }

    /// Active products among `ids`, in the order given
    pub async fn find_many(&self, ids: &[Uuid]) -> DatabaseResult<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "{} WHERE p.id = ANY($1) AND p.status = 'active'",
            PRODUCT_SELECT
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut products = rows.iter().map(map_product).collect::<DatabaseResult<Vec<_>>>()?;
        products.sort_by_key(|p| ids.iter().position(|id| *id == p.id));
        Ok(products)
    }

    /// Slugs are unique across deleted products too
    pub async fn slug_exists(&self, slug: &str, except: Option<Uuid>) -> DatabaseResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM products WHERE slug = $1 AND ($2::UUID IS NULL OR id <> $2)) AS taken",
        )
        .bind(slug)
        .bind(except)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("taken"))
    }

    pub async fn create(&self, req: &CreateProductRequest, slug: &str) -> DatabaseResult<Product> {
        let specs = req.specs.clone().map(Value::Object).unwrap_or_else(|| Value::Object(Default::default()));
        let images = images_value(req.images.as_deref().unwrap_or_default());

        let row = sqlx::query(
            "INSERT INTO products (name, slug, description, price, original_price, images, category_id, \
             brand, specs, stock, low_stock_threshold, is_new, is_featured, discount) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) RETURNING id",
        )
        .bind(req.name.trim())
        .bind(slug)
        .bind(&req.description)
        .bind(req.price)
        .bind(req.original_price)
        .bind(&images)
        .bind(req.category_id)
        .bind(&req.brand)
        .bind(&specs)
        .bind(req.stock.unwrap_or(0))
        .bind(req.low_stock_threshold.unwrap_or(10))
        .bind(req.is_new.unwrap_or(false))
        .bind(req.is_featured.unwrap_or(false))
        .bind(req.discount.unwrap_or(0))
        .fetch_one(&self.pool)
        .await?;

        let id: Uuid = row.get("id");
        info!("Created product {} ({})", id, slug);

        self.find_by_id(id)
            .await?
            .ok_or_else(|| DatabaseError::Query(sqlx::Error::RowNotFound))
    }

    /// Partial update of an active product; `None` when it does not exist
    pub async fn update(
        &self,
        id: Uuid,
        req: &UpdateProductRequest,
        slug: Option<&str>,
    ) -> DatabaseResult<Option<Product>> {
        let specs = req.specs.clone().map(Value::Object);
        let images = req.images.as_deref().map(images_value);

        let result = sqlx::query(
            "UPDATE products SET \
                 name = COALESCE($2, name), \
                 slug = COALESCE($3, slug), \
                 description = COALESCE($4, description), \
                 price = COALESCE($5, price), \
                 original_price = COALESCE($6, original_price), \
                 images = COALESCE($7, images), \
                 category_id = COALESCE($8, category_id), \
                 brand = COALESCE($9, brand), \
                 specs = COALESCE($10, specs), \
                 stock = COALESCE($11, stock), \
                 low_stock_threshold = COALESCE($12, low_stock_threshold), \
                 is_new = COALESCE($13, is_new), \
                 is_featured = COALESCE($14, is_featured), \
                 discount = COALESCE($15, discount), \
                 updated_at = NOW() \
             WHERE id = $1 AND status = 'active'",
        )
        .bind(id)
        .bind(req.name.as_deref().map(str::trim))
        .bind(slug)
        .bind(&req.description)
        .bind(req.price)
        .bind(req.original_price)
        .bind(&images)
        .bind(req.category_id)
        .bind(&req.brand)
        .bind(&specs)
        .bind(req.stock)
        .bind(req.low_stock_threshold)
        .bind(req.is_new)
        .bind(req.is_featured)
        .bind(req.discount)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        info!("Updated product {}", id);
        self.find_by_id(id).await
    }

    /// Mark a product deleted; the row stays for order history
    pub async fn soft_delete(&self, id: Uuid, deleted_slug: &str) -> DatabaseResult<bool> {
        let result = sqlx::query(
            "UPDATE products SET status = 'deleted', slug = $2, is_featured = FALSE, is_new = FALSE, \
             updated_at = NOW() WHERE id = $1 AND status = 'active'",
        )
        .bind(id)
        .bind(deleted_slug)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!("Soft deleted product {}", id);
        }
        Ok(result.rows_affected() > 0)
    }

    /// In-stock products currently sold below their original price
    pub async fn on_sale(&self, limit: i64) -> DatabaseResult<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "{} WHERE p.status = 'active' AND p.stock > 0 \
             AND p.original_price IS NOT NULL AND p.original_price > p.price \
             ORDER BY (p.original_price - p.price) DESC LIMIT $1",
            PRODUCT_SELECT
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_product).collect()
    }

    /// In-stock products whose name or description matches any keyword
    pub async fn search_in_stock(&self, keywords: &[String], limit: i64) -> DatabaseResult<Vec<Product>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Postgres>::new(PRODUCT_SELECT);
        query.push(" WHERE p.status = 'active' AND p.stock > 0 AND (");
        let mut clauses = query.separated(" OR ");
        for keyword in keywords {
            let pattern = like_pattern(keyword);
            clauses
                .push("p.name ILIKE ")
                .push_bind_unseparated(pattern.clone())
                .push("p.description ILIKE ")
                .push_bind_unseparated(pattern);
        }
        query.push(") ORDER BY p.is_featured DESC, p.rating DESC LIMIT ");
        query.push_bind(limit);

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(map_product).collect()
    }
}
