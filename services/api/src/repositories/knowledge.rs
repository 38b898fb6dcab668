use common::error::DatabaseResult;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    listing::{Pagination, like_pattern},
    models::{
        KnowledgeCategory, KnowledgeEntry,
        knowledge::{CreateKnowledgeRequest, UpdateKnowledgeRequest, normalize_tags},
    },
};

const KNOWLEDGE_COLUMNS: &str =
    "id, title, content, category, COALESCE(tags, '{}') AS tags, is_active, created_at, updated_at";

/// Filters of the admin knowledge list
#[derive(Debug, Clone, Default)]
pub struct KnowledgeFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Clone)]
pub struct KnowledgeRepository {
    pool: PgPool,
}

fn map_entry(row: &PgRow) -> KnowledgeEntry {
    KnowledgeEntry {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        category: row.get("category"),
        tags: row.get("tags"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &KnowledgeFilter) {
    builder.push(" WHERE TRUE");
    if let Some(category) = &filter.category {
        builder.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(term) = &filter.search {
        let pattern = like_pattern(term);
        builder
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR content ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(active) = filter.is_active {
        builder.push(" AND is_active = ").push_bind(active);
    }
}

impl KnowledgeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Best active entry for a customer question: title hits, then content hits, then exact tags
    pub async fn best_match(&self, question: &str) -> DatabaseResult<Option<KnowledgeEntry>> {
        let question = question.trim();
        let row = sqlx::query(&format!(
            "SELECT {} FROM chatbot_knowledge \
             WHERE is_active = TRUE AND (title ILIKE $1 OR content ILIKE $1 OR LOWER($2) = ANY(tags)) \
             ORDER BY CASE WHEN title ILIKE $1 THEN 1 WHEN content ILIKE $1 THEN 2 ELSE 3 END, \
             updated_at DESC LIMIT 1",
            KNOWLEDGE_COLUMNS
        ))
        .bind(like_pattern(question))
        .bind(question)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(map_entry))
    }

    pub async fn list(
        &self,
        filter: &KnowledgeFilter,
        pagination: Pagination,
    ) -> DatabaseResult<(Vec<KnowledgeEntry>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS count FROM chatbot_knowledge");
        push_filters(&mut count, filter);
        let total: i64 = count.build().fetch_one(&self.pool).await?.get("count");

        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM chatbot_knowledge",
            KNOWLEDGE_COLUMNS
        ));
        push_filters(&mut query, filter);
        query.push(" ORDER BY updated_at DESC LIMIT ").push_bind(pagination.limit);
        query.push(" OFFSET ").push_bind(pagination.offset());

        let rows = query.build().fetch_all(&self.pool).await?;
        Ok((rows.iter().map(map_entry).collect(), total))
    }

    pub async fn find(&self, id: Uuid) -> DatabaseResult<Option<KnowledgeEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM chatbot_knowledge WHERE id = $1",
            KNOWLEDGE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(map_entry))
    }

    pub async fn create(&self, req: &CreateKnowledgeRequest) -> DatabaseResult<KnowledgeEntry> {
        let tags = normalize_tags(req.tags.as_deref().unwrap_or_default());
        let row = sqlx::query(&format!(
            "INSERT INTO chatbot_knowledge (title, content, category, tags, is_active) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            KNOWLEDGE_COLUMNS
        ))
        .bind(req.title.trim())
        .bind(req.content.trim())
        .bind(&req.category)
        .bind(&tags)
        .bind(req.is_active.unwrap_or(true))
        .fetch_one(&self.pool)
        .await?;

        Ok(map_entry(&row))
    }

    pub async fn update(
        &self,
        id: Uuid,
        req: &UpdateKnowledgeRequest,
    ) -> DatabaseResult<Option<KnowledgeEntry>> {
        let tags = req.tags.as_deref().map(normalize_tags);
        let row = sqlx::query(&format!(
            "UPDATE chatbot_knowledge SET \
                 title = COALESCE($2, title), \
                 content = COALESCE($3, content), \
                 category = COALESCE($4, category), \
                 tags = COALESCE($5, tags), \
                 is_active = COALESCE($6, is_active), \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            KNOWLEDGE_COLUMNS
        ))
        .bind(id)
        .bind(req.title.as_deref().map(str::trim))
        .bind(req.content.as_deref().map(str::trim))
        .bind(&req.category)
        .bind(&tags)
        .bind(req.is_active)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(map_entry))
    }

    pub async fn delete(&self, id: Uuid) -> DatabaseResult<bool> {
        let result = sqlx::query("DELETE FROM chatbot_knowledge WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Categories with their entry counts, most used first
    pub async fn categories(&self) -> DatabaseResult<Vec<KnowledgeCategory>> {
        let rows = sqlx::query(
            "SELECT category, COUNT(*) AS count FROM chatbot_knowledge \
             WHERE category IS NOT NULL GROUP BY category ORDER BY count DESC, category ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| KnowledgeCategory {
                category: row.get("category"),
                count: row.get("count"),
            })
            .collect())
    }
}
