use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    listing::Pagination,
    models::{
        ChatMessage, ChatSession, ChatSessionView, ChatStatus, NewMessage, SessionKind,
        chat::ChatbotAnalytics,
    },
};

const SESSION_COLUMNS: &str =
    "s.id, s.user_id, s.guest_id, s.staff_id, s.kind, s.status, s.created_at, s.updated_at, s.closed_at";

const MESSAGE_COLUMNS: &str =
    "id, session_id, sender_type, sender_id, content, metadata, created_at";

const VIEW_SELECT: &str = "cu.name AS customer_name, cu.email AS customer_email, st.name AS staff_name, \
     (SELECT m.content FROM chat_messages m WHERE m.session_id = s.id ORDER BY m.created_at DESC LIMIT 1) AS last_message, \
     (SELECT COUNT(*) FROM chat_messages m WHERE m.session_id = s.id) AS message_count \
     FROM chat_sessions s \
     LEFT JOIN users cu ON cu.id = s.user_id \
     LEFT JOIN users st ON st.id = s.staff_id";

#[derive(Clone)]
pub struct ChatRepository {
    pool: PgPool,
}

fn decode_error(message: String) -> DatabaseError {
    DatabaseError::Query(sqlx::Error::Decode(message.into()))
}

fn map_session(row: &PgRow) -> DatabaseResult<ChatSession> {
    let kind: String = row.get("kind");
    let status: String = row.get("status");

    Ok(ChatSession {
        id: row.get("id"),
        user_id: row.get("user_id"),
        guest_id: row.get("guest_id"),
        staff_id: row.get("staff_id"),
        kind: kind.parse().map_err(decode_error)?,
        status: status.parse().map_err(decode_error)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        closed_at: row.get("closed_at"),
    })
}

fn map_view(row: &PgRow) -> DatabaseResult<ChatSessionView> {
    Ok(ChatSessionView {
        session: map_session(row)?,
        customer_name: row.get("customer_name"),
        customer_email: row.get("customer_email"),
        staff_name: row.get("staff_name"),
        last_message: row.get("last_message"),
        message_count: row.get("message_count"),
    })
}

fn map_message(row: &PgRow) -> DatabaseResult<ChatMessage> {
    let sender_type: String = row.get("sender_type");

    Ok(ChatMessage {
        id: row.get("id"),
        session_id: row.get("session_id"),
        sender_type: sender_type.parse().map_err(decode_error)?,
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
    })
}

impl ChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_session(
        &self,
        user_id: Option<Uuid>,
        guest_id: Option<&str>,
        kind: SessionKind,
    ) -> DatabaseResult<ChatSession> {
        let row = sqlx::query(&format!(
            "INSERT INTO chat_sessions AS s (user_id, guest_id, kind, status) \
             VALUES ($1, $2, $3, 'waiting') RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .bind(guest_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;

        map_session(&row)
    }

    pub async fn find_session(&self, id: Uuid) -> DatabaseResult<Option<ChatSession>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM chat_sessions s WHERE s.id = $1",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_session).transpose()
    }

    /// Most recent open chatbot session of a signed-in user or a guest
    pub async fn latest_open_bot_session(
        &self,
        user_id: Option<Uuid>,
        guest_id: Option<&str>,
    ) -> DatabaseResult<Option<ChatSession>> {
        if user_id.is_none() && guest_id.is_none() {
            return Ok(None);
        }

        let row = sqlx::query(&format!(
            "SELECT {} FROM chat_sessions s \
             WHERE s.kind = 'bot' AND s.status <> 'closed' \
             AND (($1::UUID IS NOT NULL AND s.user_id = $1) \
                  OR ($1::UUID IS NULL AND s.guest_id = $2)) \
             ORDER BY s.created_at DESC LIMIT 1",
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .bind(guest_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_session).transpose()
    }

    /// A customer's human chat sessions, newest first
    pub async fn sessions_for_user(&self, user_id: Uuid) -> DatabaseResult<Vec<ChatSessionView>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, {} WHERE s.user_id = $1 AND s.kind = 'human' ORDER BY s.created_at DESC",
            SESSION_COLUMNS, VIEW_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_view).collect()
    }

    /// Staff queue: waiting sessions first, then active ones, oldest first
    pub async fn open_sessions(&self) -> DatabaseResult<Vec<ChatSessionView>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, {} WHERE s.kind = 'human' AND s.status <> 'closed' \
             ORDER BY CASE s.status WHEN 'waiting' THEN 0 ELSE 1 END, s.created_at ASC",
            SESSION_COLUMNS, VIEW_SELECT
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_view).collect()
    }

    pub async fn closed_sessions(
        &self,
        pagination: Pagination,
    ) -> DatabaseResult<(Vec<ChatSessionView>, i64)> {
        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM chat_sessions WHERE kind = 'human' AND status = 'closed'",
        )
        .fetch_one(&self.pool)
        .await?
        .get("count");

        let rows = sqlx::query(&format!(
            "SELECT {}, {} WHERE s.kind = 'human' AND s.status = 'closed' \
             ORDER BY s.closed_at DESC NULLS LAST LIMIT $1 OFFSET $2",
            SESSION_COLUMNS, VIEW_SELECT
        ))
        .bind(pagination.limit)
        .bind(pagination.offset())
        .fetch_all(&self.pool)
        .await?;

        let sessions = rows.iter().map(map_view).collect::<DatabaseResult<Vec<_>>>()?;
        Ok((sessions, total))
    }

    /// Moves a session out of `from`; `None` when it was no longer in that state
    pub async fn transition(
        &self,
        id: Uuid,
        from: ChatStatus,
        to: ChatStatus,
        staff_id: Option<Uuid>,
    ) -> DatabaseResult<Option<ChatSession>> {
        let row = sqlx::query(&format!(
            "UPDATE chat_sessions AS s SET status = $3, \
                 staff_id = COALESCE($4, s.staff_id), \
                 closed_at = CASE WHEN $3 = 'closed' THEN NOW() ELSE s.closed_at END, \
                 updated_at = NOW() \
             WHERE s.id = $1 AND s.status = $2 RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(staff_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_session).transpose()
    }

    pub async fn insert_message(&self, message: &NewMessage) -> DatabaseResult<ChatMessage> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "INSERT INTO chat_messages (session_id, sender_type, sender_id, content, metadata) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            MESSAGE_COLUMNS
        ))
        .bind(message.session_id)
        .bind(message.sender_type.as_str())
        .bind(&message.sender_id)
        .bind(&message.content)
        .bind(&message.metadata)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE chat_sessions SET updated_at = NOW() WHERE id = $1")
            .bind(message.session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        map_message(&row)
    }

    /// Every message of a session in order, whatever the session status
    pub async fn messages(&self, session_id: Uuid) -> DatabaseResult<Vec<ChatMessage>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM chat_messages WHERE session_id = $1 ORDER BY created_at ASC",
            MESSAGE_COLUMNS
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_message).collect()
    }

    /// The last `limit` messages, oldest first
    pub async fn recent_messages(
        &self,
        session_id: Uuid,
        limit: i64,
    ) -> DatabaseResult<Vec<ChatMessage>> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM (SELECT {} FROM chat_messages WHERE session_id = $1 \
             ORDER BY created_at DESC LIMIT $2) recent ORDER BY created_at ASC",
            MESSAGE_COLUMNS
        ))
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_message).collect()
    }

    pub async fn message_in_session(&self, message_id: Uuid, session_id: Uuid) -> DatabaseResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM chat_messages WHERE id = $1 AND session_id = $2) AS found",
        )
        .bind(message_id)
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("found"))
    }

    pub async fn insert_feedback(
        &self,
        session_id: Uuid,
        message_id: Uuid,
        rating: i32,
        feedback: Option<&str>,
    ) -> DatabaseResult<Uuid> {
        let row = sqlx::query(
            "INSERT INTO chatbot_feedback (session_id, message_id, rating, feedback) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(session_id)
        .bind(message_id)
        .bind(rating)
        .bind(feedback)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    /// Chatbot usage between two instants
    pub async fn analytics(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DatabaseResult<ChatbotAnalytics> {
        let usage = sqlx::query(
            "SELECT COUNT(DISTINCT s.id) AS total_sessions, COUNT(m.id) AS total_messages \
             FROM chat_sessions s LEFT JOIN chat_messages m ON m.session_id = s.id \
             WHERE s.kind = 'bot' AND s.created_at BETWEEN $1 AND $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        let feedback = sqlx::query(
            "SELECT COUNT(*) AS feedback_count, AVG(rating)::FLOAT8 AS avg_rating \
             FROM chatbot_feedback WHERE created_at BETWEEN $1 AND $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        let total_sessions: i64 = usage.get("total_sessions");
        let total_messages: i64 = usage.get("total_messages");
        let avg_messages_per_session = if total_sessions > 0 {
            total_messages as f64 / total_sessions as f64
        } else {
            0.0
        };

        Ok(ChatbotAnalytics {
            start_date: start,
            end_date: end,
            total_sessions,
            total_messages,
            avg_messages_per_session,
            feedback_count: feedback.get("feedback_count"),
            avg_rating: feedback.get("avg_rating"),
        })
    }
}
