//! Chatbot widget and its knowledge base

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, ValidJson, ValidQuery},
    listing::{MAX_LIMIT, Paginated, Pagination, search_term},
    middleware::{MaybeUser, auth_middleware, optional_auth_middleware, require_admin},
    models::{
        ChatSession, ChatStatus, SessionKind,
        chat::{AnalyticsQuery, ChatbotFeedbackRequest, ChatbotMessageRequest},
        knowledge::{CreateKnowledgeRequest, KnowledgeQuery, UpdateKnowledgeRequest},
    },
    repositories::KnowledgeFilter,
    state::AppState,
};

const DEFAULT_ANALYTICS_DAYS: i64 = 30;

pub fn router(state: &AppState) -> Router<AppState> {
    let widget = Router::new()
        .route("/api/chatbot/message", post(send_message))
        .route("/api/chatbot/history/:id", get(history))
        .route("/api/chatbot/close/:id", post(close))
        .route("/api/chatbot/feedback", post(feedback))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            optional_auth_middleware,
        ));

    let admin = Router::new()
        .route("/api/chatbot/analytics", get(analytics))
        .route(
            "/api/chatbot/knowledge",
            get(list_knowledge).post(create_knowledge),
        )
        .route("/api/chatbot/knowledge/categories", get(knowledge_categories))
        .route(
            "/api/chatbot/knowledge/:id",
            get(get_knowledge)
                .put(update_knowledge)
                .delete(delete_knowledge),
        )
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    widget.merge(admin)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestQuery {
    pub guest_id: Option<String>,
}

/// Bot session owned by the caller: their account, the guest id they present, or any staff member
async fn owned_bot_session(
    state: &AppState,
    id: Uuid,
    caller: &MaybeUser,
    guest_id: Option<&str>,
) -> ApiResult<ChatSession> {
    let session = state
        .repositories
        .chat
        .find_session(id)
        .await?
        .filter(|s| s.kind == SessionKind::Bot)
        .ok_or_else(|| ApiError::NotFound("Chat session not found".to_string()))?;

    let owns = match (&caller.0, session.user_id) {
        (Some(user), _) if user.is_staff() => true,
        (Some(user), Some(owner)) => user.id == owner,
        (_, None) => guest_id.is_some() && session.guest_id.as_deref() == guest_id,
        (None, Some(_)) => false,
    };

    if owns {
        Ok(session)
    } else {
        Err(ApiError::NotFound("Chat session not found".to_string()))
    }
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(caller): Extension<MaybeUser>,
    ValidJson(payload): ValidJson<ChatbotMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.validate().map_err(ApiError::Validation)?;

    let user_id = caller.0.as_ref().map(|u| u.id);
    let guest_id = payload.guest_id.as_deref().map(str::trim);
    if user_id.is_none() && guest_id.is_none() {
        return Err(ApiError::Validation(
            "guestId is required when not signed in".to_string(),
        ));
    }

    let reply = state
        .chatbot
        .handle_message(user_id, guest_id, &payload.message)
        .await?;

    Ok(Json(json!({ "success": true, "data": reply })))
}

pub async fn history(
    State(state): State<AppState>,
    Extension(caller): Extension<MaybeUser>,
    Path(id): Path<Uuid>,
    ValidQuery(query): ValidQuery<GuestQuery>,
) -> ApiResult<impl IntoResponse> {
    let session = owned_bot_session(&state, id, &caller, query.guest_id.as_deref()).await?;
    let messages = state.repositories.chat.messages(session.id).await?;

    Ok(Json(json!({
        "success": true,
        "data": { "session": session, "messages": messages },
    })))
}

pub async fn close(
    State(state): State<AppState>,
    Extension(caller): Extension<MaybeUser>,
    Path(id): Path<Uuid>,
    ValidQuery(query): ValidQuery<GuestQuery>,
) -> ApiResult<impl IntoResponse> {
    let session = owned_bot_session(&state, id, &caller, query.guest_id.as_deref()).await?;
    if session.status == ChatStatus::Closed {
        return Err(ApiError::BadRequest("Chat session is already closed".to_string()));
    }

    let closed = state
        .repositories
        .chat
        .transition(id, session.status, ChatStatus::Closed, None)
        .await?
        .ok_or_else(|| ApiError::Conflict("Chat session changed, try again".to_string()))?;

    Ok(Json(json!({ "success": true, "data": closed })))
}

pub async fn feedback(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<ChatbotFeedbackRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.validate().map_err(ApiError::Validation)?;

    if !state
        .repositories
        .chat
        .message_in_session(payload.message_id, payload.session_id)
        .await?
    {
        return Err(ApiError::NotFound("Message not found in this session".to_string()));
    }

    let comment = payload
        .feedback
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty());
    let id = state
        .repositories
        .chat
        .insert_feedback(payload.session_id, payload.message_id, payload.rating, comment)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": { "id": id } })),
    ))
}

/// Usage over a date range, the last 30 days by default
pub async fn analytics(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<AnalyticsQuery>,
) -> ApiResult<impl IntoResponse> {
    let end = query.end_date.unwrap_or_else(Utc::now);
    let start = query
        .start_date
        .unwrap_or_else(|| end - Duration::days(DEFAULT_ANALYTICS_DAYS));
    if start > end {
        return Err(ApiError::Validation(
            "startDate must be before endDate".to_string(),
        ));
    }

    let analytics = state.repositories.chat.analytics(start, end).await?;
    Ok(Json(json!({ "success": true, "data": analytics })))
}

pub async fn list_knowledge(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<KnowledgeQuery>,
) -> ApiResult<impl IntoResponse> {
    let pagination = Pagination::new(query.page, query.limit, MAX_LIMIT);
    let filter = KnowledgeFilter {
        category: search_term(query.category.as_deref()),
        search: search_term(query.search.as_deref()),
        is_active: query.is_active,
    };

    let (entries, total) = state
        .repositories
        .knowledge
        .list(&filter, pagination)
        .await?;

    Ok(Json(Paginated::new(entries, total, pagination)))
}

pub async fn knowledge_categories(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let categories = state.repositories.knowledge.categories().await?;
    Ok(Json(json!({ "success": true, "data": categories })))
}

pub async fn get_knowledge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let entry = state
        .repositories
        .knowledge
        .find(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Knowledge entry not found".to_string()))?;

    Ok(Json(json!({ "success": true, "data": entry })))
}

pub async fn create_knowledge(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<CreateKnowledgeRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.validate().map_err(ApiError::Validation)?;

    let entry = state.repositories.knowledge.create(&payload).await?;
    info!("Created knowledge entry {}", entry.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": entry })),
    ))
}

pub async fn update_knowledge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(payload): ValidJson<UpdateKnowledgeRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.validate().map_err(ApiError::Validation)?;

    let entry = state
        .repositories
        .knowledge
        .update(id, &payload)
        .await?
        .ok_or_else(|| ApiError::NotFound("Knowledge entry not found".to_string()))?;

    Ok(Json(json!({ "success": true, "data": entry })))
}

pub async fn delete_knowledge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    if !state.repositories.knowledge.delete(id).await? {
        return Err(ApiError::NotFound("Knowledge entry not found".to_string()));
    }

    Ok(Json(json!({ "success": true, "message": "Knowledge entry deleted" })))
}

#[cfg(test)]
mod tests {
    use crate::routes::{
        create_router,
        test_helpers::{body_json, request},
    };
    use crate::state::test_support;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_guest_message_needs_guest_id() {
        let app = create_router(test_support::state());
        let response = app
            .oneshot(request(
                "POST",
                "/api/chatbot/message",
                None,
                Some(r#"{"message":"Do you have oat milk?"}"#),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn test_message_rejects_unknown_fields() {
        let app = create_router(test_support::state());
        let response = app
            .oneshot(request(
                "POST",
                "/api/chatbot/message",
                None,
                Some(r#"{"message":"hi","guestId":"g-1","role":"admin"}"#),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_feedback_rating_range() {
        let body = format!(
            r#"{{"sessionId":"{}","messageId":"{}","rating":9}}"#,
            uuid::Uuid::new_v4(),
            uuid::Uuid::new_v4()
        );
        let app = create_router(test_support::state());
        let response = app
            .oneshot(request("POST", "/api/chatbot/feedback", None, Some(&body)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Rating must be between 1 and 5");
    }

    #[tokio::test]
    async fn test_knowledge_requires_token() {
        let app = create_router(test_support::state());
        let response = app
            .oneshot(request("GET", "/api/chatbot/knowledge", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
