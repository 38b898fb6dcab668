//! Customer to staff chat

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, ValidJson, ValidQuery},
    events::Channel,
    listing::{ListParams, Paginated},
    middleware::{AuthUser, auth_middleware, require_staff},
    models::{
        ChatSession, ChatStatus, NewMessage, SenderType, SessionKind,
        chat::{
            CreateSessionRequest, SendMessageRequest, is_valid_status_transition,
            validate_message_data,
        },
    },
    state::AppState,
};

pub const CHAT_MESSAGE_EVENT: &str = "chat:message";
pub const CHAT_SESSION_EVENT: &str = "chat:session";

pub fn router(state: &AppState) -> Router<AppState> {
    let staff = Router::new()
        .route("/api/chat/sessions/open", get(open_sessions))
        .route("/api/chat/sessions/history", get(closed_sessions))
        .route("/api/chat/sessions/:id/join", put(join_session))
        .route_layer(middleware::from_fn(require_staff));

    Router::new()
        .route("/api/chat/sessions", get(my_sessions).post(create_session))
        .route(
            "/api/chat/sessions/:id/messages",
            get(list_messages).post(send_message),
        )
        .route("/api/chat/sessions/:id/close", put(close_session))
        .merge(staff)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
}

/// Session visible to the caller: its customer, or any staff member
async fn visible_session(state: &AppState, id: Uuid, user: &AuthUser) -> ApiResult<ChatSession> {
    state
        .repositories
        .chat
        .find_session(id)
        .await?
        .filter(|s| s.kind == SessionKind::Human)
        .filter(|s| s.is_participant(user.id) || user.is_staff())
        .ok_or_else(|| ApiError::NotFound("Chat session not found".to_string()))
}

fn check_transition(from: ChatStatus, to: ChatStatus) -> ApiResult<()> {
    if is_valid_status_transition(from, to) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "Cannot move chat session from {} to {}",
            from, to
        )))
    }
}

fn publish_session(state: &AppState, session: &ChatSession) {
    let payload = json!({ "session": session });
    if let Some(user_id) = session.user_id {
        state
            .events
            .publish(Channel::User(user_id), CHAT_SESSION_EVENT, payload.clone());
    }
    state.events.publish(Channel::Staff, CHAT_SESSION_EVENT, payload);
}

pub async fn create_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidJson(payload): ValidJson<CreateSessionRequest>,
) -> ApiResult<impl IntoResponse> {
    let first = payload
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty());
    if let Some(content) = first {
        let errors = validate_message_data("new", &user.id.to_string(), content);
        if !errors.is_empty() {
            return Err(ApiError::Validation(errors.join(", ")));
        }
    }

    let session = state
        .repositories
        .chat
        .create_session(Some(user.id), None, SessionKind::Human)
        .await?;

    if let Some(content) = first {
        state
            .repositories
            .chat
            .insert_message(&NewMessage {
                session_id: session.id,
                sender_type: SenderType::Customer,
                sender_id: user.id.to_string(),
                content: content.to_string(),
                metadata: None,
            })
            .await?;
    }

    info!("User {} opened chat session {}", user.id, session.id);
    publish_session(&state, &session);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": session })),
    ))
}

pub async fn my_sessions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let sessions = state.repositories.chat.sessions_for_user(user.id).await?;
    Ok(Json(json!({ "success": true, "data": sessions })))
}

/// Staff queue
pub async fn open_sessions(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let sessions = state.repositories.chat.open_sessions().await?;
    Ok(Json(json!({ "success": true, "data": sessions })))
}

pub async fn closed_sessions(
    State(state): State<AppState>,
    ValidQuery(params): ValidQuery<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let pagination = params.pagination();
    let (sessions, total) = state.repositories.chat.closed_sessions(pagination).await?;
    Ok(Json(Paginated::new(sessions, total, pagination)))
}

/// A staff member takes a waiting session
pub async fn join_session(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let session = visible_session(&state, id, &staff).await?;
    check_transition(session.status, ChatStatus::Active)?;

    let joined = state
        .repositories
        .chat
        .transition(id, session.status, ChatStatus::Active, Some(staff.id))
        .await?
        .ok_or_else(|| {
            ApiError::Conflict("Chat session was taken by someone else".to_string())
        })?;

    info!("Staff {} joined chat session {}", staff.id, id);
    publish_session(&state, &joined);

    Ok(Json(json!({ "success": true, "data": joined })))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    ValidJson(payload): ValidJson<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let errors = validate_message_data(&id.to_string(), &user.id.to_string(), &payload.content);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors.join(", ")));
    }

    let session = visible_session(&state, id, &user).await?;
    if session.status == ChatStatus::Closed {
        return Err(ApiError::BadRequest("Chat session is closed".to_string()));
    }

    let sender_type = if session.user_id == Some(user.id) {
        SenderType::Customer
    } else {
        SenderType::Staff
    };

    let message = state
        .repositories
        .chat
        .insert_message(&NewMessage {
            session_id: id,
            sender_type,
            sender_id: user.id.to_string(),
            content: payload.content.trim().to_string(),
            metadata: None,
        })
        .await?;

    let event = json!({ "message": message });
    if let Some(customer) = session.user_id {
        state
            .events
            .publish(Channel::User(customer), CHAT_MESSAGE_EVENT, event.clone());
    }
    state.events.publish(Channel::Staff, CHAT_MESSAGE_EVENT, event);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": message })),
    ))
}

/// Every message, whether the session is open or closed
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let session = visible_session(&state, id, &user).await?;
    let messages = state.repositories.chat.messages(session.id).await?;

    Ok(Json(json!({
        "success": true,
        "data": { "session": session, "messages": messages },
    })))
}

pub async fn close_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let session = visible_session(&state, id, &user).await?;
    check_transition(session.status, ChatStatus::Closed)?;

    let closed = state
        .repositories
        .chat
        .transition(id, session.status, ChatStatus::Closed, None)
        .await?
        .ok_or_else(|| ApiError::Conflict("Chat session changed, try again".to_string()))?;

    info!("Chat session {} closed by {}", id, user.id);
    publish_session(&state, &closed);

    Ok(Json(json!({ "success": true, "data": closed })))
}
