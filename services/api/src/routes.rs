//! API service routes
//!
//! Every area builds its own router with full paths and its own guards; they
//! are merged here so that public and protected handlers can share a prefix.

use axum::{Json, Router, middleware, response::IntoResponse, routing::get};
use serde_json::json;

use crate::{events::ws_handler, middleware::auth_middleware, state::AppState};

mod admin;
mod cart;
mod catalog;
mod chat;
mod chatbot;
mod compare;
mod notifications;
mod orders;
mod pos;
mod promotions;
mod wishlist;

pub(crate) use catalog::invalidate_catalog;

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let events = Router::new()
        .route("/api/events/ws", get(ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(catalog::router())
        .merge(cart::router(&state))
        .merge(wishlist::router(&state))
        .merge(orders::router(&state))
        .merge(pos::router(&state))
        .merge(admin::router(&state))
        .merge(promotions::router(&state))
        .merge(notifications::router(&state))
        .merge(chat::router(&state))
        .merge(chatbot::router(&state))
        .merge(compare::router(&state))
        .merge(events)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "api-service"
    }))
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, header},
        response::Response,
    };

    pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    pub async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
