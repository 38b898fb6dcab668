//! In-process real-time events and the WebSocket that streams them

use axum::{
    Extension,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use common::jwt::Role;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{middleware::AuthUser, state::AppState};

const DEFAULT_CAPACITY: usize = 256;

/// Audience of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Staff,
    Kitchen,
    User(Uuid),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Staff => f.write_str("staff"),
            Channel::Kitchen => f.write_str("kitchen"),
            Channel::User(id) => write!(f, "user:{}", id),
        }
    }
}

impl Serialize for Channel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub channel: Channel,
    pub event: String,
    pub payload: Value,
}

/// Channels a connected user listens on
pub fn channels_for(user_id: Uuid, role: Role) -> Vec<Channel> {
    let mut channels = vec![Channel::User(user_id)];
    if role.is_staff() {
        channels.push(Channel::Staff);
        channels.push(Channel::Kitchen);
    }
    channels
}

/// Broadcast fan-out shared by every handler
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    shutdown: watch::Sender<bool>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        let (shutdown, _) = watch::channel(false);
        Self { sender, shutdown }
    }

    /// Publish to everyone listening on `channel`; having no listeners is fine
    pub fn publish(&self, channel: Channel, event: &str, payload: Value) {
        let event = Event {
            channel,
            event: event.to_string(),
            payload,
        };
        match self.sender.send(event) {
            Ok(receivers) => debug!("Published event to {} on {} receivers", channel, receivers),
            Err(_) => debug!("No listeners for event on {}", channel),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Ask open sockets to close
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        info!("Event bus shut down");
    }
}

/// `GET /api/events/ws`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.events, user))
}

async fn handle_socket(mut socket: WebSocket, bus: EventBus, user: AuthUser) {
    let channels = channels_for(user.id, user.role);
    let mut events = bus.subscribe();
    let mut shutdown = bus.shutdown_signal();
    info!("Event stream opened for user {}", user.id);

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) if channels.contains(&event.channel) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode event: {}", e);
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event stream for user {} skipped {} events", user.id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            },
            _ = shutdown.changed() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }

    info!("Event stream closed for user {}", user.id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::assert_ok;

    #[test]
    fn test_channel_names() {
        let id = Uuid::nil();
        assert_eq!(Channel::Staff.to_string(), "staff");
        assert_eq!(
            Channel::User(id).to_string(),
            "user:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_staff_get_shared_channels() {
        let id = Uuid::new_v4();
        assert_eq!(channels_for(id, Role::User), vec![Channel::User(id)]);

        let channels = channels_for(id, Role::Sales);
        assert!(channels.contains(&Channel::Staff));
        assert!(channels.contains(&Channel::Kitchen));
    }

    #[test]
    fn test_publish_without_listeners() {
        let bus = EventBus::new(4);
        bus.publish(Channel::Staff, "order:new", json!({ "total": 1 }));
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        let user = Uuid::new_v4();

        bus.publish(Channel::User(user), "notification:new", json!({ "title": "Hi" }));

        let event = assert_ok!(rx.recv().await);
        assert_eq!(event.channel, Channel::User(user));
        assert_eq!(event.event, "notification:new");

        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded["channel"], format!("user:{}", user));
    }

    #[tokio::test]
    async fn test_shutdown_notifies_listeners() {
        let bus = EventBus::new(4);
        let mut signal = bus.shutdown_signal();
        bus.shutdown();
        assert_ok!(signal.changed().await);
        assert!(*signal.borrow());
    }
}
