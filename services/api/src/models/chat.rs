//! Chat sessions, messages and chatbot payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Session lifecycle: `waiting -> active -> closed`, or `waiting -> closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    Waiting,
    Active,
    Closed,
}

impl ChatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatStatus::Waiting => "waiting",
            ChatStatus::Active => "active",
            ChatStatus::Closed => "closed",
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, ChatStatus::Closed)
    }
}

impl fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(ChatStatus::Waiting),
            "active" => Ok(ChatStatus::Active),
            "closed" => Ok(ChatStatus::Closed),
            other => Err(format!("unknown chat status: {}", other)),
        }
    }
}

/// Whether a session may move from `from` to `to`; `closed` has no way out
pub fn is_valid_status_transition(from: ChatStatus, to: ChatStatus) -> bool {
    matches!(
        (from, to),
        (ChatStatus::Waiting, ChatStatus::Active)
            | (ChatStatus::Waiting, ChatStatus::Closed)
            | (ChatStatus::Active, ChatStatus::Closed)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Human,
    Bot,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Human => "human",
            SessionKind::Bot => "bot",
        }
    }
}

impl FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(SessionKind::Human),
            "bot" => Ok(SessionKind::Bot),
            other => Err(format!("unknown session kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Customer,
    Staff,
    Bot,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderType::Customer => "customer",
            SenderType::Staff => "staff",
            SenderType::Bot => "bot",
        }
    }
}

impl FromStr for SenderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(SenderType::Customer),
            "staff" => Ok(SenderType::Staff),
            "bot" => Ok(SenderType::Bot),
            other => Err(format!("unknown sender type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub guest_id: Option<String>,
    pub staff_id: Option<Uuid>,
    pub kind: SessionKind,
    pub status: ChatStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl ChatSession {
    /// The customer who opened the session, or the staff member handling it
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.user_id == Some(user_id) || self.staff_id == Some(user_id)
    }
}

/// Session row in staff queues
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSessionView {
    #[serde(flatten)]
    pub session: ChatSession,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub staff_name: Option<String>,
    pub last_message: Option<String>,
    pub message_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender_type: SenderType,
    pub sender_id: String,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Message about to be stored
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: Uuid,
    pub sender_type: SenderType,
    pub sender_id: String,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
}

/// Field-specific problems with a message; empty when it can be stored
pub fn validate_message_data(session_id: &str, sender_id: &str, content: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if session_id.trim().is_empty() {
        errors.push("sessionId is required".to_string());
    }
    if sender_id.trim().is_empty() {
        errors.push("senderId is required".to_string());
    }
    if content.trim().is_empty() {
        errors.push("content is required".to_string());
    } else if content.chars().count() > MAX_MESSAGE_LENGTH {
        errors.push(format!(
            "content must be at most {} characters",
            MAX_MESSAGE_LENGTH
        ));
    }
    errors
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSessionRequest {
    /// Optional first message
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ChatbotMessageRequest {
    pub message: String,
    pub guest_id: Option<String>,
}

impl ChatbotMessageRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.message.trim().is_empty() {
            return Err("Message is required".to_string());
        }
        if self.message.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(format!(
                "Message must be at most {} characters",
                MAX_MESSAGE_LENGTH
            ));
        }
        if self
            .guest_id
            .as_deref()
            .is_some_and(|g| g.trim().is_empty() || g.len() > 100)
        {
            return Err("Invalid guest id".to_string());
        }
        Ok(())
    }
}

/// Answer returned to the chat widget
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatbotReply {
    pub session_id: Uuid,
    pub message: ChatMessage,
    pub intent: String,
    pub confidence: f64,
    pub source: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ChatbotFeedbackRequest {
    pub session_id: Uuid,
    pub message_id: Uuid,
    pub rating: i32,
    pub feedback: Option<String>,
}

impl ChatbotFeedbackRequest {
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=5).contains(&self.rating) {
            return Err("Rating must be between 1 and 5".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatbotAnalytics {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_sessions: i64,
    pub total_messages: i64,
    pub avg_messages_per_session: f64,
    pub feedback_count: i64,
    pub avg_rating: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(is_valid_status_transition(ChatStatus::Waiting, ChatStatus::Active));
        assert!(is_valid_status_transition(ChatStatus::Waiting, ChatStatus::Closed));
        assert!(is_valid_status_transition(ChatStatus::Active, ChatStatus::Closed));
    }

    #[test]
    fn test_closed_is_terminal() {
        for to in [ChatStatus::Waiting, ChatStatus::Active, ChatStatus::Closed] {
            assert!(!is_valid_status_transition(ChatStatus::Closed, to));
        }
        assert!(!is_valid_status_transition(ChatStatus::Active, ChatStatus::Waiting));
        assert!(!is_valid_status_transition(ChatStatus::Waiting, ChatStatus::Waiting));
    }

    #[test]
    fn test_message_validation_names_each_field() {
        assert!(validate_message_data("s1", "u1", "hello").is_empty());

        let errors = validate_message_data(" ", "", "\n\t");
        assert_eq!(
            errors,
            vec![
                "sessionId is required".to_string(),
                "senderId is required".to_string(),
                "content is required".to_string(),
            ]
        );

        assert_eq!(
            validate_message_data("s1", "u1", "   "),
            vec!["content is required".to_string()]
        );
    }

    #[test]
    fn test_feedback_rating_range() {
        let mut req = ChatbotFeedbackRequest {
            session_id: Uuid::new_v4(),
            message_id: Uuid::new_v4(),
            rating: 0,
            feedback: None,
        };
        assert!(req.validate().is_err());
        req.rating = 5;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_participants() {
        let customer = Uuid::new_v4();
        let staff = Uuid::new_v4();
        let session = ChatSession {
            id: Uuid::new_v4(),
            user_id: Some(customer),
            guest_id: None,
            staff_id: Some(staff),
            kind: SessionKind::Human,
            status: ChatStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            closed_at: None,
        };
        assert!(session.is_participant(customer));
        assert!(session.is_participant(staff));
        assert!(!session.is_participant(Uuid::new_v4()));
    }
}
