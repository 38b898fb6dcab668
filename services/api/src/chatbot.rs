//! Chatbot answering flow
//!
//! Curated knowledge entries win over the language model. Without a match the
//! message is classified, enriched with catalog or order data where relevant
//! and sent to the model with the recent conversation as context.

use common::mailer::format_amount;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::ApiResult,
    llm::{ChatTurn, LlmClient, TurnRole},
    models::{
        ChatMessage, ChatSession, ChatStatus, NewMessage, Product, SenderType, SessionKind,
        chat::ChatbotReply,
    },
    repositories::{ChatRepository, KnowledgeRepository, OrderRepository, ProductRepository},
};

/// Earlier messages sent to the model with each question
pub const CONTEXT_MESSAGES: i64 = 10;
const MAX_PROMPT_PRODUCTS: i64 = 5;

pub const FALLBACK_REPLY: &str = "Sorry, I can't answer right now. Please try again in a moment \
     or ask to talk with one of our staff.";

const STOP_WORDS: &[&str] = &[
    "tôi", "muốn", "cần", "có", "là", "của", "và", "cho", "về", "với", "được", "này", "đó",
    "thì", "sao", "gì", "nào", "bao", "nhiêu", "the", "and", "for", "with", "what", "how",
    "want", "you", "have",
];

const PRODUCT_KEYWORDS: &[&str] = &[
    "cà phê", "coffee", "espresso", "americano", "cappuccino", "latte", "mocha", "macchiato",
    "trà", "tea", "đào", "vải", "sen", "oolong", "matcha", "đá xay", "chocolate", "cookies",
    "cream", "dâu", "caramel", "nước ép", "sinh tố", "cam", "dưa hấu", "bơ", "xoài", "bánh",
    "tiramisu", "cheesecake", "croissant", "mousse", "snack", "khoai tây", "gà viên", "sandwich",
    "combo", "hạt", "arabica", "robusta", "blend",
];

// Broad menu words that always mean the customer is asking about products.
const MENU_KEYWORDS: &[&str] = &[
    "cà phê", "coffee", "trà", "tea", "đá xay", "sinh tố", "bánh", "snack",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    ProductInquiry,
    OrderTracking,
    Complaint,
    PurchaseIntent,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::ProductInquiry => "product_inquiry",
            Intent::OrderTracking => "order_tracking",
            Intent::Complaint => "complaint",
            Intent::PurchaseIntent => "purchase_intent",
            Intent::General => "general",
        }
    }

    fn from_label(label: &str) -> Self {
        match label.trim() {
            "product_inquiry" => Intent::ProductInquiry,
            "order_tracking" => Intent::OrderTracking,
            "complaint" => Intent::Complaint,
            "purchase_intent" => Intent::PurchaseIntent,
            _ => Intent::General,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntentGuess {
    pub intent: Intent,
    pub confidence: f64,
}

impl Default for IntentGuess {
    fn default() -> Self {
        Self {
            intent: Intent::General,
            confidence: 0.5,
        }
    }
}

/// How a message gets answered once the knowledge base had nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Promotions,
    Products,
    OrderTracking,
    Purchase,
    General,
}

pub fn intent_prompt(message: &str) -> String {
    format!(
        "Classify the intent of the following customer message and answer with JSON only:\n\
         {{\n  \"intent\": \"product_inquiry\" | \"order_tracking\" | \"complaint\" | \"general_question\" | \"purchase_intent\",\n  \
         \"confidence\": 0.0-1.0,\n  \"entities\": {{}}\n}}\n\nMessage: \"{}\"",
        message
    )
}

#[derive(Debug, Deserialize)]
struct RawIntent {
    intent: Option<String>,
    confidence: Option<f64>,
}

/// Read the first JSON object out of a model answer; anything unreadable is a general question
pub fn parse_intent(answer: &str) -> IntentGuess {
    static JSON_BLOCK: OnceLock<Regex> = OnceLock::new();
    let regex = JSON_BLOCK
        .get_or_init(|| Regex::new(r"\{[\s\S]*\}").expect("Failed to compile JSON block regex"));

    let Some(block) = regex.find(answer) else {
        return IntentGuess::default();
    };
    let Ok(raw) = serde_json::from_str::<RawIntent>(block.as_str()) else {
        return IntentGuess::default();
    };

    IntentGuess {
        intent: raw
            .intent
            .as_deref()
            .map(Intent::from_label)
            .unwrap_or(Intent::General),
        confidence: raw
            .confidence
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(0.5),
    }
}

/// Content words of a message followed by any known menu terms it mentions
pub fn extract_keywords(message: &str) -> Vec<String> {
    let lowered = message.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_')
        .collect();

    let mut keywords: Vec<String> = Vec::new();
    let words = cleaned
        .split_whitespace()
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w));
    let menu_terms = PRODUCT_KEYWORDS.iter().copied().filter(|k| lowered.contains(k));

    for keyword in words.chain(menu_terms) {
        if !keywords.iter().any(|k| k == keyword) {
            keywords.push(keyword.to_string());
        }
    }
    keywords
}

pub fn is_promotion_query(message: &str) -> bool {
    static PROMOTION: OnceLock<Regex> = OnceLock::new();
    let regex = PROMOTION.get_or_init(|| {
        Regex::new(r"(?i)khuyến mãi|giảm giá|\bsale\b|ưu đãi|promotion|discount")
            .expect("Failed to compile promotion regex")
    });
    regex.is_match(message)
}

pub fn mentions_menu(keywords: &[String]) -> bool {
    keywords.iter().any(|k| MENU_KEYWORDS.contains(&k.as_str()))
}

/// First order id written in the message
pub fn extract_order_id(message: &str) -> Option<Uuid> {
    static ORDER_ID: OnceLock<Regex> = OnceLock::new();
    let regex = ORDER_ID.get_or_init(|| {
        Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
            .expect("Failed to compile order id regex")
    });
    regex
        .find(message)
        .and_then(|m| Uuid::parse_str(m.as_str()).ok())
}

pub fn route_for(message: &str, keywords: &[String], guess: IntentGuess) -> Route {
    if is_promotion_query(message) {
        Route::Promotions
    } else if guess.intent == Intent::ProductInquiry || mentions_menu(keywords) {
        Route::Products
    } else if guess.intent == Intent::OrderTracking {
        Route::OrderTracking
    } else if guess.intent == Intent::PurchaseIntent {
        Route::Purchase
    } else {
        Route::General
    }
}

fn products_prompt(message: &str, products: &[Product]) -> String {
    let listing = products
        .iter()
        .enumerate()
        .map(|(i, p)| {
            format!(
                "{}. {}\n   - Price: {}\n   - Description: {}\n   - In stock: {}",
                i + 1,
                p.name,
                format_amount(p.price),
                p.description.as_deref().unwrap_or("House favourite"),
                p.stock
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Customer asks: \"{}\"\n\nMATCHING PRODUCTS:\n{}\n\n\
         Recommend the products that best fit the request, compare them briefly if there are \
         several, and invite the customer to order on the website.",
        message, listing
    )
}

fn promotions_prompt(message: &str, products: &[Product]) -> String {
    let listing = products
        .iter()
        .map(|p| {
            let original = p.original_price.unwrap_or(p.price);
            let percent = if original > 0 {
                (original - p.price) * 100 / original
            } else {
                0
            };
            format!(
                "- {}: {} ({}% off {})",
                p.name,
                format_amount(p.price),
                percent,
                format_amount(original)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\n[Products on sale:\n{}]\n\nPresent these products attractively and encourage the customer to try them.",
        message, listing
    )
}

fn to_turns(history: &[ChatMessage]) -> Vec<ChatTurn> {
    history
        .iter()
        .map(|m| ChatTurn {
            role: match m.sender_type {
                SenderType::Customer => TurnRole::User,
                SenderType::Staff | SenderType::Bot => TurnRole::Assistant,
            },
            content: m.content.clone(),
        })
        .collect()
}

/// Answers chatbot messages and keeps the bot sessions
#[derive(Clone)]
pub struct ChatbotService {
    chat: ChatRepository,
    knowledge: KnowledgeRepository,
    products: ProductRepository,
    orders: OrderRepository,
    llm: Arc<dyn LlmClient>,
}

impl ChatbotService {
    pub fn new(
        chat: ChatRepository,
        knowledge: KnowledgeRepository,
        products: ProductRepository,
        orders: OrderRepository,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            chat,
            knowledge,
            products,
            orders,
            llm,
        }
    }

    async fn session_for(&self, user_id: Option<Uuid>, guest_id: Option<&str>) -> ApiResult<ChatSession> {
        if let Some(session) = self.chat.latest_open_bot_session(user_id, guest_id).await? {
            return Ok(session);
        }
        let session = self
            .chat
            .create_session(user_id, guest_id, SessionKind::Bot)
            .await?;
        info!("Opened chatbot session {}", session.id);
        Ok(session)
    }

    /// Handle one customer message end to end and return the stored answer
    pub async fn handle_message(
        &self,
        user_id: Option<Uuid>,
        guest_id: Option<&str>,
        message: &str,
    ) -> ApiResult<ChatbotReply> {
        let message = message.trim();
        let session = self.session_for(user_id, guest_id).await?;
        let sender_id = user_id
            .map(|id| id.to_string())
            .or_else(|| guest_id.map(str::to_string))
            .unwrap_or_else(|| "guest".to_string());

        let question = self
            .chat
            .insert_message(&NewMessage {
                session_id: session.id,
                sender_type: SenderType::Customer,
                sender_id,
                content: message.to_string(),
                metadata: None,
            })
            .await?;

        if let Some(entry) = self.knowledge.best_match(message).await? {
            debug!("Knowledge entry '{}' answers session {}", entry.title, session.id);
            let answer = self
                .save_answer(
                    &session,
                    entry.content,
                    json!({ "source": "knowledge_base", "title": entry.title }),
                )
                .await?;
            return Ok(ChatbotReply {
                session_id: session.id,
                message: answer,
                intent: "knowledge_base".to_string(),
                confidence: 1.0,
                source: "knowledge_base".to_string(),
            });
        }

        let history: Vec<ChatMessage> = self
            .chat
            .recent_messages(session.id, CONTEXT_MESSAGES + 1)
            .await?
            .into_iter()
            .filter(|m| m.id != question.id)
            .collect();
        let turns = to_turns(&history);

        let guess = self.detect_intent(message).await;
        let keywords = extract_keywords(message);
        let route = route_for(message, &keywords, guess);
        debug!("Session {} routed to {:?} ({:?})", session.id, route, guess);

        let prompt = self.prompt_for(route, message, &keywords, user_id).await;

        let (text, source) = match self.llm.generate(&prompt, &turns).await {
            Ok(text) => (text, "ai"),
            Err(e) => {
                warn!("Chatbot model call failed for session {}: {}", session.id, e);
                (FALLBACK_REPLY.to_string(), "fallback")
            }
        };

        let answer = self
            .save_answer(
                &session,
                text,
                json!({
                    "intent": guess.intent.as_str(),
                    "confidence": guess.confidence,
                    "source": source,
                }),
            )
            .await?;

        Ok(ChatbotReply {
            session_id: session.id,
            message: answer,
            intent: guess.intent.as_str().to_string(),
            confidence: guess.confidence,
            source: source.to_string(),
        })
    }

    async fn detect_intent(&self, message: &str) -> IntentGuess {
        if !self.llm.is_enabled() {
            return IntentGuess::default();
        }
        match self.llm.generate(&intent_prompt(message), &[]).await {
            Ok(answer) => parse_intent(&answer),
            Err(e) => {
                warn!("Intent detection failed: {}", e);
                IntentGuess::default()
            }
        }
    }

    /// Prompt enriched for the route; data lookups that fail degrade to the bare message
    async fn prompt_for(
        &self,
        route: Route,
        message: &str,
        keywords: &[String],
        user_id: Option<Uuid>,
    ) -> String {
        match route {
            Route::Promotions => match self.products.on_sale(MAX_PROMPT_PRODUCTS).await {
                Ok(products) if !products.is_empty() => promotions_prompt(message, &products),
                Ok(_) => self.products_or_hint(message, keywords).await,
                Err(e) => {
                    warn!("Loading sale products failed: {}", e);
                    message.to_string()
                }
            },
            Route::Products => self.products_or_hint(message, keywords).await,
            Route::OrderTracking => self.order_prompt(message, user_id).await,
            Route::Purchase => format!(
                "{}\n\n[Guide the customer to order on the website or visit the store.]",
                message
            ),
            Route::General => message.to_string(),
        }
    }

    async fn products_or_hint(&self, message: &str, keywords: &[String]) -> String {
        match self.products.search_in_stock(keywords, MAX_PROMPT_PRODUCTS).await {
            Ok(products) if !products.is_empty() => products_prompt(message, &products),
            Ok(_) => format!(
                "{}\n\n[No specific product matched. Ask the customer for more details or suggest browsing the menu on the website.]",
                message
            ),
            Err(e) => {
                warn!("Product search for chatbot failed: {}", e);
                message.to_string()
            }
        }
    }

    /// Order lookups are limited to the signed-in customer's own orders
    async fn order_prompt(&self, message: &str, user_id: Option<Uuid>) -> String {
        let not_found = format!(
            "{}\n\n[No order information found. Ask the customer for their order number.]",
            message
        );
        let (Some(user_id), Some(order_id)) = (user_id, extract_order_id(message)) else {
            return not_found;
        };

        match self.orders.find(order_id).await {
            Ok(Some(order)) if order.user_id == Some(user_id) => format!(
                "{}\n\n[Order {}: status {}, total {}, placed {}]",
                message,
                order.id,
                order.status,
                format_amount(order.total),
                order.created_at.format("%Y-%m-%d %H:%M")
            ),
            Ok(_) => not_found,
            Err(e) => {
                warn!("Order lookup for chatbot failed: {}", e);
                not_found
            }
        }
    }

    async fn save_answer(
        &self,
        session: &ChatSession,
        content: String,
        metadata: Value,
    ) -> ApiResult<ChatMessage> {
        let answer = self
            .chat
            .insert_message(&NewMessage {
                session_id: session.id,
                sender_type: SenderType::Bot,
                sender_id: "bot".to_string(),
                content,
                metadata: Some(metadata),
            })
            .await?;

        if session.status == ChatStatus::Waiting {
            self.chat
                .transition(session.id, ChatStatus::Waiting, ChatStatus::Active, None)
                .await?;
        }
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_intent_from_fenced_json() {
        let answer = "```json\n{\"intent\": \"order_tracking\", \"confidence\": 0.92, \"entities\": {}}\n```";
        let guess = parse_intent(answer);
        assert_eq!(guess.intent, Intent::OrderTracking);
        assert!((guess.confidence - 0.92).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_intent_falls_back() {
        assert_eq!(parse_intent("I think they want coffee"), IntentGuess::default());
        assert_eq!(parse_intent("{not json}"), IntentGuess::default());

        let guess = parse_intent(r#"{"intent": "general_question"}"#);
        assert_eq!(guess.intent, Intent::General);
        assert_eq!(guess.confidence, 0.5);
    }

    #[test]
    fn test_parse_intent_clamps_confidence() {
        let guess = parse_intent(r#"{"intent": "complaint", "confidence": 3}"#);
        assert_eq!(guess.intent, Intent::Complaint);
        assert_eq!(guess.confidence, 1.0);
    }

    #[test]
    fn test_extract_keywords() {
        let keywords = extract_keywords("Tôi muốn uống cà phê sữa đá!");
        assert!(keywords.contains(&"uống".to_string()));
        assert!(keywords.contains(&"cà phê".to_string()));
        assert!(!keywords.contains(&"tôi".to_string()));
        assert!(!keywords.contains(&"cà".to_string()));
    }

    #[test]
    fn test_extract_keywords_no_repeats() {
        let keywords = extract_keywords("latte latte LATTE");
        assert_eq!(keywords, vec!["latte".to_string()]);
    }

    #[test]
    fn test_promotion_queries() {
        assert!(is_promotion_query("Có chương trình khuyến mãi nào không?"));
        assert!(is_promotion_query("Any discount today?"));
        assert!(is_promotion_query("What is on SALE"));
        assert!(!is_promotion_query("Where is my order"));
    }

    #[test]
    fn test_extract_order_id() {
        let id = Uuid::new_v4();
        let message = format!("Where is order #{} please", id);
        assert_eq!(extract_order_id(&message), Some(id));
        assert_eq!(extract_order_id("order #12345"), None);
    }

    #[test]
    fn test_routing_priority() {
        let tracking = IntentGuess {
            intent: Intent::OrderTracking,
            confidence: 0.9,
        };
        let general = IntentGuess::default();

        // promotions beat every classification
        assert_eq!(route_for("giảm giá cà phê", &[], tracking), Route::Promotions);

        let keywords = extract_keywords("I'd like some tea");
        assert_eq!(route_for("I'd like some tea", &keywords, tracking), Route::Products);

        assert_eq!(route_for("where is it", &[], tracking), Route::OrderTracking);

        let purchase = IntentGuess {
            intent: Intent::PurchaseIntent,
            confidence: 0.8,
        };
        assert_eq!(route_for("how do I buy", &[], purchase), Route::Purchase);
        assert_eq!(route_for("hello", &[], general), Route::General);
    }

    #[test]
    fn test_history_roles() {
        let message = |sender_type| ChatMessage {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            sender_type,
            sender_id: "x".to_string(),
            content: "hi".to_string(),
            metadata: None,
            created_at: chrono::Utc::now(),
        };
        let turns = to_turns(&[message(SenderType::Customer), message(SenderType::Bot)]);
        assert_eq!(turns[0].role, TurnRole::User);
        assert_eq!(turns[1].role, TurnRole::Assistant);
    }
}
