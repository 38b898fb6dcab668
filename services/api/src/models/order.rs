//! Order models and the order status machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipping,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipping => "shipping",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Statuses reachable in one step
    pub fn next_statuses(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Confirmed, OrderStatus::Cancelled],
            OrderStatus::Confirmed => &[OrderStatus::Shipping, OrderStatus::Cancelled],
            OrderStatus::Shipping => &[OrderStatus::Delivered, OrderStatus::Cancelled],
            OrderStatus::Delivered | OrderStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.next_statuses().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.next_statuses().is_empty()
    }

    /// Customer-facing title for status notifications
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Order received",
            OrderStatus::Confirmed => "Order confirmed",
            OrderStatus::Shipping => "Order is on its way",
            OrderStatus::Delivered => "Order delivered",
            OrderStatus::Cancelled => "Order cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "shipping" => Ok(OrderStatus::Shipping),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderChannel {
    Online,
    Pos,
}

impl OrderChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderChannel::Online => "online",
            OrderChannel::Pos => "pos",
        }
    }
}

impl FromStr for OrderChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(OrderChannel::Online),
            "pos" => Ok(OrderChannel::Pos),
            other => Err(format!("unknown order channel: {}", other)),
        }
    }
}

/// Payment methods accepted online
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cod,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "cod",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }
}

/// Payment methods accepted at the counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PosPaymentMethod {
    #[default]
    Cash,
    Card,
    BankTransfer,
}

impl PosPaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PosPaymentMethod::Cash => "cash",
            PosPaymentMethod::Card => "card",
            PosPaymentMethod::BankTransfer => "bank_transfer",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub staff_id: Option<Uuid>,
    pub channel: OrderChannel,
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub discount_amount: i64,
    pub total: i64,
    pub status: OrderStatus,
    pub payment_method: String,
    pub recipient_name: Option<String>,
    pub phone: Option<String>,
    pub shipping_address: String,
    pub note: Option<String>,
    pub promotion_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Product snapshot shown next to an order line; `None` once the product row is gone
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemProduct {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub images: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemView {
    pub id: Uuid,
    pub quantity: i32,
    /// Unit price at purchase time
    pub price: i64,
    pub product: Option<OrderItemProduct>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItemView>,
}

/// Row in back-office order lists
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    #[serde(flatten)]
    pub order: Order,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub items_count: i64,
}

/// Result of a placed order, also what idempotent replays return
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    pub order_id: Uuid,
    pub total: i64,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub recipient_name: String,
    pub phone: String,
    pub address: String,
    pub note: Option<String>,
    pub payment_method: PaymentMethod,
    pub idempotency_key: Option<Uuid>,
    pub promotion_id: Option<Uuid>,
    pub discount_amount: Option<i64>,
}

impl CheckoutRequest {
    pub fn validate(&self) -> Result<(), String> {
        let name_len = self.recipient_name.trim().chars().count();
        if name_len < 2 {
            return Err("Recipient name must be at least 2 characters".to_string());
        }
        if name_len > 100 {
            return Err("Recipient name must be at most 100 characters".to_string());
        }
        common::validation::validate_phone(&self.phone)?;
        if self.address.trim().is_empty() {
            return Err("Address is required".to_string());
        }
        if self.discount_amount.is_some_and(|d| d < 0) {
            return Err("Discount amount must be zero or greater".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Direct order from a list of items, or from the cart when `items` is absent
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub items: Option<Vec<OrderLineRequest>>,
    pub payment_method: PaymentMethod,
    pub shipping_address: Option<String>,
    pub recipient_name: Option<String>,
    pub phone: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PosLineRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Counter price override
    pub price: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PosOrderRequest {
    pub items: Vec<PosLineRequest>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub payment_method: PosPaymentMethod,
    pub promotion_id: Option<Uuid>,
    pub discount_amount: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

/// Back-office order list filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub status: Option<OrderStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

/// POS history filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PosHistoryQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub payment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Confirmed));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Confirmed.can_transition_to(OrderStatus::Shipping));
        assert!(OrderStatus::Confirmed.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Shipping.can_transition_to(OrderStatus::Delivered));
        assert!(OrderStatus::Shipping.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Shipping));
        assert!(!OrderStatus::Shipping.can_transition_to(OrderStatus::Pending));

        let all = [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Shipping,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ];
        for next in all {
            assert!(!OrderStatus::Delivered.can_transition_to(next));
            assert!(!OrderStatus::Cancelled.can_transition_to(next));
        }
        assert!(OrderStatus::Delivered.is_terminal());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("shipping".parse::<OrderStatus>(), Ok(OrderStatus::Shipping));
        assert!("awaiting_payment".parse::<OrderStatus>().is_err());
        let status: OrderStatus = serde_json::from_str(r#""delivered""#).unwrap();
        assert_eq!(status, OrderStatus::Delivered);
    }

    #[test]
    fn test_checkout_validation() {
        let mut req: CheckoutRequest = serde_json::from_str(
            r#"{"recipientName":"Nguyen Van A","phone":"0901234567","address":"Quận 1, HCM","paymentMethod":"cod"}"#,
        )
        .unwrap();
        assert!(req.validate().is_ok());

        req.phone = "12345".to_string();
        assert!(req.validate().is_err());

        req.phone = "0901234567".to_string();
        req.address = "  ".to_string();
        assert_eq!(req.validate(), Err("Address is required".to_string()));
    }

    #[test]
    fn test_checkout_rejects_unknown_payment() {
        let result = serde_json::from_str::<CheckoutRequest>(
            r#"{"recipientName":"An","phone":"0901234567","address":"x","paymentMethod":"bitcoin"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_pos_payment_defaults_to_cash() {
        let req: PosOrderRequest = serde_json::from_str(
            r#"{"items":[{"productId":"7b0c5a52-3f0e-4a4e-9a57-3f4b8f3b9a10","quantity":1}]}"#,
        )
        .unwrap();
        assert_eq!(req.payment_method, PosPaymentMethod::Cash);
    }
}
