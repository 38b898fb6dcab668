//! Promotion codes and discount rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionType {
    Percentage,
    Fixed,
}

impl PromotionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromotionType::Percentage => "percentage",
            PromotionType::Fixed => "fixed",
        }
    }
}

impl FromStr for PromotionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(PromotionType::Percentage),
            "fixed" => Ok(PromotionType::Fixed),
            other => Err(format!("unknown promotion type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub promotion_type: PromotionType,
    pub value: i64,
    pub min_order_value: i64,
    pub max_discount: Option<i64>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Promotion {
    pub fn within_window(&self, now: DateTime<Utc>) -> bool {
        self.start_date.is_none_or(|start| now >= start) && self.end_date.is_none_or(|end| now <= end)
    }

    pub fn has_usage_left(&self) -> bool {
        self.usage_limit.is_none_or(|limit| self.used_count < limit)
    }

    /// Active, in its date window and not used up
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.within_window(now) && self.has_usage_left()
    }

    /// Discount for an order total; never more than the total
    pub fn discount_for(&self, order_total: i64) -> Result<i64, String> {
        if order_total < self.min_order_value {
            return Err(format!(
                "Minimum order value is {}",
                common::mailer::format_amount(self.min_order_value)
            ));
        }

        let discount = match self.promotion_type {
            PromotionType::Percentage => {
                let raw = i128::from(order_total) * i128::from(self.value) / 100;
                let raw = i64::try_from(raw).unwrap_or(i64::MAX);
                self.max_discount.map_or(raw, |cap| raw.min(cap))
            }
            PromotionType::Fixed => self.value,
        };

        Ok(discount.clamp(0, order_total.max(0)))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreatePromotionRequest {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub promotion_type: PromotionType,
    pub value: i64,
    pub min_order_value: Option<i64>,
    pub max_discount: Option<i64>,
    pub usage_limit: Option<i32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

impl CreatePromotionRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.code.trim().is_empty() || self.name.trim().is_empty() {
            return Err("Code and name are required".to_string());
        }
        validate_rules(
            Some(self.promotion_type),
            Some(self.value),
            self.usage_limit,
            self.start_date,
            self.end_date,
        )
    }
}

/// Partial update; `maxDiscount`, `usageLimit` and the dates are replaced as given
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct UpdatePromotionRequest {
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub promotion_type: Option<PromotionType>,
    pub value: Option<i64>,
    pub min_order_value: Option<i64>,
    pub max_discount: Option<i64>,
    pub usage_limit: Option<i32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

impl UpdatePromotionRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.code.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err("Code cannot be empty".to_string());
        }
        validate_rules(
            self.promotion_type,
            self.value,
            self.usage_limit,
            self.start_date,
            self.end_date,
        )
    }
}

fn validate_rules(
    promotion_type: Option<PromotionType>,
    value: Option<i64>,
    usage_limit: Option<i32>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
) -> Result<(), String> {
    if value.is_some_and(|v| v < 0) {
        return Err("Value must be zero or greater".to_string());
    }
    if promotion_type == Some(PromotionType::Percentage) && value.is_some_and(|v| v > 100) {
        return Err("Percentage value cannot exceed 100".to_string());
    }
    if usage_limit.is_some_and(|l| l < 0) {
        return Err("Usage limit must be zero or greater".to_string());
    }
    if let (Some(start), Some(end)) = (start_date, end_date) {
        if end < start {
            return Err("End date must be after start date".to_string());
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// `active`, `expired` or `inactive`
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePromotionQuery {
    pub order_total: Option<i64>,
}
