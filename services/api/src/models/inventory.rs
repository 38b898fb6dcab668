//! Warehouse stock movements and inventory views

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Largest single import, export or counted stock level
pub const MAX_MOVEMENT: i32 = 100_000;
/// Rows returned by the low-stock view
pub const LOW_STOCK_LIMIT: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    Import,
    Export,
    Adjustment,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Import => "import",
            MovementKind::Export => "export",
            MovementKind::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "import" => Ok(MovementKind::Import),
            "export" => Ok(MovementKind::Export),
            "adjust" | "adjustment" => Ok(MovementKind::Adjustment),
            other => Err(format!("Unknown stock movement type: {}", other)),
        }
    }
}

/// A requested change to one product's stock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Import(i32),
    Export(i32),
    /// Counted stock level replacing the current one
    Adjust(i32),
}

impl Movement {
    pub fn kind(&self) -> MovementKind {
        match self {
            Movement::Import(_) => MovementKind::Import,
            Movement::Export(_) => MovementKind::Export,
            Movement::Adjust(_) => MovementKind::Adjustment,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Movement::Import(quantity) | Movement::Export(quantity) => {
                if quantity < 1 {
                    return Err("Quantity must be at least 1".to_string());
                }
                if quantity > MAX_MOVEMENT {
                    return Err(format!("Quantity must be at most {}", MAX_MOVEMENT));
                }
            }
            Movement::Adjust(stock) => {
                if stock < 0 {
                    return Err("Stock must be zero or greater".to_string());
                }
                if stock > MAX_MOVEMENT {
                    return Err(format!("Stock must be at most {}", MAX_MOVEMENT));
                }
            }
        }
        Ok(())
    }

    /// Stock after applying the movement to `before`
    pub fn apply(&self, before: i32) -> Result<i32, String> {
        match *self {
            Movement::Import(quantity) => before
                .checked_add(quantity)
                .ok_or_else(|| "Stock would exceed the allowed maximum".to_string()),
            Movement::Export(quantity) if quantity > before => Err(format!(
                "Not enough stock. Currently in stock: {}",
                before
            )),
            Movement::Export(quantity) => Ok(before - quantity),
            Movement::Adjust(stock) => Ok(stock),
        }
    }

    /// Units recorded on the movement row; adjustments store the size of the correction
    pub fn recorded_quantity(&self, before: i32, after: i32) -> i32 {
        match *self {
            Movement::Import(quantity) | Movement::Export(quantity) => quantity,
            Movement::Adjust(_) => (after - before).abs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct StockMoveRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub reason: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AdjustStockRequest {
    pub product_id: Uuid,
    pub new_stock: i32,
    pub reason: Option<String>,
}

/// One row of the stock ledger
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockTransaction {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: Option<String>,
    #[serde(rename = "type")]
    pub kind: MovementKind,
    pub quantity: i32,
    pub reason: Option<String>,
    pub reference: Option<String>,
    pub reference_id: Option<Uuid>,
    pub stock_before: Option<i32>,
    pub stock_after: Option<i32>,
    pub created_by: Option<Uuid>,
    pub created_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Product as seen from the warehouse
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub images: serde_json::Value,
    pub brand: Option<String>,
    pub category_name: Option<String>,
    pub stock: i32,
    pub low_stock_threshold: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MovementTotals {
    pub quantity: i64,
    pub count: i64,
}

/// Movement totals per kind over a period
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeriodMovements {
    pub import: MovementTotals,
    pub export: MovementTotals,
    pub adjustment: MovementTotals,
}

impl PeriodMovements {
    /// Fold `(kind, quantity, count)` rows; unknown kinds are ignored
    pub fn from_rows(rows: impl IntoIterator<Item = (String, i64, i64)>) -> Self {
        let mut totals = PeriodMovements::default();
        for (kind, quantity, count) in rows {
            let slot = match kind.parse::<MovementKind>() {
                Ok(MovementKind::Import) => &mut totals.import,
                Ok(MovementKind::Export) => &mut totals.export,
                Ok(MovementKind::Adjustment) => &mut totals.adjustment,
                Err(_) => continue,
            };
            *slot = MovementTotals { quantity, count };
        }
        totals
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySummary {
    pub total_products: i64,
    pub total_stock: i64,
    pub low_stock_count: i64,
    pub out_of_stock_count: i64,
    pub today: PeriodMovements,
    pub week: PeriodMovements,
}

/// Stock held per category
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStockReport {
    pub category_id: Uuid,
    pub category_name: String,
    pub product_count: i64,
    pub total_stock: i64,
    /// Sum of stock times price
    pub total_value: i64,
    pub low_stock_count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub low_stock: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockHistoryQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub product_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LowStockQuery {
    /// Overrides each product's own threshold
    pub threshold: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_needs_enough_stock() {
        assert_eq!(Movement::Export(3).apply(5), Ok(2));
        assert_eq!(Movement::Export(5).apply(5), Ok(0));
        assert_eq!(
            Movement::Export(6).apply(5),
            Err("Not enough stock. Currently in stock: 5".to_string())
        );
    }

    #[test]
    fn test_import_and_adjust() {
        assert_eq!(Movement::Import(10).apply(5), Ok(15));
        assert!(Movement::Import(1).apply(i32::MAX).is_err());
        assert_eq!(Movement::Adjust(3).apply(12), Ok(3));
    }

    #[test]
    fn test_adjustment_records_correction_size() {
        let adjust = Movement::Adjust(3);
        assert_eq!(adjust.recorded_quantity(12, 3), 9);
        assert_eq!(Movement::Adjust(20).recorded_quantity(12, 20), 8);
        assert_eq!(Movement::Export(4).recorded_quantity(10, 6), 4);
    }

    #[test]
    fn test_movement_bounds() {
        assert!(Movement::Import(0).validate().is_err());
        assert!(Movement::Export(-2).validate().is_err());
        assert!(Movement::Import(MAX_MOVEMENT + 1).validate().is_err());
        assert!(Movement::Adjust(0).validate().is_ok());
        assert!(Movement::Adjust(-1).validate().is_err());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("adjust".parse::<MovementKind>(), Ok(MovementKind::Adjustment));
        assert_eq!("export".parse::<MovementKind>(), Ok(MovementKind::Export));
        assert!("transfer".parse::<MovementKind>().is_err());
        assert_eq!(MovementKind::Adjustment.to_string(), "adjustment");
    }

    #[test]
    fn test_period_totals_fold_rows() {
        let totals = PeriodMovements::from_rows(vec![
            ("import".to_string(), 40, 2),
            ("export".to_string(), 7, 3),
            ("legacy".to_string(), 99, 9),
        ]);
        assert_eq!(totals.import, MovementTotals { quantity: 40, count: 2 });
        assert_eq!(totals.export, MovementTotals { quantity: 7, count: 3 });
        assert_eq!(totals.adjustment, MovementTotals::default());
    }

    #[test]
    fn test_move_request_rejects_unknown_fields() {
        let result = serde_json::from_str::<StockMoveRequest>(
            r#"{"productId":"7b0c5a52-3f0e-4a4e-9a57-3f4b8f3b9a10","quantity":2,"stockAfter":99}"#,
        );
        assert!(result.is_err());
    }
}
