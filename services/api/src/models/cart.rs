use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cart line joined with its product
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub slug: String,
    pub price: i64,
    pub image: Option<String>,
    pub stock: i32,
    pub quantity: i32,
}

impl CartLine {
    pub fn line_total(&self) -> i64 {
        self.price.saturating_mul(i64::from(self.quantity))
    }
}

pub fn cart_subtotal(lines: &[CartLine]) -> i64 {
    lines
        .iter()
        .fold(0i64, |sum, line| sum.saturating_add(line.line_total()))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    pub quantity: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateCartRequest {
    pub quantity: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(price: i64, quantity: i32) -> CartLine {
        CartLine {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            name: "Cold Brew".to_string(),
            slug: "cold-brew".to_string(),
            price,
            image: None,
            stock: 10,
            quantity,
        }
    }

    #[test]
    fn test_subtotal() {
        let lines = vec![line(45_000, 2), line(30_000, 1)];
        assert_eq!(cart_subtotal(&lines), 120_000);
        assert_eq!(cart_subtotal(&[]), 0);
    }
}
