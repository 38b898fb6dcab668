//! Order placement and order state changes
//!
//! Every path that touches stock runs in one transaction: products are locked
//! with `FOR UPDATE`, shortages are collected before anything is written, and
//! each decrement is guarded by `stock >= quantity` so a lost race aborts the
//! whole order instead of driving stock negative. Emails and events go out
//! only after commit and never fail the request.

use chrono::{DateTime, Utc};
use common::{
    cache::CacheStore,
    mailer::{Mailer, OrderEmail, OrderEmailLine, OutboundEmail},
};
use serde_json::json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction, postgres::PgRow};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, StockShortage},
    events::{Channel, EventBus},
    idempotency,
    models::{
        Order, OrderChannel, OrderReceipt, OrderStatus, Promotion,
        order::{CheckoutRequest, CreateOrderRequest, PosOrderRequest},
    },
    notifier::{NotificationService, ORDER_STATUS_EVENT, short_order_id},
    repositories::{
        order::{ORDER_COLUMNS, map_order},
        promotion::{PROMOTION_COLUMNS, map_promotion},
    },
    shipping::calculate_shipping,
};

pub const NEW_ORDER_EVENT: &str = "order:new";
pub const KITCHEN_ITEM_EVENT: &str = "kitchen:new-item";

const TAKEAWAY_ADDRESS: &str = "Take away";
const IN_STORE_ADDRESS: &str = "In store";
const WALK_IN_CUSTOMER: &str = "Walk-in customer";

/// One requested line before it is priced against the product row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Counter price override
    pub price: Option<i64>,
}

/// A line priced and checked against a locked product row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub unit_price: i64,
    pub quantity: i32,
    pub available: i32,
}

impl PricedLine {
    /// `None` when the amount does not fit an i64
    pub fn line_total(&self) -> Option<i64> {
        self.unit_price.checked_mul(i64::from(self.quantity))
    }
}

fn amount_too_large() -> ApiError {
    ApiError::Validation("Order amount is too large".to_string())
}

#[derive(Debug, Clone)]
struct LockedProduct {
    id: Uuid,
    name: String,
    image: Option<String>,
    price: i64,
    stock: i32,
}

/// Outcome of a storefront checkout
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub receipt: OrderReceipt,
    /// The receipt came from an earlier request with the same idempotency key
    pub duplicate: bool,
}

/// Combine repeated products, keeping first-seen order and the first price override
pub fn merge_requests(lines: &[LineRequest]) -> Vec<LineRequest> {
    let mut merged: Vec<LineRequest> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(line.quantity);
                existing.price = existing.price.or(line.price);
            }
            None => merged.push(*line),
        }
    }
    merged
}

fn validate_quantities(lines: &[LineRequest]) -> ApiResult<()> {
    for line in lines {
        common::validation::validate_quantity(line.quantity).map_err(ApiError::Validation)?;
        if let Some(price) = line.price {
            common::validation::validate_price(price).map_err(ApiError::Validation)?;
        }
    }
    Ok(())
}

fn price_lines(requests: &[LineRequest], products: &[LockedProduct]) -> ApiResult<Vec<PricedLine>> {
    requests
        .iter()
        .map(|request| {
            let product = products
                .iter()
                .find(|p| p.id == request.product_id)
                .ok_or_else(|| {
                    ApiError::NotFound(format!("Product {} not found", request.product_id))
                })?;

            Ok(PricedLine {
                product_id: product.id,
                name: product.name.clone(),
                image: product.image.clone(),
                unit_price: request.price.unwrap_or(product.price),
                quantity: request.quantity,
                available: product.stock,
            })
        })
        .collect()
}

/// Every line asking for more than is on hand
pub fn find_shortages(lines: &[PricedLine]) -> Vec<StockShortage> {
    lines
        .iter()
        .filter(|line| line.quantity > line.available)
        .map(|line| StockShortage {
            name: line.name.clone(),
            requested: line.quantity,
            available: line.available.max(0),
        })
        .collect()
}

pub fn subtotal_of(lines: &[PricedLine]) -> ApiResult<i64> {
    lines.iter().try_fold(0i64, |sum, line| {
        line.line_total()
            .and_then(|total| sum.checked_add(total))
            .ok_or_else(amount_too_large)
    })
}

pub fn order_total(subtotal: i64, shipping_fee: i64, discount: i64) -> ApiResult<i64> {
    subtotal
        .checked_add(shipping_fee)
        .and_then(|total| total.checked_sub(discount))
        .map(|total| total.max(0))
        .ok_or_else(amount_too_large)
}

/// Counter discounts are taken as given but never exceed the subtotal
pub fn counter_discount(requested: Option<i64>, subtotal: i64) -> i64 {
    requested.unwrap_or(0).max(0).min(subtotal.max(0))
}

/// Storefront discount: zero unless the promotion can be redeemed right now.
///
/// The amount is recomputed from the promotion; a client-sent amount can only lower it.
pub fn promotion_discount(
    promotion: Option<&Promotion>,
    requested: Option<i64>,
    subtotal: i64,
    now: DateTime<Utc>,
) -> i64 {
    let Some(promotion) = promotion.filter(|p| p.is_redeemable(now)) else {
        return 0;
    };

    let allowed = promotion.discount_for(subtotal).unwrap_or(0);
    match requested {
        Some(requested) => requested.max(0).min(allowed),
        None => allowed,
    }
}

fn map_locked(row: &PgRow) -> LockedProduct {
    LockedProduct {
        id: row.get("id"),
        name: row.get("name"),
        image: row.get("image"),
        price: row.get("price"),
        stock: row.get("stock"),
    }
}

/// Cart lines of a user with their product rows locked
async fn lock_cart(tx: &mut Transaction<'_, Postgres>, user_id: Uuid) -> ApiResult<Vec<PricedLine>> {
    let rows = sqlx::query(
        "SELECT p.id, p.name, p.images->>0 AS image, p.price, p.stock, ci.quantity \
         FROM cart_items ci JOIN products p ON p.id = ci.product_id \
         WHERE ci.user_id = $1 AND p.status = 'active' \
         ORDER BY p.id FOR UPDATE OF p",
    )
    .bind(user_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let product = map_locked(row);
            PricedLine {
                product_id: product.id,
                name: product.name,
                image: product.image,
                unit_price: product.price,
                quantity: row.get("quantity"),
                available: product.stock,
            }
        })
        .collect())
}

/// Lock the requested active products and price the lines against them
async fn lock_products(
    tx: &mut Transaction<'_, Postgres>,
    requests: &[LineRequest],
) -> ApiResult<Vec<PricedLine>> {
    let ids: Vec<Uuid> = requests.iter().map(|r| r.product_id).collect();
    let rows = sqlx::query(
        "SELECT id, name, images->>0 AS image, price, stock FROM products \
         WHERE id = ANY($1) AND status = 'active' ORDER BY id FOR UPDATE",
    )
    .bind(&ids)
    .fetch_all(&mut **tx)
    .await?;

    let products: Vec<LockedProduct> = rows.iter().map(map_locked).collect();
    price_lines(requests, &products)
}

async fn lock_promotion(
    tx: &mut Transaction<'_, Postgres>,
    promotion_id: Uuid,
) -> ApiResult<Option<Promotion>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM promotions WHERE id = $1 FOR UPDATE",
        PROMOTION_COLUMNS
    ))
    .bind(promotion_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.as_ref().map(map_promotion).transpose()?)
}

/// Order row values; amounts are already computed
struct NewOrder<'a> {
    user_id: Option<Uuid>,
    staff_id: Option<Uuid>,
    channel: OrderChannel,
    status: OrderStatus,
    subtotal: i64,
    shipping_fee: i64,
    discount_amount: i64,
    payment_method: &'a str,
    recipient_name: Option<&'a str>,
    phone: Option<&'a str>,
    shipping_address: &'a str,
    note: Option<&'a str>,
    promotion_id: Option<Uuid>,
}

/// Insert the order and its lines, then take the stock
async fn insert_order(
    tx: &mut Transaction<'_, Postgres>,
    order: &NewOrder<'_>,
    lines: &[PricedLine],
) -> ApiResult<Order> {
    let total = order_total(order.subtotal, order.shipping_fee, order.discount_amount)?;

    let row = sqlx::query(&format!(
        "INSERT INTO orders AS o (user_id, staff_id, channel, subtotal, shipping_fee, \
         discount_amount, total, status, payment_method, recipient_name, phone, \
         shipping_address, note, promotion_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) RETURNING {}",
        ORDER_COLUMNS
    ))
    .bind(order.user_id)
    .bind(order.staff_id)
    .bind(order.channel.as_str())
    .bind(order.subtotal)
    .bind(order.shipping_fee)
    .bind(order.discount_amount)
    .bind(total)
    .bind(order.status.as_str())
    .bind(order.payment_method)
    .bind(order.recipient_name)
    .bind(order.phone)
    .bind(order.shipping_address)
    .bind(order.note)
    .bind(order.promotion_id)
    .fetch_one(&mut **tx)
    .await?;
    let created = map_order(&row)?;

    let mut items =
        QueryBuilder::<Postgres>::new("INSERT INTO order_items (order_id, product_id, quantity, price) ");
    items.push_values(lines, |mut b, line| {
        b.push_bind(created.id)
            .push_bind(line.product_id)
            .push_bind(line.quantity)
            .push_bind(line.unit_price);
    });
    items.build().execute(&mut **tx).await?;

    for line in lines {
        let updated = sqlx::query(
            "UPDATE products SET stock = stock - $1, updated_at = NOW() \
             WHERE id = $2 AND stock >= $1 AND status = 'active' RETURNING stock",
        )
        .bind(line.quantity)
        .bind(line.product_id)
        .fetch_optional(&mut **tx)
        .await?;

        if updated.is_none() {
            warn!(
                "Stock for {} changed under order {}, rolling back",
                line.product_id, created.id
            );
            return Err(ApiError::InsufficientStock(vec![StockShortage {
                name: line.name.clone(),
                requested: line.quantity,
                available: line.available.max(0),
            }]));
        }
    }

    Ok(created)
}

/// Count one use of a promotion; fails when the limit was reached concurrently
async fn consume_promotion(
    tx: &mut Transaction<'_, Postgres>,
    promotion_id: Uuid,
    user_id: Option<Uuid>,
    order_id: Uuid,
    discount: i64,
) -> ApiResult<()> {
    let consumed = sqlx::query(
        "UPDATE promotions SET used_count = used_count + 1, updated_at = NOW() \
         WHERE id = $1 AND (usage_limit IS NULL OR used_count < usage_limit)",
    )
    .bind(promotion_id)
    .execute(&mut **tx)
    .await?;

    if consumed.rows_affected() == 0 {
        return Err(ApiError::PromotionExhausted);
    }

    sqlx::query(
        "INSERT INTO promotion_usage (promotion_id, user_id, order_id, discount_amount) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(promotion_id)
    .bind(user_id)
    .bind(order_id)
    .bind(discount)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Put back the stock of every line of an order
async fn restore_stock(tx: &mut Transaction<'_, Postgres>, order_id: Uuid) -> ApiResult<u64> {
    let restored = sqlx::query(
        "UPDATE products p SET stock = p.stock + oi.quantity, updated_at = NOW() \
         FROM order_items oi WHERE oi.order_id = $1 AND oi.product_id = p.id",
    )
    .bind(order_id)
    .execute(&mut **tx)
    .await?;

    Ok(restored.rows_affected())
}

async fn set_status(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    status: OrderStatus,
) -> ApiResult<Order> {
    let row = sqlx::query(&format!(
        "UPDATE orders AS o SET status = $2, updated_at = NOW() WHERE o.id = $1 RETURNING {}",
        ORDER_COLUMNS
    ))
    .bind(order_id)
    .bind(status.as_str())
    .fetch_one(&mut **tx)
    .await?;

    Ok(map_order(&row)?)
}

async fn lock_order(tx: &mut Transaction<'_, Postgres>, order_id: Uuid) -> ApiResult<Option<Order>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM orders o WHERE o.id = $1 FOR UPDATE",
        ORDER_COLUMNS
    ))
    .bind(order_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.as_ref().map(map_order).transpose()?)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Places orders and moves them through their lifecycle
#[derive(Clone)]
pub struct OrderService {
    pool: PgPool,
    cache: CacheStore,
    mailer: Arc<dyn Mailer>,
    events: EventBus,
    notifier: NotificationService,
}

impl OrderService {
    pub fn new(
        pool: PgPool,
        cache: CacheStore,
        mailer: Arc<dyn Mailer>,
        events: EventBus,
        notifier: NotificationService,
    ) -> Self {
        Self {
            pool,
            cache,
            mailer,
            events,
            notifier,
        }
    }

    /// Turn the user's cart into a pending order
    pub async fn checkout(
        &self,
        user_id: Uuid,
        email: &str,
        req: &CheckoutRequest,
    ) -> ApiResult<CheckoutOutcome> {
        req.validate().map_err(ApiError::Validation)?;

        if let Some(key) = req.idempotency_key {
            if let Some(receipt) = idempotency::lookup(&self.cache, user_id, key).await {
                info!("Replaying checkout {} for user {}", key, user_id);
                return Ok(CheckoutOutcome {
                    receipt,
                    duplicate: true,
                });
            }
        }

        let mut tx = self.pool.begin().await?;

        let lines = lock_cart(&mut tx, user_id).await?;
        if lines.is_empty() {
            return Err(ApiError::BadRequest("Cart is empty".to_string()));
        }
        let shortages = find_shortages(&lines);
        if !shortages.is_empty() {
            return Err(ApiError::InsufficientStock(shortages));
        }

        let subtotal = subtotal_of(&lines)?;
        let shipping = calculate_shipping(&req.address, subtotal);

        let promotion = match req.promotion_id {
            Some(id) => lock_promotion(&mut tx, id).await?,
            None => None,
        };
        let discount = promotion_discount(promotion.as_ref(), req.discount_amount, subtotal, Utc::now());
        let promotion_id = promotion.filter(|_| discount > 0).map(|p| p.id);

        let order = insert_order(
            &mut tx,
            &NewOrder {
                user_id: Some(user_id),
                staff_id: None,
                channel: OrderChannel::Online,
                status: OrderStatus::Pending,
                subtotal,
                shipping_fee: shipping.fee,
                discount_amount: discount,
                payment_method: req.payment_method.as_str(),
                recipient_name: Some(req.recipient_name.trim()),
                phone: Some(req.phone.trim()),
                shipping_address: req.address.trim(),
                note: non_blank(req.note.as_deref()),
                promotion_id,
            },
            &lines,
        )
        .await?;

        if let Some(promotion_id) = promotion_id {
            consume_promotion(&mut tx, promotion_id, Some(user_id), order.id, discount).await?;
        }

        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(
            "Order {} placed by {} ({} lines, total {})",
            order.id,
            user_id,
            lines.len(),
            order.total
        );

        let receipt = OrderReceipt {
            order_id: order.id,
            total: order.total,
            status: order.status,
        };
        if let Some(key) = req.idempotency_key {
            idempotency::remember(&self.cache, user_id, key, &receipt).await;
        }

        self.send_confirmation(email, &order, &lines);
        self.announce(&order, &lines);

        Ok(CheckoutOutcome {
            receipt,
            duplicate: false,
        })
    }

    /// Order from an explicit item list, or from the cart when no items are given
    pub async fn create_order(
        &self,
        user_id: Uuid,
        email: &str,
        req: &CreateOrderRequest,
    ) -> ApiResult<Order> {
        if let Some(phone) = non_blank(req.phone.as_deref()) {
            common::validation::validate_phone(phone).map_err(ApiError::Validation)?;
        }

        let requests = match &req.items {
            Some(items) => {
                if items.is_empty() {
                    return Err(ApiError::BadRequest("Order has no items".to_string()));
                }
                let requests: Vec<LineRequest> = items
                    .iter()
                    .map(|item| LineRequest {
                        product_id: item.product_id,
                        quantity: item.quantity,
                        price: None,
                    })
                    .collect();
                validate_quantities(&requests)?;
                let merged = merge_requests(&requests);
                validate_quantities(&merged)?;
                Some(merged)
            }
            None => {
                if non_blank(req.shipping_address.as_deref()).is_none() {
                    return Err(ApiError::Validation("Shipping address is required".to_string()));
                }
                None
            }
        };

        let mut tx = self.pool.begin().await?;

        let lines = match &requests {
            Some(requests) => lock_products(&mut tx, requests).await?,
            None => lock_cart(&mut tx, user_id).await?,
        };
        if lines.is_empty() {
            return Err(ApiError::BadRequest("Cart is empty".to_string()));
        }
        let shortages = find_shortages(&lines);
        if !shortages.is_empty() {
            return Err(ApiError::InsufficientStock(shortages));
        }

        let from_cart = requests.is_none();
        let subtotal = subtotal_of(&lines)?;
        let address = non_blank(req.shipping_address.as_deref()).unwrap_or(TAKEAWAY_ADDRESS);
        // direct orders are collected, only cart orders ship
        let shipping_fee = if from_cart {
            calculate_shipping(address, subtotal).fee
        } else {
            0
        };

        let order = insert_order(
            &mut tx,
            &NewOrder {
                user_id: Some(user_id),
                staff_id: None,
                channel: OrderChannel::Online,
                status: OrderStatus::Pending,
                subtotal,
                shipping_fee,
                discount_amount: 0,
                payment_method: req.payment_method.as_str(),
                recipient_name: non_blank(req.recipient_name.as_deref()),
                phone: non_blank(req.phone.as_deref()),
                shipping_address: address,
                note: non_blank(req.note.as_deref()),
                promotion_id: None,
            },
            &lines,
        )
        .await?;

        if from_cart {
            sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!("Order {} created by {} (from cart: {})", order.id, user_id, from_cart);

        self.send_confirmation(email, &order, &lines);
        self.announce(&order, &lines);

        Ok(order)
    }

    /// Counter sale: confirmed immediately and recorded against the staff member
    pub async fn create_pos_order(
        &self,
        staff_id: Uuid,
        staff_email: &str,
        req: &PosOrderRequest,
    ) -> ApiResult<Order> {
        if req.items.is_empty() {
            return Err(ApiError::BadRequest("Order has no items".to_string()));
        }
        if let Some(phone) = non_blank(req.customer_phone.as_deref()) {
            common::validation::validate_phone(phone).map_err(ApiError::Validation)?;
        }

        let requests: Vec<LineRequest> = req
            .items
            .iter()
            .map(|item| LineRequest {
                product_id: item.product_id,
                quantity: item.quantity,
                price: item.price,
            })
            .collect();
        validate_quantities(&requests)?;
        let requests = merge_requests(&requests);
        validate_quantities(&requests)?;

        let mut tx = self.pool.begin().await?;

        if let Some(customer_id) = req.customer_id {
            let found: bool = sqlx::query("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1) AS found")
                .bind(customer_id)
                .fetch_one(&mut *tx)
                .await?
                .get("found");
            if !found {
                return Err(ApiError::NotFound("Customer not found".to_string()));
            }
        }

        let lines = lock_products(&mut tx, &requests).await?;
        let shortages = find_shortages(&lines);
        if !shortages.is_empty() {
            return Err(ApiError::InsufficientStock(shortages));
        }

        let subtotal = subtotal_of(&lines)?;
        let discount = counter_discount(req.discount_amount, subtotal);

        if let Some(promotion_id) = req.promotion_id {
            match lock_promotion(&mut tx, promotion_id).await? {
                Some(p) if p.is_active && p.within_window(Utc::now()) => {
                    if !p.has_usage_left() {
                        return Err(ApiError::PromotionExhausted);
                    }
                }
                _ => return Err(ApiError::BadRequest("Invalid promotion code".to_string())),
            }
        }

        let note = format!("POS sale by {}", staff_email);
        let order = insert_order(
            &mut tx,
            &NewOrder {
                user_id: req.customer_id,
                staff_id: Some(staff_id),
                channel: OrderChannel::Pos,
                status: OrderStatus::Confirmed,
                subtotal,
                shipping_fee: 0,
                discount_amount: discount,
                payment_method: req.payment_method.as_str(),
                recipient_name: Some(
                    non_blank(req.customer_name.as_deref()).unwrap_or(WALK_IN_CUSTOMER),
                ),
                phone: non_blank(req.customer_phone.as_deref()),
                shipping_address: IN_STORE_ADDRESS,
                note: Some(&note),
                promotion_id: req.promotion_id,
            },
            &lines,
        )
        .await?;

        let mut movements = QueryBuilder::<Postgres>::new(
            "INSERT INTO stock_transactions (product_id, type, quantity, reason, reference_id, created_by) ",
        );
        movements.push_values(&lines, |mut b, line| {
            b.push_bind(line.product_id)
                .push_bind("export")
                .push_bind(line.quantity)
                .push_bind("POS sale")
                .push_bind(order.id)
                .push_bind(staff_id);
        });
        movements.build().execute(&mut *tx).await?;

        if let Some(promotion_id) = req.promotion_id {
            consume_promotion(&mut tx, promotion_id, req.customer_id, order.id, discount).await?;
        }

        tx.commit().await?;
        info!("POS order {} by {} (total {})", order.id, staff_email, order.total);

        self.announce(&order, &lines);
        Ok(order)
    }

    /// Customer cancellation of their own pending order
    pub async fn cancel(&self, order_id: Uuid, user_id: Uuid) -> ApiResult<Order> {
        let mut tx = self.pool.begin().await?;

        let order = lock_order(&mut tx, order_id)
            .await?
            .filter(|o| o.user_id == Some(user_id))
            .ok_or_else(|| ApiError::NotFound("Order not found".to_string()))?;

        if order.status != OrderStatus::Pending {
            return Err(ApiError::BadRequest(
                "Only pending orders can be cancelled".to_string(),
            ));
        }

        restore_stock(&mut tx, order_id).await?;
        let cancelled = set_status(&mut tx, order_id, OrderStatus::Cancelled).await?;
        tx.commit().await?;
        info!("Order {} cancelled by its owner", order_id);

        let payload = json!({
            "orderId": cancelled.id,
            "status": cancelled.status,
            "statusLabel": cancelled.status.label(),
            "total": cancelled.total,
            "timestamp": Utc::now(),
        });
        self.events
            .publish(Channel::User(user_id), ORDER_STATUS_EVENT, payload.clone());
        self.events.publish(Channel::Staff, ORDER_STATUS_EVENT, payload);

        Ok(cancelled)
    }

    /// Back-office status change along the order status machine
    pub async fn update_status(&self, order_id: Uuid, next: OrderStatus) -> ApiResult<Order> {
        let mut tx = self.pool.begin().await?;

        let order = lock_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Order not found".to_string()))?;

        if !order.status.can_transition_to(next) {
            return Err(ApiError::BadRequest(format!(
                "Cannot change order status from {} to {}",
                order.status, next
            )));
        }

        if next == OrderStatus::Cancelled {
            let restored = restore_stock(&mut tx, order_id).await?;
            info!("Restored stock for {} lines of order {}", restored, order_id);
        }
        let updated = set_status(&mut tx, order_id, next).await?;
        tx.commit().await?;
        info!("Order {} moved from {} to {}", order_id, order.status, next);

        if let Some(user_id) = updated.user_id {
            self.notifier
                .order_status_changed(user_id, updated.id, updated.status, updated.total)
                .await;
        }
        self.events.publish(
            Channel::Staff,
            ORDER_STATUS_EVENT,
            json!({ "orderId": updated.id, "status": updated.status }),
        );

        Ok(updated)
    }

    fn send_confirmation(&self, email: &str, order: &Order, lines: &[PricedLine]) {
        let message = OutboundEmail::order_confirmation(&OrderEmail {
            order_id: order.id.to_string(),
            customer_name: order
                .recipient_name
                .clone()
                .unwrap_or_else(|| "there".to_string()),
            email: email.to_string(),
            items: lines
                .iter()
                .map(|line| OrderEmailLine {
                    name: line.name.clone(),
                    quantity: line.quantity,
                    price: line.unit_price,
                })
                .collect(),
            subtotal: order.subtotal,
            shipping_fee: order.shipping_fee,
            discount: order.discount_amount,
            total: order.total,
            shipping_address: order.shipping_address.clone(),
            payment_method: order.payment_method.clone(),
        });

        let mailer = self.mailer.clone();
        let order_id = order.id;
        tokio::spawn(async move {
            if let Err(e) = mailer.send(message).await {
                warn!("Failed to send confirmation for order {}: {}", order_id, e);
            }
        });
    }

    /// Tell staff about a new order and the kitchen about each line
    fn announce(&self, order: &Order, lines: &[PricedLine]) {
        let order_number = short_order_id(order.id);
        for line in lines {
            self.events.publish(
                Channel::Kitchen,
                KITCHEN_ITEM_EVENT,
                json!({
                    "productName": line.name,
                    "productImage": line.image,
                    "quantity": line.quantity,
                    "destination": order.shipping_address,
                    "orderNumber": order_number,
                    "status": order.status,
                }),
            );
        }

        self.events.publish(
            Channel::Staff,
            NEW_ORDER_EVENT,
            json!({
                "orderId": order.id,
                "total": order.total,
                "status": order.status,
                "channel": order.channel,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PromotionType;
    use chrono::Duration;

    fn request(product_id: Uuid, quantity: i32) -> LineRequest {
        LineRequest {
            product_id,
            quantity,
            price: None,
        }
    }

    fn priced(name: &str, unit_price: i64, quantity: i32, available: i32) -> PricedLine {
        PricedLine {
            product_id: Uuid::new_v4(),
            name: name.to_string(),
            image: None,
            unit_price,
            quantity,
            available,
        }
    }

    fn promotion(kind: PromotionType, value: i64) -> Promotion {
        Promotion {
            id: Uuid::new_v4(),
            code: "WELCOME".to_string(),
            name: "Welcome".to_string(),
            description: None,
            promotion_type: kind,
            value,
            min_order_value: 0,
            max_discount: None,
            usage_limit: None,
            used_count: 0,
            start_date: None,
            end_date: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_merge_requests_sums_repeats() {
        let latte = Uuid::new_v4();
        let mocha = Uuid::new_v4();
        let mut with_price = request(latte, 1);
        with_price.price = Some(40_000);

        let merged = merge_requests(&[request(latte, 2), request(mocha, 1), with_price]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].product_id, latte);
        assert_eq!(merged[0].quantity, 3);
        assert_eq!(merged[0].price, Some(40_000));
        assert_eq!(merged[1].product_id, mocha);
    }

    #[test]
    fn test_price_lines_unknown_product() {
        let known = LockedProduct {
            id: Uuid::new_v4(),
            name: "Americano".to_string(),
            image: None,
            price: 35_000,
            stock: 3,
        };
        let result = price_lines(&[request(known.id, 1), request(Uuid::new_v4(), 1)], &[known]);
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[test]
    fn test_price_lines_uses_override() {
        let product = LockedProduct {
            id: Uuid::new_v4(),
            name: "Americano".to_string(),
            image: None,
            price: 35_000,
            stock: 3,
        };
        let mut line = request(product.id, 2);
        line.price = Some(30_000);

        let lines = price_lines(&[line], &[product]).unwrap();
        assert_eq!(lines[0].unit_price, 30_000);
        assert_eq!(subtotal_of(&lines).unwrap(), 60_000);
    }

    #[test]
    fn test_shortages_name_every_short_line() {
        let lines = vec![
            priced("Cold Brew", 45_000, 5, 2),
            priced("Croissant", 25_000, 1, 10),
            priced("Matcha Latte", 50_000, 3, 0),
        ];

        let shortages = find_shortages(&lines);
        assert_eq!(shortages.len(), 2);
        assert_eq!(shortages[0].name, "Cold Brew");
        assert_eq!(shortages[0].requested, 5);
        assert_eq!(shortages[0].available, 2);
        assert_eq!(shortages[1].name, "Matcha Latte");
    }

    #[test]
    fn test_exact_stock_is_enough() {
        assert!(find_shortages(&[priced("Mocha", 45_000, 2, 2)]).is_empty());
    }

    #[test]
    fn test_order_total_never_negative() {
        assert_eq!(order_total(100_000, 20_000, 10_000).unwrap(), 110_000);
        assert_eq!(order_total(50_000, 0, 80_000).unwrap(), 0);
    }

    #[test]
    fn test_price_override_is_capped() {
        let mut line = request(Uuid::new_v4(), 3);
        line.price = Some(i64::MAX / 2);
        assert!(matches!(validate_quantities(&[line]), Err(ApiError::Validation(_))));

        line.price = Some(common::validation::MAX_PRICE);
        assert!(validate_quantities(&[line]).is_ok());
    }

    #[test]
    fn test_oversized_amounts_are_rejected() {
        let product = LockedProduct {
            id: Uuid::new_v4(),
            name: "Gold Leaf Latte".to_string(),
            image: None,
            price: 35_000,
            stock: 10,
        };
        let mut line = request(product.id, 3);
        line.price = Some(i64::MAX / 2);
        let lines = price_lines(&[line], &[product]).unwrap();
        assert!(matches!(subtotal_of(&lines), Err(ApiError::Validation(_))));

        let lines = vec![priced("A", i64::MAX / 2, 1, 5), priced("B", i64::MAX / 2, 1, 5)];
        assert!(subtotal_of(&lines).is_ok());
        let lines = vec![priced("A", i64::MAX / 2, 1, 5), priced("B", i64::MAX / 2 + 2, 1, 5)];
        assert!(subtotal_of(&lines).is_err());

        assert!(order_total(i64::MAX, 1, 0).is_err());
    }

    #[test]
    fn test_merged_quantity_saturates() {
        let id = Uuid::new_v4();
        let merged = merge_requests(&[request(id, i32::MAX), request(id, 5)]);
        assert_eq!(merged[0].quantity, i32::MAX);
        assert!(validate_quantities(&merged).is_err());
    }

    #[test]
    fn test_counter_discount_capped_at_subtotal() {
        assert_eq!(counter_discount(Some(10_000), 50_000), 10_000);
        assert_eq!(counter_discount(Some(90_000), 50_000), 50_000);
        assert_eq!(counter_discount(Some(-5), 50_000), 0);
        assert_eq!(counter_discount(None, 50_000), 0);
    }

    #[test]
    fn test_promotion_discount_requires_redeemable() {
        let now = Utc::now();
        let mut promo = promotion(PromotionType::Percentage, 10);
        assert_eq!(promotion_discount(Some(&promo), None, 200_000, now), 20_000);

        promo.is_active = false;
        assert_eq!(promotion_discount(Some(&promo), None, 200_000, now), 0);

        promo.is_active = true;
        promo.end_date = Some(now - Duration::days(1));
        assert_eq!(promotion_discount(Some(&promo), None, 200_000, now), 0);

        promo.end_date = None;
        promo.usage_limit = Some(5);
        promo.used_count = 5;
        assert_eq!(promotion_discount(Some(&promo), None, 200_000, now), 0);

        assert_eq!(promotion_discount(None, Some(10_000), 200_000, now), 0);
    }

    #[test]
    fn test_promotion_discount_client_amount_only_lowers() {
        let now = Utc::now();
        let promo = promotion(PromotionType::Fixed, 30_000);
        assert_eq!(promotion_discount(Some(&promo), Some(10_000), 200_000, now), 10_000);
        assert_eq!(promotion_discount(Some(&promo), Some(90_000), 200_000, now), 30_000);
    }

    #[test]
    fn test_promotion_discount_below_minimum() {
        let now = Utc::now();
        let mut promo = promotion(PromotionType::Fixed, 30_000);
        promo.min_order_value = 500_000;
        assert_eq!(promotion_discount(Some(&promo), None, 200_000, now), 0);
    }

    async fn db_service() -> (PgPool, OrderService) {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPool::connect(&url).await.unwrap();
        common::database::run_migrations(&pool).await.unwrap();

        let events = EventBus::default();
        let service = OrderService::new(
            pool.clone(),
            CacheStore::in_memory(),
            Arc::new(common::mailer::LogMailer),
            events.clone(),
            NotificationService::new(pool.clone(), events),
        );
        (pool, service)
    }

    async fn seed_buyer(pool: &PgPool) -> Uuid {
        sqlx::query_scalar(
            "INSERT INTO users (email, password, name) VALUES ($1, 'x', 'Test Buyer') RETURNING id",
        )
        .bind(format!("buyer-{}@example.com", Uuid::new_v4()))
        .fetch_one(pool)
        .await
        .unwrap()
    }

    async fn seed_product(pool: &PgPool, name: &str, price: i64, stock: i32) -> Uuid {
        sqlx::query_scalar(
            "INSERT INTO products (name, slug, price, stock) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(name)
        .bind(format!("{}-{}", name.to_lowercase().replace(' ', "-"), Uuid::new_v4()))
        .bind(price)
        .bind(stock)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    async fn add_to_cart(pool: &PgPool, user_id: Uuid, product_id: Uuid, quantity: i32) {
        sqlx::query("INSERT INTO cart_items (user_id, product_id, quantity) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(product_id)
            .bind(quantity)
            .execute(pool)
            .await
            .unwrap();
    }

    async fn seed_cart(pool: &PgPool, stock: i32, quantity: i32) -> (Uuid, Uuid) {
        let user_id = seed_buyer(pool).await;
        let product_id = seed_product(pool, "Cold Brew", 50_000, stock).await;
        add_to_cart(pool, user_id, product_id, quantity).await;
        (user_id, product_id)
    }

    async fn stock_of(pool: &PgPool, product_id: Uuid) -> i32 {
        sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    fn checkout_request(idempotency_key: Option<Uuid>) -> CheckoutRequest {
        CheckoutRequest {
            recipient_name: "Test Buyer".to_string(),
            phone: "0901234567".to_string(),
            address: "12 Nguyen Hue, District 1, Ho Chi Minh City".to_string(),
            note: None,
            payment_method: crate::models::order::PaymentMethod::Cod,
            idempotency_key,
            promotion_id: None,
            discount_amount: None,
        }
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database"]
    async fn test_checkout_short_stock_writes_nothing() {
        let (pool, service) = db_service().await;
        let (user_id, product_id) = seed_cart(&pool, 2, 5).await;

        let result = service
            .checkout(user_id, "buyer@example.com", &checkout_request(None))
            .await;

        match result {
            Err(ApiError::InsufficientStock(items)) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].available, 2);
            }
            other => panic!("expected insufficient stock, got {:?}", other.map(|o| o.receipt)),
        }
        assert_eq!(stock_of(&pool, product_id).await, 2);

        let cart: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(cart, 1);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database"]
    async fn test_checkout_replay_places_one_order() {
        let (pool, service) = db_service().await;
        let (user_id, product_id) = seed_cart(&pool, 10, 3).await;
        let request = checkout_request(Some(Uuid::new_v4()));

        let first = service
            .checkout(user_id, "buyer@example.com", &request)
            .await
            .unwrap();
        assert!(!first.duplicate);
        assert_eq!(stock_of(&pool, product_id).await, 7);

        let second = service
            .checkout(user_id, "buyer@example.com", &request)
            .await
            .unwrap();
        assert!(second.duplicate);
        assert_eq!(second.receipt.order_id, first.receipt.order_id);
        assert_eq!(stock_of(&pool, product_id).await, 7);

        let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(orders, 1);
    }

    /// Checkout of a two-line cart: latte x2 (stock 10) and croissant x1 (stock 5)
    async fn two_line_order(pool: &PgPool, service: &OrderService) -> (Uuid, Uuid, Uuid, Uuid) {
        let user_id = seed_buyer(pool).await;
        let latte = seed_product(pool, "Latte", 45_000, 10).await;
        let croissant = seed_product(pool, "Croissant", 25_000, 5).await;
        add_to_cart(pool, user_id, latte, 2).await;
        add_to_cart(pool, user_id, croissant, 1).await;

        let outcome = service
            .checkout(user_id, "buyer@example.com", &checkout_request(None))
            .await
            .unwrap();
        (user_id, outcome.receipt.order_id, latte, croissant)
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database"]
    async fn test_checkout_writes_one_item_per_line() {
        let (pool, service) = db_service().await;
        let (user_id, order_id, latte, croissant) = two_line_order(&pool, &service).await;

        let items: Vec<(Uuid, i32, i64)> = sqlx::query_as(
            "SELECT product_id, quantity, price FROM order_items WHERE order_id = $1 ORDER BY price DESC",
        )
        .bind(order_id)
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(items, vec![(latte, 2, 45_000), (croissant, 1, 25_000)]);

        let subtotal: i64 = sqlx::query_scalar("SELECT subtotal FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(subtotal, 115_000);

        assert_eq!(stock_of(&pool, latte).await, 8);
        assert_eq!(stock_of(&pool, croissant).await, 4);

        let cart: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(cart, 0);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database"]
    async fn test_owner_cancel_restores_stock() {
        let (pool, service) = db_service().await;
        let (user_id, order_id, latte, croissant) = two_line_order(&pool, &service).await;

        let cancelled = service.cancel(order_id, user_id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(stock_of(&pool, latte).await, 10);
        assert_eq!(stock_of(&pool, croissant).await, 5);

        // a second cancel is refused and restores nothing
        assert!(matches!(
            service.cancel(order_id, user_id).await,
            Err(ApiError::BadRequest(_))
        ));
        assert_eq!(stock_of(&pool, latte).await, 10);

        // someone else's order looks missing
        assert!(matches!(
            service.cancel(order_id, Uuid::new_v4()).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database"]
    async fn test_back_office_cancel_restores_stock() {
        let (pool, service) = db_service().await;
        let (_, order_id, latte, croissant) = two_line_order(&pool, &service).await;

        service
            .update_status(order_id, OrderStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(stock_of(&pool, latte).await, 8);

        let cancelled = service
            .update_status(order_id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(stock_of(&pool, latte).await, 10);
        assert_eq!(stock_of(&pool, croissant).await, 5);

        assert!(matches!(
            service.update_status(order_id, OrderStatus::Shipping).await,
            Err(ApiError::BadRequest(_))
        ));
    }
}
