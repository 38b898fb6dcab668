//! Order reads and listings; writes that touch stock live in `checkout`

use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    listing::{Pagination, SortDirection, SortSpec, SortWhitelist, like_pattern},
    models::{
        Order, OrderChannel, OrderDetail, OrderItemProduct, OrderItemView, OrderStatus,
        OrderSummary,
    },
};

pub(crate) const ORDER_COLUMNS: &str = "o.id, o.user_id, o.staff_id, o.channel, o.subtotal, \
     o.shipping_fee, o.discount_amount, o.total, o.status, o.payment_method, o.recipient_name, \
     o.phone, o.shipping_address, o.note, o.promotion_id, o.created_at, o.updated_at";

pub const ADMIN_ORDER_SORT: SortWhitelist = SortWhitelist {
    columns: &[
        ("created_at", "o.created_at"),
        ("total", "o.total"),
        ("status", "o.status"),
    ],
    default_column: "o.created_at",
    default_direction: SortDirection::Desc,
};

const NEWEST_FIRST: SortSpec = SortSpec {
    column: "o.created_at",
    direction: SortDirection::Desc,
};

/// Filters for back-office order lists
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub search: Option<String>,
    pub status: Option<OrderStatus>,
    pub channel: Option<OrderChannel>,
    pub payment_method: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

fn decode_error(message: String) -> DatabaseError {
    DatabaseError::Query(sqlx::Error::Decode(message.into()))
}

pub(crate) fn map_order(row: &PgRow) -> DatabaseResult<Order> {
    let status: String = row.get("status");
    let channel: String = row.get("channel");

    Ok(Order {
        id: row.get("id"),
        user_id: row.get("user_id"),
        staff_id: row.get("staff_id"),
        channel: channel.parse().map_err(decode_error)?,
        subtotal: row.get("subtotal"),
        shipping_fee: row.get("shipping_fee"),
        discount_amount: row.get("discount_amount"),
        total: row.get("total"),
        status: status.parse().map_err(decode_error)?,
        payment_method: row.get("payment_method"),
        recipient_name: row.get("recipient_name"),
        phone: row.get("phone"),
        shipping_address: row.get("shipping_address"),
        note: row.get("note"),
        promotion_id: row.get("promotion_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn map_summary(row: &PgRow) -> DatabaseResult<OrderSummary> {
    Ok(OrderSummary {
        order: map_order(row)?,
        customer_name: row.get("customer_name"),
        customer_email: row.get("customer_email"),
        items_count: row.get("items_count"),
    })
}

fn map_item(row: &PgRow) -> OrderItemView {
    let product_id: Option<Uuid> = row.get("product_id");
    OrderItemView {
        id: row.get("id"),
        quantity: row.get("quantity"),
        price: row.get("price"),
        product: product_id.map(|id| OrderItemProduct {
            id,
            name: row.get("product_name"),
            slug: row.get("product_slug"),
            images: row.get("product_images"),
        }),
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    builder.push(" WHERE TRUE");

    if let Some(term) = &filter.search {
        let pattern = like_pattern(term);
        builder
            .push(" AND (o.id::TEXT ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR o.recipient_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR o.phone ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(status) = filter.status {
        builder.push(" AND o.status = ").push_bind(status.as_str());
    }
    if let Some(channel) = filter.channel {
        builder.push(" AND o.channel = ").push_bind(channel.as_str());
    }
    if let Some(payment) = &filter.payment_method {
        builder.push(" AND o.payment_method = ").push_bind(payment.clone());
    }
    if let Some(from) = filter.from {
        builder.push(" AND o.created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        builder.push(" AND o.created_at <= ").push_bind(to);
    }
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, id: Uuid) -> DatabaseResult<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {} FROM orders o WHERE o.id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(map_order).transpose()
    }

    /// Lines of an order with whatever is left of their products
    pub async fn items(&self, order_id: Uuid) -> DatabaseResult<Vec<OrderItemView>> {
        let rows = sqlx::query(
            "SELECT oi.id, oi.quantity, oi.price, oi.product_id, p.name AS product_name, \
             p.slug AS product_slug, p.images AS product_images \
             FROM order_items oi LEFT JOIN products p ON p.id = oi.product_id \
             WHERE oi.order_id = $1 ORDER BY oi.id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_item).collect())
    }

    pub async fn detail(&self, id: Uuid) -> DatabaseResult<Option<OrderDetail>> {
        let Some(order) = self.find(id).await? else {
            return Ok(None);
        };
        let items = self.items(id).await?;
        Ok(Some(OrderDetail { order, items }))
    }

    /// A customer's orders with their lines, newest first
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        pagination: Pagination,
    ) -> DatabaseResult<(Vec<OrderDetail>, i64)> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS count FROM orders WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let rows = sqlx::query(&format!(
            "SELECT {} FROM orders o WHERE o.user_id = $1 \
             ORDER BY o.created_at DESC LIMIT $2 OFFSET $3",
            ORDER_COLUMNS
        ))
        .bind(user_id)
        .bind(pagination.limit)
        .bind(pagination.offset())
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            let order = map_order(row)?;
            let items = self.items(order.id).await?;
            orders.push(OrderDetail { order, items });
        }

        Ok((orders, total))
    }

    /// Back-office list with customer info and line counts
    pub async fn list(
        &self,
        filter: &OrderFilter,
        pagination: Pagination,
        sort: SortSpec,
    ) -> DatabaseResult<(Vec<OrderSummary>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS count FROM orders o");
        push_filters(&mut count, filter);
        let total: i64 = count.build().fetch_one(&self.pool).await?.get("count");

        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {}, u.name AS customer_name, u.email AS customer_email, \
             (SELECT COUNT(*) FROM order_items oi WHERE oi.order_id = o.id) AS items_count \
             FROM orders o LEFT JOIN users u ON u.id = o.user_id",
            ORDER_COLUMNS
        ));
        push_filters(&mut query, filter);
        query.push(sort.order_by());
        query.push(", o.id LIMIT ").push_bind(pagination.limit);
        query.push(" OFFSET ").push_bind(pagination.offset());

        let rows = query.build().fetch_all(&self.pool).await?;
        let orders = rows.iter().map(map_summary).collect::<DatabaseResult<Vec<_>>>()?;

        Ok((orders, total))
    }

    /// Counter orders since local midnight (UTC)
    pub async fn pos_today(&self) -> DatabaseResult<Vec<OrderSummary>> {
        let midnight = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc());

        let filter = OrderFilter {
            channel: Some(OrderChannel::Pos),
            from: midnight,
            ..Default::default()
        };
        let (orders, _) = self
            .list(&filter, Pagination::new(Some(1), Some(500), 500), NEWEST_FIRST)
            .await?;
        Ok(orders)
    }

    pub async fn pos_history(
        &self,
        filter: OrderFilter,
        pagination: Pagination,
    ) -> DatabaseResult<(Vec<OrderSummary>, i64)> {
        let filter = OrderFilter {
            channel: Some(OrderChannel::Pos),
            ..filter
        };
        self.list(&filter, pagination, NEWEST_FIRST).await
    }
}
