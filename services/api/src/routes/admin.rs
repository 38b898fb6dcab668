//! Back office
//!
//! Products and orders are open to every staff role; stock movements to admin
//! and warehouse; staff accounts, customers and categories are admin only.

use axum::{Router, middleware};

use crate::{
    middleware::{auth_middleware, require_admin, require_staff, require_warehouse},
    state::AppState,
};

mod categories;
mod customers;
mod orders;
mod products;
mod staff;
mod warehouse;

pub fn router(state: &AppState) -> Router<AppState> {
    let staff_area = Router::new()
        .merge(products::routes())
        .merge(orders::routes())
        .route_layer(middleware::from_fn(require_staff))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_area = Router::new()
        .merge(staff::routes())
        .merge(customers::routes())
        .merge(categories::routes())
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let warehouse_area = warehouse::routes()
        .route_layer(middleware::from_fn(require_warehouse))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    staff_area.merge(warehouse_area).merge(admin_area)
}
