pub mod customers;
pub mod health;
pub mod materials;
pub mod orders;
pub mod uploads;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Public routes
        .route("/health", get(health::health_check))
        .route("/uploads", post(uploads::upload_model))
        .route("/materials", get(materials::list_materials))
        // Orders (customer)
        .route("/orders", post(orders::create_order))
        .route("/orders/:order_id/status", get(orders::get_order_status))
        .route("/orders/:order_id/confirm", post(orders::confirm_order))
        // Customers
        .route("/customers/:email/discount", get(customers::get_discount))
        .route("/customers/:email/orders", get(customers::list_customer_orders))
        // Orders (operator)
        .route("/orders", get(orders::list_orders))
        .route("/orders/:order_id", get(orders::get_order))
        .route("/orders/:order_id/approve", put(orders::approve_order))
        .route("/orders/:order_id/price", put(orders::set_order_price))
        .route("/orders/:order_id/complete", put(orders::complete_order))
        // Materials (operator)
        .route("/materials", post(materials::create_material))
        .route(
            "/materials/:material_id",
            put(materials::update_material).delete(materials::delete_material),
        )
}
