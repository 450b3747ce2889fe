use axum::extract::{Path, State};
use std::sync::Arc;

use crate::api::DataResponse;
use crate::app::AppState;
use crate::domain::{DiscountResponse, OrderStatusResponse};
use crate::error::{ApiError, ApiResult};

/// Orders returned by the customer history lookup
const CUSTOMER_ORDERS_LIMIT: u32 = 50;

/// Loyalty discount earned from completed orders
pub async fn get_discount(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> ApiResult<DataResponse<DiscountResponse>> {
    let email = normalize_email(&email)?;
    let completed = state.store.count_completed_for_customer(&email).await?;
    Ok(DataResponse::new(DiscountResponse::new(email, completed)))
}

/// Most recent orders placed with this email
pub async fn list_customer_orders(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> ApiResult<DataResponse<Vec<OrderStatusResponse>>> {
    let email = normalize_email(&email)?;
    let orders = state
        .store
        .orders_for_customer(&email, CUSTOMER_ORDERS_LIMIT)
        .await?;
    Ok(DataResponse::new(
        orders.iter().map(|o| o.status_response()).collect(),
    ))
}

fn normalize_email(raw: &str) -> ApiResult<String> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((user, domain)) if !user.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(ApiError::bad_request(format!("Invalid email address '{}'", raw))),
    }
}
