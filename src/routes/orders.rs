use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireOperator;
use crate::domain::{
    discount_percent, AuthMethod, ConfirmOrderRequest, CreateOrderRequest, Order, OrderCreated,
    OrderStatusResponse, SetPriceRequest, TransitionError,
};
use crate::error::{ApiError, ApiResult};
use crate::services::notifier::{order_confirmed_message, order_created_message};

use super::uploads::stored_upload_path;

// ============================================================================
// Customer endpoints
// ============================================================================

/// Create an unconfirmed order from an uploaded model
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<Created<OrderCreated>> {
    req.validate().map_err(ApiError::BadRequest)?;
    let upload_path = stored_upload_path(&state.settings.upload_dir, &req.file_ref)
        .ok_or_else(|| ApiError::bad_request("file_ref does not name an uploaded model"))?;

    if let Some(selection) = req.material.as_ref().filter(|_| !req.operator_choice) {
        if state.store.get_material(selection.material_id).await?.is_none() {
            return Err(ApiError::bad_request(format!(
                "Unknown material {}",
                selection.material_id
            )));
        }
    }

    let order = Order::new(req, Utc::now());
    state.store.insert_order(&order).await?;

    tracing::info!(
        order_id = %order.id,
        file_name = %order.file_name,
        operator_choice = order.operator_choice,
        estimate = ?order.estimated_price(),
        "Order created"
    );
    state.notify_with_document(
        order_created_message(&order),
        upload_path,
        order.file_name.clone(),
    );

    Ok(Created(OrderCreated {
        order_id: order.id,
        status: order.status,
    }))
}

/// Confirmation status, polled by the customer
pub async fn get_order_status(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<DataResponse<OrderStatusResponse>> {
    let order = load_order(&state, order_id).await?;
    Ok(DataResponse::new(order.status_response()))
}

/// Attach the customer's identity and place a confirmed order
pub async fn confirm_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<ConfirmOrderRequest>,
) -> ApiResult<DataResponse<OrderStatusResponse>> {
    let customer = req.identity();
    customer.validate()?;

    let order = transition(&state, order_id, |order, now| {
        order.confirm(customer, req.final_price, now)
    })
    .await?;

    tracing::info!(
        order_id = %order.id,
        final_price = ?order.final_price,
        "Order placed by customer"
    );

    let discount = loyalty_discount(&state, &order).await;
    state.notify(order_confirmed_message(&order, discount));

    Ok(DataResponse::new(order.status_response()))
}

// ============================================================================
// Operator endpoints
// ============================================================================

/// List all orders, newest first
pub async fn list_orders(
    _operator: RequireOperator,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Paginated<Order>> {
    let (orders, total) = state
        .store
        .list_orders(params.offset(), params.limit())
        .await?;
    Ok(Paginated::new(orders, &params, total))
}

/// Full order record including customer identity
pub async fn get_order(
    _operator: RequireOperator,
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<DataResponse<Order>> {
    Ok(DataResponse::new(load_order(&state, order_id).await?))
}

/// Accept the customer's estimate as the price
pub async fn approve_order(
    operator: RequireOperator,
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<DataResponse<OrderStatusResponse>> {
    let order = transition(&state, order_id, |order, now| order.approve(now)).await?;

    tracing::info!(
        order_id = %order.id,
        operator = %operator.operator,
        price = ?order.agreed_price(),
        "Order approved"
    );

    Ok(DataResponse::new(order.status_response()))
}

/// Replace the estimate with the operator's price
pub async fn set_order_price(
    operator: RequireOperator,
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<SetPriceRequest>,
) -> ApiResult<DataResponse<OrderStatusResponse>> {
    let order = transition(&state, order_id, |order, now| {
        order.change_price(req.final_price, now)
    })
    .await?;

    tracing::info!(
        order_id = %order.id,
        operator = %operator.operator,
        final_price = req.final_price,
        "Order price changed"
    );

    Ok(DataResponse::new(order.status_response()))
}

/// Mark a placed order as printed and handed over
pub async fn complete_order(
    operator: RequireOperator,
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<DataResponse<OrderStatusResponse>> {
    let order = transition(&state, order_id, |order, now| order.complete(now)).await?;

    tracing::info!(order_id = %order.id, operator = %operator.operator, "Order completed");

    Ok(DataResponse::new(order.status_response()))
}

// ============================================================================
// Helpers
// ============================================================================

async fn load_order(state: &AppState, order_id: Uuid) -> ApiResult<Order> {
    state
        .store
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Order {} not found", order_id)))
}

/// Applies `f` and stores the result, provided nobody else moved the order
/// in between.
async fn transition<F>(state: &AppState, order_id: Uuid, f: F) -> ApiResult<Order>
where
    F: FnOnce(&mut Order, DateTime<Utc>) -> Result<(), TransitionError> + Send,
{
    let mut order = load_order(state, order_id).await?;
    let expected = order.status;
    f(&mut order, Utc::now())?;

    if !state.store.update_order(&order, expected).await? {
        return Err(ApiError::conflict(
            "Order was modified concurrently; reload and retry",
        ));
    }
    Ok(order)
}

/// Discount for Google-authenticated customers with an email on file.
async fn loyalty_discount(state: &AppState, order: &Order) -> Option<u32> {
    let customer = order.customer.as_ref()?;
    if customer.auth_method != Some(AuthMethod::Google) {
        return None;
    }
    let email = customer.email.as_deref()?;

    match state.store.count_completed_for_customer(email).await {
        Ok(completed) => Some(discount_percent(completed)),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to look up loyalty discount");
            None
        }
    }
}
