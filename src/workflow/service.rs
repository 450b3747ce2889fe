use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    ConfirmOrderRequest, CreateOrderRequest, MaterialProfile, OrderCreated, OrderStatusResponse,
    UploadedModel,
};

/// Failures talking to the Order Service. All of them are recoverable from
/// the workflow's point of view.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("Order service unavailable: {0}")]
    Unavailable(String),

    #[error("Order service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Order not found")]
    NotFound,

    #[error("Invalid order service response: {0}")]
    InvalidResponse(String),
}

/// Remote side of the order workflow.
#[async_trait]
pub trait OrderService: Send + Sync + 'static {
    async fn upload_model(
        &self,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<UploadedModel, ServiceError>;

    async fn create_order(&self, request: &CreateOrderRequest)
        -> Result<OrderCreated, ServiceError>;

    async fn order_status(&self, order_id: Uuid) -> Result<OrderStatusResponse, ServiceError>;

    async fn confirm_order(
        &self,
        order_id: Uuid,
        request: &ConfirmOrderRequest,
    ) -> Result<OrderStatusResponse, ServiceError>;

    async fn list_materials(&self) -> Result<Vec<MaterialProfile>, ServiceError>;
}
