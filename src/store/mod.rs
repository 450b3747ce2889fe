//! Order and material persistence.
//!
//! Handlers talk to [`OrderStore`]; the server picks [`PgStore`] when a
//! database is configured and [`MemoryStore`] otherwise.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{MaterialProfile, Order, OrderStatus};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: Uuid, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: &Order) -> StoreResult<()>;

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>>;

    /// Writes `order` only if the stored status is still `expected`.
    /// Returns `false` when the order is missing or moved on concurrently.
    async fn update_order(&self, order: &Order, expected: OrderStatus) -> StoreResult<bool>;

    /// Newest first, with the total count.
    async fn list_orders(&self, offset: u32, limit: u32) -> StoreResult<(Vec<Order>, u64)>;

    /// Newest first. Email comparison is case-insensitive.
    async fn orders_for_customer(&self, email: &str, limit: u32) -> StoreResult<Vec<Order>>;

    async fn count_completed_for_customer(&self, email: &str) -> StoreResult<u64>;

    async fn list_materials(&self) -> StoreResult<Vec<MaterialProfile>>;

    async fn get_material(&self, id: Uuid) -> StoreResult<Option<MaterialProfile>>;

    async fn insert_material(&self, material: &MaterialProfile) -> StoreResult<()>;

    async fn update_material(&self, material: &MaterialProfile) -> StoreResult<bool>;

    async fn delete_material(&self, id: Uuid) -> StoreResult<bool>;

    async fn health_check(&self) -> StoreResult<()>;

    fn backend_name(&self) -> &'static str;
}
