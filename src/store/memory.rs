//! In-process store used when no database is configured, and by tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

use super::{OrderStore, StoreResult};
use crate::domain::{MaterialProfile, Order, OrderStatus};

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    // Insertion order; listing sorts by created_at
    orders: Vec<Order>,
    materials: Vec<MaterialProfile>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_materials(materials: Vec<MaterialProfile>) -> Self {
        let store = Self::default();
        store.inner.write().materials = materials;
        store
    }

    fn newest_first(orders: impl Iterator<Item = Order>) -> Vec<Order> {
        let mut orders: Vec<Order> = orders.collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }
}

fn same_email(order: &Order, email: &str) -> bool {
    order
        .customer
        .as_ref()
        .and_then(|c| c.email.as_deref())
        .map(|e| e.eq_ignore_ascii_case(email))
        .unwrap_or(false)
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        self.inner.write().orders.push(order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.inner.read().orders.iter().find(|o| o.id == id).cloned())
    }

    async fn update_order(&self, order: &Order, expected: OrderStatus) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        match inner.orders.iter_mut().find(|o| o.id == order.id) {
            Some(stored) if stored.status == expected => {
                *stored = order.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_orders(&self, offset: u32, limit: u32) -> StoreResult<(Vec<Order>, u64)> {
        let inner = self.inner.read();
        let total = inner.orders.len() as u64;
        let page = Self::newest_first(inner.orders.iter().cloned())
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn orders_for_customer(&self, email: &str, limit: u32) -> StoreResult<Vec<Order>> {
        let inner = self.inner.read();
        let mut orders =
            Self::newest_first(inner.orders.iter().filter(|o| same_email(o, email)).cloned());
        orders.truncate(limit as usize);
        Ok(orders)
    }

    async fn count_completed_for_customer(&self, email: &str) -> StoreResult<u64> {
        let inner = self.inner.read();
        Ok(inner
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::Completed && same_email(o, email))
            .count() as u64)
    }

    async fn list_materials(&self) -> StoreResult<Vec<MaterialProfile>> {
        Ok(self.inner.read().materials.clone())
    }

    async fn get_material(&self, id: Uuid) -> StoreResult<Option<MaterialProfile>> {
        Ok(self
            .inner
            .read()
            .materials
            .iter()
            .find(|m| m.id == id)
            .cloned())
    }

    async fn insert_material(&self, material: &MaterialProfile) -> StoreResult<()> {
        self.inner.write().materials.push(material.clone());
        Ok(())
    }

    async fn update_material(&self, material: &MaterialProfile) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        match inner.materials.iter_mut().find(|m| m.id == material.id) {
            Some(stored) => {
                *stored = material.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_material(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        let before = inner.materials.len();
        inner.materials.retain(|m| m.id != id);
        Ok(inner.materials.len() != before)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
