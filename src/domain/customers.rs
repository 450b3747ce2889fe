use serde::{Deserialize, Serialize};

/// Loyalty discount earned per completed order, in percent
pub const DISCOUNT_PER_COMPLETED_ORDER: u32 = 5;

/// Loyalty discount cap, in percent
pub const MAX_DISCOUNT_PERCENT: u32 = 25;

pub fn discount_percent(completed_orders: u64) -> u32 {
    let earned = completed_orders.saturating_mul(u64::from(DISCOUNT_PER_COMPLETED_ORDER));
    earned.min(u64::from(MAX_DISCOUNT_PERCENT)) as u32
}

/// Response DTO for the loyalty discount lookup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscountResponse {
    pub email: String,
    pub completed_orders: u64,
    pub discount_percent: u32,
    pub max_discount: u32,
}

impl DiscountResponse {
    pub fn new(email: impl Into<String>, completed_orders: u64) -> Self {
        Self {
            email: email.into(),
            completed_orders,
            discount_percent: discount_percent(completed_orders),
            max_discount: MAX_DISCOUNT_PERCENT,
        }
    }
}
