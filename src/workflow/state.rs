use serde::Serialize;
use uuid::Uuid;

use crate::domain::{OrderStatus, OrderStatusResponse};

/// How the operator settled the price
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    Approved,
    PriceChanged,
}

/// Client-side order lifecycle.
///
/// `NotSubmitted` is initial. `Approved`/`PriceChanged` are only entered from
/// a poll result and `Completed` only from `Finalizing`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowState {
    #[default]
    NotSubmitted,
    AwaitingConfirmation {
        order_id: Uuid,
    },
    Approved {
        order_id: Uuid,
        price: i64,
    },
    PriceChanged {
        order_id: Uuid,
        price: i64,
    },
    Finalizing {
        order_id: Uuid,
        price: i64,
        confirmation: Confirmation,
    },
    Completed {
        order_id: Uuid,
        price: i64,
    },
}

impl WorkflowState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NotSubmitted => "not submitted",
            Self::AwaitingConfirmation { .. } => "awaiting confirmation",
            Self::Approved { .. } => "approved",
            Self::PriceChanged { .. } => "price changed",
            Self::Finalizing { .. } => "finalizing",
            Self::Completed { .. } => "completed",
        }
    }

    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            Self::NotSubmitted => None,
            Self::AwaitingConfirmation { order_id }
            | Self::Approved { order_id, .. }
            | Self::PriceChanged { order_id, .. }
            | Self::Finalizing { order_id, .. }
            | Self::Completed { order_id, .. } => Some(*order_id),
        }
    }

    pub fn is_awaiting(&self, id: Uuid) -> bool {
        matches!(self, Self::AwaitingConfirmation { order_id } if *order_id == id)
    }

    pub fn is_finalizing(&self, id: Uuid) -> bool {
        matches!(self, Self::Finalizing { order_id, .. } if *order_id == id)
    }

    /// Agreed price once the operator has acted.
    pub fn price(&self) -> Option<i64> {
        match self {
            Self::Approved { price, .. }
            | Self::PriceChanged { price, .. }
            | Self::Finalizing { price, .. }
            | Self::Completed { price, .. } => Some(*price),
            _ => None,
        }
    }

    /// `(order_id, price, confirmation)` when the customer may finalize.
    pub fn confirmed(&self) -> Option<(Uuid, i64, Confirmation)> {
        match *self {
            Self::Approved { order_id, price } => Some((order_id, price, Confirmation::Approved)),
            Self::PriceChanged { order_id, price } => {
                Some((order_id, price, Confirmation::PriceChanged))
            }
            _ => None,
        }
    }

    /// State to return to when finalization fails.
    pub fn confirmed_from(order_id: Uuid, price: i64, confirmation: Confirmation) -> Self {
        match confirmation {
            Confirmation::Approved => Self::Approved { order_id, price },
            Confirmation::PriceChanged => Self::PriceChanged { order_id, price },
        }
    }
}

/// What a poll result means for an order awaiting confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    StillPending,
    Confirmed { price: i64, confirmation: Confirmation },
    /// Already placed, e.g. from another session; nothing left to finalize
    Placed { price: i64 },
    /// Operator acted but the response carries no usable price
    MissingPrice,
}

impl PollOutcome {
    pub fn from_status(status: &OrderStatusResponse) -> Self {
        if status.status == OrderStatus::Pending {
            return Self::StillPending;
        }
        let price = match status.agreed_price() {
            Some(price) if price > 0 => price,
            _ => return Self::MissingPrice,
        };
        match status.status {
            OrderStatus::Ordered | OrderStatus::Completed => Self::Placed { price },
            OrderStatus::PriceChanged => Self::Confirmed {
                price,
                confirmation: Confirmation::PriceChanged,
            },
            _ => Self::Confirmed {
                price,
                confirmation: Confirmation::Approved,
            },
        }
    }
}
