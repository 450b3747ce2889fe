use thiserror::Error;

use super::ServiceError;
use crate::domain::ValidationError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Cannot {action} while the order is {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("A request for this order is already in progress")]
    Busy,

    /// The operator repriced the order after it was last observed; the
    /// workflow now holds the new price and finalize can be retried.
    #[error("The price was changed to {price} before the order was placed")]
    PriceUpdated { price: i64 },
}
