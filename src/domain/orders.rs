use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{Infill, LayerHeight, OperatorNotes, ValidationError};
use crate::estimator::PriceEstimate;

/// Order status as tracked by the Order Service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Approved,
    PriceChanged,
    Ordered,
    Completed,
}

impl Default for OrderStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::PriceChanged => "price_changed",
            Self::Ordered => "ordered",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "price_changed" => Some(Self::PriceChanged),
            "ordered" => Some(Self::Ordered),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// The operator has acted; the customer may place the order.
    pub fn is_confirmed(self) -> bool {
        matches!(self, Self::Approved | Self::PriceChanged)
    }

    /// Customer identity has been attached.
    pub fn is_finalized(self) -> bool {
        matches!(self, Self::Ordered | Self::Completed)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalogue material picked by the customer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaterialSelection {
    pub material_id: Uuid,
    pub material_name: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// Print parameters as submitted with an order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OrderParams {
    pub infill_percent: Infill,
    pub layer_height_mm: LayerHeight,
    pub scale: f64,
}

/// Request DTO for creating an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub file_name: String,
    pub file_ref: String,
    #[serde(default)]
    pub operator_choice: bool,
    #[serde(default)]
    pub material: Option<MaterialSelection>,
    #[serde(default)]
    pub notes: Option<OperatorNotes>,
    pub params: OrderParams,
    /// Client-side estimate; advisory input for the operator
    #[serde(default)]
    pub estimate: Option<PriceEstimate>,
}

impl CreateOrderRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.file_ref.trim().is_empty() {
            return Err("file_ref is required".to_string());
        }
        if !super::is_supported_model_file(&self.file_name) {
            return Err(ValidationError::UnsupportedFile(self.file_name.clone()).to_string());
        }
        if !self.operator_choice && self.material.is_none() {
            return Err(ValidationError::MissingMaterial.to_string());
        }
        if !self.params.scale.is_finite() || self.params.scale <= 0.0 {
            return Err(ValidationError::InvalidScale.to_string());
        }
        if let Some(estimate) = &self.estimate {
            if estimate.total < crate::estimator::CostModel::STANDARD.minimum_price {
                return Err("estimate total is below the minimum price".to_string());
            }
        }
        Ok(())
    }
}

/// Response DTO for a stored model upload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadedModel {
    /// Opaque reference passed back in `CreateOrderRequest::file_ref`
    pub file_ref: String,
    pub file_name: String,
    pub size_bytes: u64,
}

/// Response DTO for a created order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderCreated {
    pub order_id: Uuid,
    pub status: OrderStatus,
}

/// Response DTO for status polling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderStatusResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub file_name: String,
    pub material_name: Option<String>,
    pub estimated_cost: Option<i64>,
    pub final_cost: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub price_modified_at: Option<DateTime<Utc>>,
    pub ordered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl OrderStatusResponse {
    /// Operator price when set, otherwise the client estimate.
    pub fn agreed_price(&self) -> Option<i64> {
        self.final_cost.or(self.estimated_cost)
    }
}

/// How the customer identified themselves
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Google,
    Phone,
    #[serde(other)]
    Other,
}

/// Customer identity attached when the order is placed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerIdentity {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub auth_method: Option<AuthMethod>,
}

impl CustomerIdentity {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingCustomerName);
        }
        if self.phone.trim().is_empty() {
            return Err(ValidationError::MissingCustomerPhone);
        }
        if let Some(email) = &self.email {
            let email = email.trim();
            let valid = email
                .split_once('@')
                .map(|(user, domain)| !user.is_empty() && !domain.is_empty())
                .unwrap_or(false);
            if !valid {
                return Err(ValidationError::InvalidEmail(email.to_string()));
            }
        }
        Ok(())
    }
}

/// Request DTO for placing a confirmed order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfirmOrderRequest {
    pub customer_name: String,
    pub customer_phone: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub auth_method: Option<AuthMethod>,
    #[serde(default)]
    pub final_price: Option<i64>,
}

impl ConfirmOrderRequest {
    pub fn new(identity: CustomerIdentity, final_price: Option<i64>) -> Self {
        Self {
            customer_name: identity.name,
            customer_phone: identity.phone,
            customer_email: identity.email,
            auth_method: identity.auth_method,
            final_price,
        }
    }

    pub fn identity(&self) -> CustomerIdentity {
        CustomerIdentity {
            name: self.customer_name.trim().to_string(),
            phone: self.customer_phone.trim().to_string(),
            email: self
                .customer_email
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
            auth_method: self.auth_method,
        }
    }
}

/// Request DTO for an operator price change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPriceRequest {
    pub final_price: i64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransitionError {
    #[error("Order is {status}; cannot {action}")]
    InvalidStatus {
        action: &'static str,
        status: OrderStatus,
    },

    #[error("Order has no client estimate to approve; set a price instead")]
    MissingEstimate,

    #[error("Price must be greater than zero")]
    InvalidPrice,

    #[error("Agreed price is {expected}, request carried {got}")]
    PriceMismatch { expected: i64, got: i64 },
}

/// Order entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub file_name: String,
    pub file_ref: String,
    pub operator_choice: bool,
    pub material: Option<MaterialSelection>,
    pub notes: Option<OperatorNotes>,
    pub params: OrderParams,
    pub estimate: Option<PriceEstimate>,
    pub status: OrderStatus,
    pub final_price: Option<i64>,
    pub customer: Option<CustomerIdentity>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub price_modified_at: Option<DateTime<Utc>>,
    pub ordered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(req: CreateOrderRequest, now: DateTime<Utc>) -> Self {
        // Material choice is ignored when the operator picks it
        let material = if req.operator_choice {
            None
        } else {
            req.material
        };

        Self {
            id: Uuid::new_v4(),
            file_name: req.file_name,
            file_ref: req.file_ref,
            operator_choice: req.operator_choice,
            material,
            notes: req.notes,
            params: req.params,
            estimate: req.estimate,
            status: OrderStatus::Pending,
            final_price: None,
            customer: None,
            created_at: now,
            approved_at: None,
            price_modified_at: None,
            ordered_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn estimated_price(&self) -> Option<i64> {
        self.estimate.map(|e| e.total)
    }

    pub fn agreed_price(&self) -> Option<i64> {
        self.final_price.or_else(|| self.estimated_price())
    }

    pub fn material_name(&self) -> Option<&str> {
        self.material.as_ref().map(|m| m.material_name.as_str())
    }

    pub fn approve(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status != OrderStatus::Pending {
            return Err(self.invalid("approve"));
        }
        if self.estimate.is_none() {
            return Err(TransitionError::MissingEstimate);
        }
        self.status = OrderStatus::Approved;
        self.approved_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn change_price(&mut self, price: i64, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status.is_finalized() {
            return Err(self.invalid("change price"));
        }
        if price <= 0 {
            return Err(TransitionError::InvalidPrice);
        }
        self.status = OrderStatus::PriceChanged;
        self.final_price = Some(price);
        self.price_modified_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn confirm(
        &mut self,
        customer: CustomerIdentity,
        price: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !self.status.is_confirmed() {
            return Err(self.invalid("confirm"));
        }
        let agreed = self.agreed_price();
        if let (Some(expected), Some(got)) = (agreed, price) {
            if expected != got {
                return Err(TransitionError::PriceMismatch { expected, got });
            }
        }
        self.final_price = agreed.or(price);
        self.customer = Some(customer);
        self.status = OrderStatus::Ordered;
        self.ordered_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status != OrderStatus::Ordered {
            return Err(self.invalid("complete"));
        }
        self.status = OrderStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn status_response(&self) -> OrderStatusResponse {
        OrderStatusResponse {
            order_id: self.id,
            status: self.status,
            file_name: self.file_name.clone(),
            material_name: self.material_name().map(str::to_string),
            estimated_cost: self.estimated_price(),
            final_cost: self.final_price,
            approved_at: self.approved_at,
            price_modified_at: self.price_modified_at,
            ordered_at: self.ordered_at,
            completed_at: self.completed_at,
        }
    }

    fn invalid(&self, action: &'static str) -> TransitionError {
        TransitionError::InvalidStatus {
            action,
            status: self.status,
        }
    }
}
