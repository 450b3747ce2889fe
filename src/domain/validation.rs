use thiserror::Error;

/// Input problems caught locally, before anything is sent to the Order Service.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("No model file attached")]
    MissingModel,

    #[error("Unsupported model file '{0}': only .stl and .obj are accepted")]
    UnsupportedFile(String),

    #[error("Model extents must be positive finite millimetres")]
    InvalidExtents,

    #[error("Invalid dimension '{0}': expected a positive number")]
    InvalidDimension(String),

    #[error("Scale must be a positive finite number")]
    InvalidScale,

    #[error("Infill must be between 10 and 100 in steps of 10, got {0}")]
    InvalidInfill(u32),

    #[error("Unsupported layer height {0} mm")]
    UnsupportedLayerHeight(f64),

    #[error("Select a material or let the operator choose")]
    MissingMaterial,

    #[error("Color '{0}' is not offered for the selected material")]
    UnknownColor(String),

    #[error("Price is not available yet")]
    MissingEstimate,

    #[error("Customer name is required")]
    MissingCustomerName,

    #[error("Customer phone is required")]
    MissingCustomerPhone,

    #[error("Invalid email address '{0}'")]
    InvalidEmail(String),
}
