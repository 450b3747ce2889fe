//! Domain types and DTOs
//!
//! Shared by the Order Service handlers and the client-side workflow.

pub mod customers;
pub mod geometry;
pub mod materials;
pub mod orders;
pub mod params;
pub mod validation;

pub use customers::*;
pub use geometry::*;
pub use materials::*;
pub use orders::*;
pub use params::*;
pub use validation::ValidationError;

/// Model formats the print shop accepts
pub const SUPPORTED_MODEL_EXTENSIONS: [&str; 2] = ["stl", "obj"];

pub fn is_supported_model_file(file_name: &str) -> bool {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_MODEL_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}
