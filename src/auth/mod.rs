pub mod claims;
pub mod context;
pub mod middleware;
pub mod tokens;

pub use claims::{Claims, OPERATOR_ROLE};
pub use context::OperatorContext;
pub use middleware::RequireOperator;
pub use tokens::OperatorTokens;
