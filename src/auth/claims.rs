use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

/// Role required for the operator endpoints
pub const OPERATOR_ROLE: &str = "operator";

/// JWT claims for operator tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (operator name)
    pub sub: String,

    /// Operator role
    pub role: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn operator(sub: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: sub.into(),
            role: OPERATOR_ROLE.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    pub fn is_operator(&self) -> bool {
        self.role == OPERATOR_ROLE
    }
}
