use super::Claims;

/// Authenticated operator extracted from the bearer token
#[derive(Debug, Clone)]
pub struct OperatorContext {
    /// Operator name (from JWT sub claim)
    pub operator: String,

    /// JWT claims
    claims: Claims,
}

impl OperatorContext {
    pub fn from_claims(claims: Claims) -> Result<Self, &'static str> {
        if claims.sub.trim().is_empty() {
            return Err("Missing subject in token");
        }
        if !claims.is_operator() {
            return Err("Token does not carry the operator role");
        }

        Ok(Self {
            operator: claims.sub.clone(),
            claims,
        })
    }

    /// Get the JWT claims
    pub fn claims(&self) -> &Claims {
        &self.claims
    }
}
