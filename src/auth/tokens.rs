//! HS256 operator tokens signed with a shared secret

use anyhow::{Context, Result};
use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use super::Claims;

#[derive(Clone)]
pub struct OperatorTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl OperatorTokens {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verify a JWT token and return the claims
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let token_data =
            decode::<Claims>(token, &self.decoding, &self.validation).context("JWT validation failed")?;
        Ok(token_data.claims)
    }

    /// Sign an operator token valid for `ttl`.
    pub fn issue(&self, operator: &str, ttl: Duration) -> Result<String> {
        encode(
            &Header::new(Algorithm::HS256),
            &Claims::operator(operator, ttl),
            &self.encoding,
        )
        .context("Failed to sign operator token")
    }
}
