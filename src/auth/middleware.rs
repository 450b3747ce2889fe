use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::OperatorContext;
use crate::app::AppState;
use crate::error::ErrorResponse;

/// Extractor that requires a valid operator token
///
/// Example:
/// ```ignore
/// async fn approve(operator: RequireOperator) -> impl IntoResponse {
///     format!("Approved by {}", operator.operator)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequireOperator(pub OperatorContext);

impl std::ops::Deref for RequireOperator {
    type Target = OperatorContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidFormat,
    InvalidToken,
    NotOperator,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AuthError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Missing authorization token",
            ),
            AuthError::InvalidFormat => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Invalid authorization format",
            ),
            AuthError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Invalid or expired token",
            ),
            AuthError::NotOperator => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Operator role required",
            ),
        };

        let body = ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
            request_id: None,
        };

        (status, Json(body)).into_response()
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireOperator {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        // Extract Authorization header
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::InvalidFormat)?;

        // Parse Bearer token
        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidFormat)?;

        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let claims = state.tokens.verify_token(token).map_err(|e| {
            tracing::warn!(error = %e, "JWT verification failed");
            AuthError::InvalidToken
        })?;

        if !claims.is_operator() {
            tracing::warn!(sub = %claims.sub, role = %claims.role, "Non-operator token rejected");
            return Err(AuthError::NotOperator);
        }

        let context = OperatorContext::from_claims(claims).map_err(|e| {
            tracing::warn!(error = %e, "Failed to build operator context");
            AuthError::InvalidToken
        })?;

        Ok(RequireOperator(context))
    }
}
