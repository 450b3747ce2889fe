use axum::{extract::DefaultBodyLimit, http::HeaderValue, Router};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::auth::OperatorTokens;
use crate::config::Settings;
use crate::middleware::request_id_layer;
use crate::routes;
use crate::services::TelegramNotifier;
use crate::store::OrderStore;

/// Multipart framing allowance on top of the model size limit
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OrderStore>,
    pub settings: Settings,
    pub tokens: OperatorTokens,
    /// Present when Telegram credentials are configured
    pub notifier: Option<TelegramNotifier>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn OrderStore>,
        settings: Settings,
        notifier: Option<TelegramNotifier>,
    ) -> Arc<Self> {
        let tokens = OperatorTokens::new(&settings.operator_jwt_secret);
        Arc::new(Self {
            store,
            settings,
            tokens,
            notifier,
        })
    }

    /// Fire-and-forget operator notification.
    pub fn notify(&self, text: String) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(text);
        }
    }

    /// Like [`notify`](Self::notify), with the model file attached.
    pub fn notify_with_document(&self, caption: String, path: PathBuf, file_name: String) {
        if let Some(notifier) = &self.notifier {
            notifier.notify_with_document(caption, path, file_name);
        }
    }
}

/// Build the complete application with all middleware
pub fn create_app(state: Arc<AppState>) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(&state.settings);

    // Build trace layer (use DEBUG for spans to reduce overhead at INFO level)
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    // Request ID layers
    let (set_request_id, propagate_request_id) = request_id_layer();

    let body_limit = state.settings.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .merge(routes::api_router())
        // Middleware stack (applied bottom-up)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(propagate_request_id)
        .layer(trace_layer)
        .layer(set_request_id)
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    // In dev mode, use longer preflight cache to reduce OPTIONS requests
    let max_age = if settings.env.is_dev() {
        std::time::Duration::from_secs(86400)
    } else {
        std::time::Duration::from_secs(3600)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static("x-request-id"),
        ]))
        .allow_credentials(true)
        .max_age(max_age)
}
