//! Service layer modules for external integrations.
//!
//! Contains the Order Service HTTP client used by the workflow and the
//! Telegram notifier used by the server.

pub mod notifier;
pub mod order_client;

pub use notifier::TelegramNotifier;
pub use order_client::HttpOrderService;
