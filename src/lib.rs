//! 3D-print cost estimation and two-phase order confirmation.
//!
//! The library carries both halves of the system: the customer-side
//! [`workflow::OrderWorkflow`] with its [`estimator`], and the Order Service
//! HTTP API built by [`app::create_app`].

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod estimator;
pub mod history;
pub mod logging;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod store;
pub mod workflow;
