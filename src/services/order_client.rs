//! HTTP client for the Order Service.
//!
//! Implements [`OrderService`] over the public endpoints:
//! - model upload (multipart)
//! - order creation and status polling
//! - customer confirmation
//! - material catalogue

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument};
use url::Url;
use uuid::Uuid;

use crate::domain::{
    ConfirmOrderRequest, CreateOrderRequest, MaterialProfile, OrderCreated, OrderStatusResponse,
    UploadedModel,
};
use crate::workflow::{OrderService, ServiceError};

/// Client for the Order Service.
#[derive(Clone)]
pub struct HttpOrderService {
    client: Client,
    base_url: Url,
}

/// `{"data": ...}` success envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Error body returned by the Order Service.
#[derive(Debug, Deserialize)]
struct ServiceErrorResponse {
    message: String,
}

impl HttpOrderService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url).context("Invalid ORDER_SERVICE_URL")?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("ORDER_SERVICE_URL must be an http(s) URL");
        }
        // Keep any path prefix when joining endpoint paths
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        tracing::info!(base_url = %base_url, "Order service client initialized");

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url, ServiceError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ServiceError::InvalidResponse(format!("bad endpoint {path}: {e}")))
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, ServiceError> {
        let url = self.url(path)?;
        self.send(self.client.get(url)).await
    }

    async fn post<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<R, ServiceError> {
        let url = self.url(path)?;
        self.send(self.client.post(url).json(body)).await
    }

    /// Sends the request and unwraps the response envelope.
    async fn send<R: DeserializeOwned>(&self, req: RequestBuilder) -> Result<R, ServiceError> {
        let request_id = Uuid::new_v4().to_string();
        let req = req.header("x-request-id", &request_id);

        debug!(request_id = %request_id, "Order service request");

        let response = req.send().await.map_err(|e| {
            error!(error = %e, request_id = %request_id, "Order service request failed");
            ServiceError::Unavailable(e.to_string())
        })?;

        let status = response.status();

        if status.is_success() {
            return response
                .json::<Envelope<R>>()
                .await
                .map(|envelope| envelope.data)
                .map_err(|e| {
                    error!(error = %e, "Failed to parse order service response");
                    ServiceError::InvalidResponse(e.to_string())
                });
        }

        let message = response
            .json::<ServiceErrorResponse>()
            .await
            .ok()
            .map(|e| e.message)
            .unwrap_or_else(|| format!("Order service error: {}", status));

        match status {
            StatusCode::NOT_FOUND => Err(ServiceError::NotFound),
            s if s.is_server_error() => {
                error!(status = %s, message = %message, "Order service error");
                Err(ServiceError::Unavailable(message))
            }
            s => Err(ServiceError::Rejected {
                status: s.as_u16(),
                message,
            }),
        }
    }
}

#[async_trait]
impl OrderService for HttpOrderService {
    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn upload_model(
        &self,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<UploadedModel, ServiceError> {
        let part = multipart::Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        let url = self.url("uploads")?;
        self.send(self.client.post(url).multipart(form)).await
    }

    #[instrument(skip(self, request), fields(file_name = %request.file_name))]
    async fn create_order(
        &self,
        request: &CreateOrderRequest,
    ) -> Result<OrderCreated, ServiceError> {
        self.post("orders", request).await
    }

    #[instrument(skip(self))]
    async fn order_status(&self, order_id: Uuid) -> Result<OrderStatusResponse, ServiceError> {
        self.get(&format!("orders/{}/status", order_id)).await
    }

    #[instrument(skip(self, request))]
    async fn confirm_order(
        &self,
        order_id: Uuid,
        request: &ConfirmOrderRequest,
    ) -> Result<OrderStatusResponse, ServiceError> {
        self.post(&format!("orders/{}/confirm", order_id), request)
            .await
    }

    #[instrument(skip(self))]
    async fn list_materials(&self) -> Result<Vec<MaterialProfile>, ServiceError> {
        self.get("materials").await
    }
}
