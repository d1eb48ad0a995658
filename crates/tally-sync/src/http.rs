//! # HTTP Remote
//!
//! [`RemoteApi`] over JSON/HTTPS with `reqwest`.
//!
//! No retries happen here: a failed call is reported once and the caller
//! (sync manager retry policy, authenticator fallback) decides what next.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::TerminalConfig;
use crate::error::{RemoteError, RemoteResult};
use crate::remote::{
    CreditSubmission, Created, PinVerifyRequest, RemoteApi, RemoteProduct, RemoteWorker,
    SaleSubmission,
};
use tally_core::WorkerIdentity;

/// Store server client.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    store_token: String,
}

impl HttpRemote {
    /// Creates a client for `base_url` (e.g. `https://api.tally.example`).
    pub fn new(
        base_url: impl Into<String>,
        store_token: impl Into<String>,
        timeout: std::time::Duration,
    ) -> RemoteResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(HttpRemote {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store_token: store_token.into(),
        })
    }

    pub fn from_config(config: &TerminalConfig) -> RemoteResult<Self> {
        Self::new(
            config.base_url(),
            config.store.session_token.clone(),
            config.request_timeout(),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> RemoteResult<T> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.store_token)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn post_created<B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> RemoteResult<String> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.store_token)
            .json(body)
            .send()
            .await?;

        let response = check_status(response).await?;
        let created: Created = response.json().await?;
        Ok(created.id)
    }
}

/// Maps non-success statuses to `RemoteError`.
async fn check_status(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    debug!(status = %status, url = %response.url(), "Server responded");

    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(RemoteError::Unauthorized);
    }

    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn create_sale(&self, sale: &SaleSubmission) -> RemoteResult<String> {
        self.post_created("/api/sales", sale).await
    }

    async fn create_credit(&self, credit: &CreditSubmission) -> RemoteResult<String> {
        self.post_created("/api/credits", credit).await
    }

    async fn list_workers(&self, store_id: &str) -> RemoteResult<Vec<RemoteWorker>> {
        self.get_json(&format!("/api/stores/{store_id}/workers")).await
    }

    async fn list_products(&self, store_id: &str) -> RemoteResult<Vec<RemoteProduct>> {
        self.get_json(&format!("/api/stores/{store_id}/products")).await
    }

    async fn verify_pin(
        &self,
        request: &PinVerifyRequest,
        store_token: &str,
    ) -> RemoteResult<WorkerIdentity> {
        let response = self
            .client
            .post(self.url("/api/workers/verify-pin"))
            .bearer_auth(store_token)
            .json(request)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn health(&self) -> RemoteResult<()> {
        let response = self
            .client
            .head(self.url("/api/health"))
            .bearer_auth(&self.store_token)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;
    use tally_core::SaleLine;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpRemote {
        HttpRemote::new(server.uri(), "store-token", Duration::from_secs(2)).unwrap()
    }

    fn submission() -> SaleSubmission {
        SaleSubmission {
            idempotency_key: "till-1:sales:1".into(),
            terminal_id: "till-1".into(),
            local_id: 1,
            worker_id: "w1".into(),
            items: vec![SaleLine::new("p1", 2, 250, 100)],
            total_price_cents: 500,
            total_cost_cents: 200,
            amount_paid_cents: 300,
            is_partial: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_sale_returns_server_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/sales"))
            .and(header("authorization", "Bearer store-token"))
            .and(body_partial_json(serde_json::json!({
                "idempotency_key": "till-1:sales:1",
                "is_partial": true
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "srv-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server).create_sale(&submission()).await.unwrap();
        assert_eq!(id, "srv-1");
    }

    #[tokio::test]
    async fn server_error_maps_to_retryable_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/sales"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = client(&server).create_sale(&submission()).await.unwrap_err();
        match &err {
            RemoteError::Status { status, body } => {
                assert_eq!(*status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unauthorized_is_not_retryable() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/stores/store-1/workers"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server).list_workers("store-1").await.unwrap_err();
        assert!(matches!(err, RemoteError::Unauthorized));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn list_products_decodes_catalog() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/stores/store-1/products"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "id": "p1",
                    "name": "Maize Flour 2kg",
                    "brand": "Jogoo",
                    "cost_price_cents": 150,
                    "selling_price_cents": 210,
                    "quantity": 40,
                    "unit_name": "bag",
                    "bulk_quantity": 10,
                    "bulk_price_cents": 195
                }
            ])))
            .mount(&server)
            .await;

        let products = client(&server).list_products("store-1").await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].product_id, "p1");
        assert_eq!(products[0].bulk_price_cents, Some(195));
    }

    #[tokio::test]
    async fn verify_pin_uses_supplied_store_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/workers/verify-pin"))
            .and(header("authorization", "Bearer owner-session"))
            .and(body_partial_json(serde_json::json!({"pin": "1234", "store_id": "store-1"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"worker_id": "w1", "name": "Achieng"})),
            )
            .mount(&server)
            .await;

        let request = PinVerifyRequest {
            pin: "1234".into(),
            store_id: "store-1".into(),
        };
        let identity = client(&server)
            .verify_pin(&request, "owner-session")
            .await
            .unwrap();
        assert_eq!(identity.worker_id, "w1");
    }

    #[tokio::test]
    async fn health_reports_unreachable_server() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let remote = client(&server);
        assert!(remote.health().await.is_ok());

        let dead = HttpRemote::new("http://127.0.0.1:9", "t", Duration::from_millis(500)).unwrap();
        assert!(dead.health().await.unwrap_err().is_retryable());
    }
}
