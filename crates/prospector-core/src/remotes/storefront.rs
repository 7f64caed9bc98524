//! Storefront client: creates product listings.
//!
//! One logical call per verified product. The retry layer covers
//! transport blips only; a semantic rejection (4xx) is terminal and the
//! orchestrator records the post as failed.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use prospector_llm::error::{RemoteError, Result};

/// Input to a product creation call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NewProduct {
    pub title: String,
    pub description: String,
    pub price_cents: i64,
}

/// A successfully created listing.
#[derive(Debug, Clone, serde::Serialize, Deserialize, PartialEq)]
pub struct ListedProduct {
    pub product_id: String,
    pub url: String,
}

/// Creates products on the storefront.
#[async_trait]
pub trait StorefrontClient: Send + Sync {
    async fn create_product(&self, product: &NewProduct) -> Result<ListedProduct>;
}

/// HTTP implementation over the storefront's products endpoint.
pub struct HttpStorefrontClient {
    base_url: String,
    token_env: String,
    http: reqwest::Client,
}

impl HttpStorefrontClient {
    pub fn new(base_url: String, token_env: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url,
            token_env,
            http,
        }
    }

    fn resolve_token(&self) -> Result<String> {
        std::env::var(&self.token_env)
            .map_err(|_| RemoteError::AuthFailed(format!("set {} env var", self.token_env)))
    }
}

#[derive(Deserialize)]
struct CreateResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    product: Option<ProductBody>,
}

#[derive(Deserialize)]
struct ProductBody {
    id: String,
    #[serde(default)]
    short_url: String,
}

#[async_trait]
impl StorefrontClient for HttpStorefrontClient {
    async fn create_product(&self, product: &NewProduct) -> Result<ListedProduct> {
        let token = self.resolve_token()?;
        let base = self.base_url.trim_end_matches('/');
        let url = format!("{base}/products");

        let body = serde_json::json!({
            "access_token": token,
            "name": product.title,
            "description": product.description,
            "price": product.price_cents,
        });

        let response = self.http.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout
            } else {
                RemoteError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(status.as_u16(), body));
        }

        let created: CreateResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("product parse: {e}")))?;

        match created.product {
            Some(p) if created.success => {
                info!(product_id = %p.id, "storefront product created");
                Ok(ListedProduct {
                    product_id: p.id,
                    url: p.short_url,
                })
            }
            _ => Err(RemoteError::InvalidResponse(
                "storefront reported no created product".into(),
            )),
        }
    }
}
