//! Product API client.
//!
//! This module provides:
//!
//! - `Product`: an opaque JSON product record
//! - `ProductDataSource`: the three calls the product store depends on
//! - `HttpProductSource`: a `reqwest` implementation against a JSON REST API
//!
//! List endpoints may answer with a bare array or with an envelope object
//! carrying a `products` array; both decode to the same `Vec<Product>`.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// User agent for API requests
const USER_AGENT: &str = concat!("storefront/", env!("CARGO_PKG_VERSION"));

/// A product as returned by the API. The shape is not interpreted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Product(pub Value);

impl Product {
    /// The `id` field, if the record has one
    pub fn id(&self) -> Option<&Value> {
        self.0.get("id")
    }

    /// Display name: `title`, falling back to `name`
    pub fn display_name(&self) -> Option<&str> {
        self.0
            .get("title")
            .or_else(|| self.0.get("name"))
            .and_then(Value::as_str)
    }
}

impl From<Value> for Product {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Failure of a data source call
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status} - {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Where product data comes from.
///
/// Each method performs exactly one request. Implementations must not retry.
pub trait ProductDataSource: Send + Sync + 'static {
    fn get_by_id(&self, id: i64) -> BoxFuture<'_, SourceResult<Product>>;
    fn get_all(&self) -> BoxFuture<'_, SourceResult<Vec<Product>>>;
    fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, SourceResult<Vec<Product>>>;
}

/// Decode a list response: a bare array or `{ "products": [...] }`
pub fn parse_product_list(value: Value) -> SourceResult<Vec<Product>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("products") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(SourceError::Decode(format!(
                    "`products` is not an array: {}",
                    other
                )));
            }
            None => {
                return Err(SourceError::Decode(
                    "object response has no `products` field".to_string(),
                ));
            }
        },
        other => {
            return Err(SourceError::Decode(format!(
                "expected a product list, got {}",
                other
            )));
        }
    };

    Ok(items.into_iter().map(Product).collect())
}

/// Product API client over HTTP
#[derive(Clone)]
pub struct HttpProductSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProductSource {
    /// Create a client for the API rooted at `base_url`
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn product_url(&self, id: i64) -> String {
        format!("{}/products/{}", self.base_url, id)
    }

    fn products_url(&self) -> String {
        format!("{}/products", self.base_url)
    }

    fn search_url(&self) -> String {
        format!("{}/products/search", self.base_url)
    }

    /// Send a GET request and return the decoded JSON body
    async fn get_json(&self, request: reqwest::RequestBuilder) -> SourceResult<Value> {
        let request = request.header("Accept", "application/json").build()?;
        tracing::debug!("GET {}", request.url());

        let start = std::time::Instant::now();
        let response = self.client.execute(request).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let url = response.url().clone();
        let value: Value = response.json().await?;
        tracing::info!("GET {} answered in {:.2}s", url, start.elapsed().as_secs_f32());
        Ok(value)
    }
}

impl ProductDataSource for HttpProductSource {
    fn get_by_id(&self, id: i64) -> BoxFuture<'_, SourceResult<Product>> {
        Box::pin(async move {
            let value = self.get_json(self.client.get(self.product_url(id))).await?;
            if !value.is_object() {
                return Err(SourceError::Decode(format!(
                    "expected a product object, got {}",
                    value
                )));
            }
            Ok(Product(value))
        })
    }

    fn get_all(&self) -> BoxFuture<'_, SourceResult<Vec<Product>>> {
        Box::pin(async move {
            let value = self.get_json(self.client.get(self.products_url())).await?;
            let products = parse_product_list(value)?;
            tracing::info!("Fetched {} products", products.len());
            Ok(products)
        })
    }

    fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, SourceResult<Vec<Product>>> {
        Box::pin(async move {
            let request = self.client.get(self.search_url()).query(&[("q", query)]);
            let value = self.get_json(request).await?;
            let products = parse_product_list(value)?;
            tracing::info!("Search {:?} matched {} products", query, products.len());
            Ok(products)
        })
    }
}
