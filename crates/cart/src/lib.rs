//! Cart Backend
//!
//! Access to the commerce backend's cart for checkout preparation:
//! - Storefront AJAX cart API integration (`/cart.js`, `/cart/change.js`, `/cart/update.js`)
//! - In-memory mock cart for testing and development
//! - Lines and attributes are keyed by opaque string ids

pub mod client;
pub mod mock;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CartError {
    #[error("Cart configuration error: {0}")]
    Configuration(String),

    #[error("Cart request error: {0}")]
    Request(String),

    #[error("Cart response error: {0}")]
    Response(String),

    #[error("Cart line not found: {0}")]
    LineNotFound(String),
}

/// String attributes attached to a line or to the cart itself
pub type Attributes = BTreeMap<String, String>;

/// One line of the cart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    /// Opaque line id
    pub id: String,
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub quantity: u32,
    pub attributes: Attributes,
}

impl CartLine {
    pub fn new(id: impl Into<String>, quantity: u32) -> Self {
        Self {
            id: id.into(),
            product_id: None,
            variant_id: None,
            quantity,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes.extend(attributes);
        self
    }
}

/// Snapshot of the whole cart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub lines: Vec<CartLine>,
    pub attributes: Attributes,
}

/// Cart backend configuration
#[derive(Clone)]
pub struct CartConfig {
    /// Backend provider (storefront, mock)
    pub provider: String,
    /// Storefront base URL for the storefront provider
    pub base_url: Option<String>,
    /// Session cookie identifying the shopper's cart
    pub session_cookie: Option<String>,
}

impl std::fmt::Debug for CartConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field(
                "session_cookie",
                &self.session_cookie.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl CartConfig {
    /// Create cart config from environment variables
    pub fn from_env() -> Result<Self, CartError> {
        let provider = std::env::var("CART_PROVIDER").unwrap_or_else(|_| "mock".to_string());
        let base_url = std::env::var("CART_BASE_URL").ok();
        let session_cookie = std::env::var("CART_SESSION_COOKIE").ok();

        Ok(Self {
            provider,
            base_url,
            session_cookie,
        })
    }
}

/// Cart backend trait; the materializer depends on nothing else
#[async_trait::async_trait]
pub trait CartBackend: Send + Sync {
    /// Fetch every line plus the cart-level attributes
    async fn get_cart(&self) -> Result<Cart, CartError>;

    /// Replace the attributes of one line
    async fn update_line_attributes(
        &self,
        line_id: &str,
        attributes: Attributes,
    ) -> Result<(), CartError>;

    /// Merge attributes into the cart-level attributes
    async fn update_cart_attributes(&self, attributes: Attributes) -> Result<(), CartError>;
}

/// Factory for creating CartBackend implementations
pub struct CartBackendFactory;

impl CartBackendFactory {
    pub fn create(config: CartConfig) -> Result<Box<dyn CartBackend>, CartError> {
        match config.provider.as_str() {
            "storefront" => {
                let base_url = config.base_url.ok_or_else(|| {
                    CartError::Configuration(
                        "CART_BASE_URL is required for the storefront provider".to_string(),
                    )
                })?;
                tracing::info!(base_url = %base_url, "Creating storefront cart client");
                Ok(Box::new(client::StorefrontCartClient::new(
                    base_url,
                    config.session_cookie,
                )))
            }
            "mock" => {
                tracing::info!("Creating mock cart backend");
                Ok(Box::new(mock::MockCartBackend::new()))
            }
            provider => Err(CartError::Configuration(format!(
                "Unknown cart provider: {}. Supported providers: storefront, mock",
                provider
            ))),
        }
    }
}
