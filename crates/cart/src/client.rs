//! Storefront Cart Client Implementation
//!
//! Talks to the storefront AJAX cart API:
//! - `GET {base}/cart.js` - lines (`items`) and cart attributes
//! - `POST {base}/cart/change.js` - replace one line's properties
//! - `POST {base}/cart/update.js` - merge cart attributes

use serde::Deserialize;

use crate::{Attributes, Cart, CartBackend, CartError, CartLine};

#[derive(Debug, Deserialize)]
struct CartPayload {
    #[serde(default)]
    items: Vec<ItemPayload>,
    #[serde(default)]
    attributes: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ItemPayload {
    key: String,
    product_id: Option<serde_json::Value>,
    variant_id: Option<serde_json::Value>,
    #[serde(default)]
    quantity: u32,
    #[serde(default)]
    properties: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Keep only string-valued entries; the storefront reports cleared keys as null.
fn string_attributes(map: Option<serde_json::Map<String, serde_json::Value>>) -> Attributes {
    map.unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| match v {
            serde_json::Value::String(s) => Some((k, s)),
            _ => None,
        })
        .collect()
}

fn id_string(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl From<ItemPayload> for CartLine {
    fn from(item: ItemPayload) -> Self {
        CartLine {
            id: item.key,
            product_id: id_string(item.product_id),
            variant_id: id_string(item.variant_id),
            quantity: item.quantity,
            attributes: string_attributes(item.properties),
        }
    }
}

/// Storefront AJAX cart client
pub struct StorefrontCartClient {
    http: reqwest::Client,
    base_url: String,
    session_cookie: Option<String>,
}

impl StorefrontCartClient {
    pub fn new(base_url: String, session_cookie: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session_cookie,
        }
    }

    fn with_session(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.session_cookie {
            Some(cookie) => builder.header(reqwest::header::COOKIE, cookie),
            None => builder,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, CartError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read response body".to_string());
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CartError::LineNotFound(body));
        }
        Err(CartError::Response(format!(
            "Cart API returned {}: {}",
            status, body
        )))
    }
}

#[async_trait::async_trait]
impl CartBackend for StorefrontCartClient {
    async fn get_cart(&self) -> Result<Cart, CartError> {
        let response = self
            .with_session(self.http.get(format!("{}/cart.js", self.base_url)))
            .send()
            .await
            .map_err(|e| CartError::Request(e.to_string()))?;

        let payload: CartPayload = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| CartError::Response(format!("Invalid cart payload: {}", e)))?;

        Ok(Cart {
            lines: payload.items.into_iter().map(CartLine::from).collect(),
            attributes: string_attributes(payload.attributes),
        })
    }

    async fn update_line_attributes(
        &self,
        line_id: &str,
        attributes: Attributes,
    ) -> Result<(), CartError> {
        let body = serde_json::json!({
            "id": line_id,
            "properties": attributes,
        });
        let response = self
            .with_session(self.http.post(format!("{}/cart/change.js", self.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(|e| CartError::Request(e.to_string()))?;

        Self::check(response).await.map_err(|e| match e {
            CartError::LineNotFound(_) => CartError::LineNotFound(line_id.to_string()),
            other => other,
        })?;
        tracing::debug!(line_id = %line_id, "Cart line attributes updated");
        Ok(())
    }

    async fn update_cart_attributes(&self, attributes: Attributes) -> Result<(), CartError> {
        let body = serde_json::json!({ "attributes": attributes });
        let response = self
            .with_session(self.http.post(format!("{}/cart/update.js", self.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(|e| CartError::Request(e.to_string()))?;

        Self::check(response).await?;
        tracing::debug!(count = attributes.len(), "Cart attributes updated");
        Ok(())
    }
}
