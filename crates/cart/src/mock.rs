//! Mock Cart Backend Implementation
//!
//! In-memory cart for test assertions. Counts every write so tests can
//! check idempotency, and can be switched to "unreachable" or told to fail
//! writes for particular lines.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::{Attributes, Cart, CartBackend, CartError, CartLine};

#[derive(Debug, Default)]
struct MockCartState {
    cart: Cart,
    unreachable: bool,
    failing_lines: HashSet<String>,
    line_writes: usize,
    cart_writes: usize,
}

/// Mock cart backend that keeps the cart in memory
#[derive(Debug, Clone, Default)]
pub struct MockCartBackend {
    state: Arc<Mutex<MockCartState>>,
}

impl MockCartBackend {
    /// Create an empty mock cart
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock cart holding these lines
    pub fn with_lines(lines: Vec<CartLine>) -> Self {
        let backend = Self::new();
        backend.lock().cart.lines = lines;
        backend
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockCartState> {
        self.state
            .lock()
            .expect("cart lock poisoned: a prior test panicked")
    }

    /// Add a line
    pub fn push_line(&self, line: CartLine) {
        self.lock().cart.lines.push(line);
    }

    /// Current snapshot of the cart
    pub fn snapshot(&self) -> Cart {
        self.lock().cart.clone()
    }

    /// Attributes of one line
    pub fn line_attributes(&self, line_id: &str) -> Option<Attributes> {
        self.lock()
            .cart
            .lines
            .iter()
            .find(|l| l.id == line_id)
            .map(|l| l.attributes.clone())
    }

    /// Make every call fail as if the backend were down
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Make attribute writes for this line fail
    pub fn fail_line_writes(&self, line_id: impl Into<String>) {
        self.lock().failing_lines.insert(line_id.into());
    }

    /// Number of successful line attribute writes
    pub fn line_write_count(&self) -> usize {
        self.lock().line_writes
    }

    /// Number of successful cart attribute writes
    pub fn cart_write_count(&self) -> usize {
        self.lock().cart_writes
    }
}

#[async_trait::async_trait]
impl CartBackend for MockCartBackend {
    async fn get_cart(&self) -> Result<Cart, CartError> {
        let state = self.lock();
        if state.unreachable {
            return Err(CartError::Request("Mock cart unreachable".to_string()));
        }
        Ok(state.cart.clone())
    }

    async fn update_line_attributes(
        &self,
        line_id: &str,
        attributes: Attributes,
    ) -> Result<(), CartError> {
        let mut state = self.lock();
        if state.unreachable {
            return Err(CartError::Request("Mock cart unreachable".to_string()));
        }
        if state.failing_lines.contains(line_id) {
            return Err(CartError::Response(format!(
                "Mock write failure for line {}",
                line_id
            )));
        }
        let line = state
            .cart
            .lines
            .iter_mut()
            .find(|l| l.id == line_id)
            .ok_or_else(|| CartError::LineNotFound(line_id.to_string()))?;
        line.attributes = attributes;
        state.line_writes += 1;
        tracing::debug!(line_id = %line_id, "Mock cart: line attributes replaced");
        Ok(())
    }

    async fn update_cart_attributes(&self, attributes: Attributes) -> Result<(), CartError> {
        let mut state = self.lock();
        if state.unreachable {
            return Err(CartError::Request("Mock cart unreachable".to_string()));
        }
        state.cart.attributes.extend(attributes);
        state.cart_writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_mock_cart_round_trip() {
        let backend = MockCartBackend::with_lines(vec![CartLine::new("L1", 1)]);

        let mut attributes = Attributes::new();
        attributes.insert("_custom_design".to_string(), "true".to_string());
        backend.update_line_attributes("L1", attributes).await.unwrap();

        let cart = backend.get_cart().await.unwrap();
        assert_eq!(
            cart.lines[0].attributes.get("_custom_design").map(String::as_str),
            Some("true")
        );
        assert_eq!(backend.line_write_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_cart_unknown_line() {
        let backend = MockCartBackend::new();
        let err = backend
            .update_line_attributes("missing", Attributes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::LineNotFound(_)));
        assert_eq!(backend.line_write_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_cart_unreachable() {
        let backend = MockCartBackend::with_lines(vec![CartLine::new("L1", 1)]);
        backend.set_unreachable(true);

        assert_err!(backend.get_cart().await);
        assert_err!(backend.update_cart_attributes(Attributes::new()).await);
    }

    #[tokio::test]
    async fn test_mock_cart_attributes_merge() {
        let backend = MockCartBackend::new();

        let mut first = Attributes::new();
        first.insert("a".to_string(), "1".to_string());
        backend.update_cart_attributes(first).await.unwrap();

        let mut second = Attributes::new();
        second.insert("b".to_string(), "2".to_string());
        backend.update_cart_attributes(second).await.unwrap();

        let cart = backend.get_cart().await.unwrap();
        assert_eq!(cart.attributes.len(), 2);
        assert_eq!(backend.cart_write_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_cart_failing_line() {
        let backend =
            MockCartBackend::with_lines(vec![CartLine::new("L1", 1), CartLine::new("L2", 1)]);
        backend.fail_line_writes("L1");

        assert_err!(backend.update_line_attributes("L1", Attributes::new()).await);
        assert_ok!(backend.update_line_attributes("L2", Attributes::new()).await);
    }
}
