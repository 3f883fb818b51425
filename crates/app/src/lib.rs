//! Customizer pipeline composition root
//!
//! Wires the design store, durable image store, cart backend, storage
//! resolver and checkout materializer together from configuration.

use std::sync::Arc;

use customizer_cart::{CartBackend, CartBackendFactory, CartConfig};
use customizer_cdn::{CdnConfig, ImageStore, ImageStoreFactory};
use customizer_checkout::{
    CartLineDesignAttributes, CheckoutMaterializer, MaterializationReport, ResolverConfig,
    StorageResolver,
};
use customizer_common::config::Config;
use customizer_common::{Error, PayloadSource};
use customizer_designs::{CapturedArtifact, DesignStore, FileMedium, StoredDesign};
use tracing_subscriber::EnvFilter;

/// Tracing filter: `RUST_LOG` when it parses, else the configured fallback
pub fn log_filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.rust_log))
}

/// The assembled pipeline
pub struct Pipeline {
    pub config: Config,
    pub store: Arc<DesignStore>,
    pub images: Arc<dyn ImageStore>,
    pub cart: Arc<dyn CartBackend>,
    pub resolver: Arc<StorageResolver>,
    pub materializer: CheckoutMaterializer,
}

impl Pipeline {
    /// Build every component from environment variables
    pub fn from_env() -> Result<Self, anyhow::Error> {
        Self::from_env_with(Config::from_env()?)
    }

    /// Build around an already loaded `Config`, reading provider settings from the environment
    pub fn from_env_with(config: Config) -> Result<Self, anyhow::Error> {
        let cdn_config = CdnConfig::from_env()?;
        let cart_config = CartConfig::from_env()?;
        Self::from_config(config, &cdn_config, cart_config)
    }

    /// Build every component from explicit configuration
    pub fn from_config(
        config: Config,
        cdn_config: &CdnConfig,
        cart_config: CartConfig,
    ) -> Result<Self, anyhow::Error> {
        tracing::info!(
            cdn_provider = %cdn_config.provider,
            cart_provider = %cart_config.provider,
            store_dir = %config.design_store_dir.display(),
            "Assembling customizer pipeline"
        );

        let medium = FileMedium::new(config.design_store_dir.clone());
        let store = Arc::new(
            DesignStore::new(Arc::new(medium)).with_key(config.design_store_key.clone()),
        );
        let images: Arc<dyn ImageStore> = Arc::from(ImageStoreFactory::create(cdn_config)?);
        let cart: Arc<dyn CartBackend> = Arc::from(CartBackendFactory::create(cart_config)?);

        Ok(Self::assemble(
            config,
            store,
            images,
            cart,
            ResolverConfig::from(cdn_config),
        ))
    }

    /// Wire already-built components; stored designs back opaque references
    pub fn assemble(
        config: Config,
        store: Arc<DesignStore>,
        images: Arc<dyn ImageStore>,
        cart: Arc<dyn CartBackend>,
        resolver_config: ResolverConfig,
    ) -> Self {
        let payloads: Arc<dyn PayloadSource> = store.clone();
        let resolver = Arc::new(StorageResolver::new(
            images.clone(),
            payloads,
            resolver_config,
        ));
        let materializer = CheckoutMaterializer::new(cart.clone(), resolver.clone());

        Self {
            config,
            store,
            images,
            cart,
            resolver,
            materializer,
        }
    }

    /// Attach a design to a cart line at add-to-cart time.
    ///
    /// Existing unrelated line attributes are kept.
    pub async fn attach_design(
        &self,
        line_id: &str,
        design: &StoredDesign,
        capture: Option<&CapturedArtifact>,
    ) -> Result<(), Error> {
        let cart = self
            .cart
            .get_cart()
            .await
            .map_err(|e| Error::CartUnavailable(e.to_string()))?;
        let line = cart
            .lines
            .iter()
            .find(|l| l.id == line_id)
            .ok_or_else(|| Error::NotFound(format!("Cart line {} not found", line_id)))?;

        let mut attributes = line.attributes.clone();
        attributes.extend(CartLineDesignAttributes::for_design(design, capture)?.to_attributes());

        self.cart
            .update_line_attributes(line_id, attributes)
            .await
            .map_err(|e| Error::CartUnavailable(format!("Line {}: {}", line_id, e)))?;
        tracing::info!(line_id = %line_id, design_id = %design.id, "Design attached to cart line");
        Ok(())
    }

    /// Prepare the cart for checkout
    pub async fn prepare_checkout(&self) -> Result<MaterializationReport, Error> {
        self.materializer.prepare().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    use tracing_subscriber::filter::LevelFilter;

    fn clear_env() {
        for key in [
            "RUST_LOG",
            "DESIGN_STORE_DIR",
            "DESIGN_STORE_KEY",
            "AUTOSAVE_INTERVAL_SECS",
            "CDN_PROVIDER",
            "CDN_UPLOAD_URL",
            "CART_PROVIDER",
            "CART_BASE_URL",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults_to_mocks() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("DESIGN_STORE_DIR", dir.path());

        let pipeline = Pipeline::from_env().unwrap();

        assert_eq!(pipeline.store.key(), "customDesigns");
        assert_eq!(
            pipeline.resolver.config().durable_hosts,
            vec!["res.cloudinary.com".to_string()]
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_unknown_cdn_provider() {
        clear_env();
        std::env::set_var("CDN_PROVIDER", "carrier-pigeon");

        let err = Pipeline::from_env().err().unwrap();
        assert!(err.to_string().contains("carrier-pigeon"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_requires_upload_url_for_http_cdn() {
        clear_env();
        std::env::set_var("CDN_PROVIDER", "http");

        assert!(Pipeline::from_env().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_log_filter_falls_back_to_config() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("DESIGN_STORE_DIR", dir.path());
        let config = Config::from_env().unwrap();

        let filter = log_filter(&config);

        assert_eq!(config.rust_log, "customizer=info");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_log_filter_prefers_rust_log() {
        clear_env();
        std::env::set_var("RUST_LOG", "customizer_checkout=trace");
        let config = Config::from_env().unwrap();
        std::env::set_var("RUST_LOG", "customizer_checkout=debug");

        let filter = log_filter(&config);

        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
        clear_env();
    }
}
