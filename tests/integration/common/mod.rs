//! Common fixtures for integration tests
//!
//! Builds a full pipeline over a temporary design directory, a mock image
//! store and a mock cart, and exposes the mocks for assertions.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use customizer_app::Pipeline;
use customizer_cart::mock::MockCartBackend;
use customizer_cart::CartLine;
use customizer_cdn::mock::MockImageStore;
use customizer_cdn::CdnConfig;
use customizer_checkout::ResolverConfig;
use customizer_common::config::{Config, DEFAULT_AUTOSAVE_INTERVAL_SECS, DEFAULT_STORE_KEY};
use customizer_designs::{
    DesignDraft, DesignState, DesignStore, ElementContent, FileMedium, Geometry, StageSize,
};

/// A stored-design fixture payload
pub const DATA_URL: &str = "data:image/png;base64,AAA";

pub struct TestPipeline {
    pub pipeline: Pipeline,
    pub cart: MockCartBackend,
    pub images: MockImageStore,
    pub dir: tempfile::TempDir,
}

impl TestPipeline {
    pub fn new(lines: Vec<CartLine>) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = test_config(dir.path().to_path_buf());
        let store = Arc::new(
            DesignStore::new(Arc::new(FileMedium::new(dir.path())))
                .with_key(config.design_store_key.clone()),
        );
        let cart = MockCartBackend::with_lines(lines);
        let images = MockImageStore::new();

        let pipeline = Pipeline::assemble(
            config,
            store,
            Arc::new(images.clone()),
            Arc::new(cart.clone()),
            ResolverConfig::from(&CdnConfig::default()),
        );

        Self {
            pipeline,
            cart,
            images,
            dir,
        }
    }

    /// A second store over the same directory, as after a page reload
    pub fn reopened_store(&self) -> DesignStore {
        DesignStore::new(Arc::new(FileMedium::new(self.dir.path())))
            .with_key(self.pipeline.config.design_store_key.clone())
    }
}

pub fn test_config(dir: PathBuf) -> Config {
    Config {
        design_store_dir: dir,
        design_store_key: DEFAULT_STORE_KEY.to_string(),
        autosave_interval_secs: DEFAULT_AUTOSAVE_INTERVAL_SECS,
        rust_log: "customizer=debug".to_string(),
    }
}

/// The canonical birthday mug: one image, one caption
pub fn birthday_mug(image_src: &str) -> DesignState {
    let mut state = DesignState::new(StageSize::new(500.0, 500.0));
    state
        .add_element(
            ElementContent::image(image_src),
            Geometry::at(50.0, 50.0).sized(200.0, 200.0),
        )
        .expect("image element");
    state
        .add_element(ElementContent::text("Happy Birthday"), Geometry::at(60.0, 300.0))
        .expect("text element");
    state
}

pub fn mug_draft(product_id: &str, image_src: &str) -> DesignDraft {
    let mut draft = birthday_mug(image_src).to_draft(product_id);
    draft.product_title = "Ceramic Mug".to_string();
    draft
}
