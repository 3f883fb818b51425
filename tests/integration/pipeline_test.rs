//! End-to-end pipeline tests: edit, persist, capture, attach, materialize

use std::sync::{Arc, Mutex};
use std::time::Duration;

use customizer_cart::CartLine;
use customizer_cdn::mock::MOCK_CDN_BASE;
use customizer_checkout::attributes::{
    CUSTOM_DESIGN, DESIGN_IMAGE_URL, DESIGN_URLS, PREPARED_DESIGN_URLS,
};
use customizer_checkout::LineState;
use customizer_designs::capture::mock::MockSurface;
use customizer_designs::{
    ArtifactCapture, DesignPatch, RasterFrame, StageSize, TransformPatch, MAX_DESIGNS,
};

mod common;
use common::{birthday_mug, mug_draft, TestPipeline, DATA_URL};

#[tokio::test]
async fn test_design_to_checkout_end_to_end() {
    let t = TestPipeline::new(vec![CartLine::new("L1", 1)]);

    let saved = t.pipeline.store.save(mug_draft("prod_123", DATA_URL)).await.unwrap();
    t.pipeline.attach_design("L1", &saved, None).await.unwrap();

    let attached = t.cart.line_attributes("L1").unwrap();
    assert_eq!(attached[DESIGN_IMAGE_URL], DATA_URL);
    assert_eq!(attached[DESIGN_URLS], format!("[\"{}\"]", DATA_URL));

    let report = t.pipeline.prepare_checkout().await.unwrap();

    let prepared = t.cart.line_attributes("L1").unwrap();
    assert_eq!(prepared[CUSTOM_DESIGN], "true");
    let primary = prepared[DESIGN_IMAGE_URL].clone();
    assert!(primary.starts_with(MOCK_CDN_BASE));
    assert_eq!(prepared["Design 1"], primary);
    assert_eq!(t.images.upload_count(), 1);
    assert_eq!(report.line("L1").unwrap().state, LineState::Prepared);
    assert!(report.is_fully_prepared());
}

#[tokio::test]
async fn test_materializing_twice_is_idempotent() {
    let t = TestPipeline::new(vec![CartLine::new("L1", 1), CartLine::new("L2", 2)]);

    let front = t.pipeline.store.save(mug_draft("prod_123", DATA_URL)).await.unwrap();
    let back = t
        .pipeline
        .store
        .save(mug_draft("prod_456", "https://images.example.com/dog.png"))
        .await
        .unwrap();
    t.pipeline.attach_design("L1", &front, None).await.unwrap();
    t.pipeline.attach_design("L2", &back, None).await.unwrap();

    t.pipeline.prepare_checkout().await.unwrap();
    let after_first = t.cart.snapshot();
    let uploads = t.images.upload_count();
    assert_eq!(uploads, 2);

    let second = t.pipeline.prepare_checkout().await.unwrap();

    assert_eq!(t.cart.snapshot(), after_first);
    assert_eq!(t.images.upload_count(), uploads);
    assert_eq!(second.uploads, 0);
    assert!(second.lines.iter().all(|l| !l.rewritten));
}

#[tokio::test]
async fn test_captured_artifact_becomes_primary_image() {
    let t = TestPipeline::new(vec![CartLine::new("L1", 1)]);
    let state = birthday_mug(DATA_URL);

    let mut surface = MockSurface::new(RasterFrame::filled(1000, 1000, [200, 30, 30, 255]));
    let artifact = ArtifactCapture::new()
        .capture(&mut surface, state.stage())
        .await
        .unwrap();

    let mut draft = state.to_draft("prod_123");
    draft.design_image_base64 = Some(artifact.to_data_url());
    let saved = t.pipeline.store.save(draft).await.unwrap();
    t.pipeline
        .attach_design("L1", &saved, Some(&artifact))
        .await
        .unwrap();

    t.pipeline.prepare_checkout().await.unwrap();

    // The capture and the element image are two different uploads
    assert_eq!(t.images.upload_count(), 2);
    let uploaded: Vec<String> = t.images.recorded_uploads().into_iter().map(|r| r.file).collect();
    assert!(uploaded.contains(&artifact.to_data_url()));
    assert!(uploaded.contains(&DATA_URL.to_string()));

    let prepared = t.cart.line_attributes("L1").unwrap();
    assert_ne!(prepared[DESIGN_IMAGE_URL], prepared["Design 1"]);
}

#[tokio::test]
async fn test_local_storage_reference_resolves_from_design_store() {
    let t = TestPipeline::new(vec![]);
    let mut draft = mug_draft("prod_123", DATA_URL);
    draft.design_image_base64 = Some("data:image/png;base64,Q0FQVFVSRQ==".to_string());
    let saved = t.pipeline.store.save(draft).await.unwrap();

    t.cart.push_line(
        CartLine::new("L1", 1)
            .with_attribute(CUSTOM_DESIGN, "true")
            .with_attribute(DESIGN_IMAGE_URL, format!("localStorage://{}", saved.id)),
    );

    let report = t.pipeline.prepare_checkout().await.unwrap();

    assert_eq!(report.line("L1").unwrap().state, LineState::Prepared);
    assert_eq!(
        t.images.recorded_uploads()[0].file,
        "data:image/png;base64,Q0FQVFVSRQ=="
    );
}

#[tokio::test]
async fn test_evicted_design_falls_back_to_line_url() {
    let t = TestPipeline::new(vec![]);
    let fallback = "https://res.cloudinary.com/shop/image/upload/base.png";
    t.cart.push_line(
        CartLine::new("L1", 1)
            .with_attribute(CUSTOM_DESIGN, "true")
            .with_attribute(DESIGN_IMAGE_URL, "localStorage://design_long_gone")
            .with_attribute("_customized_base_image", fallback),
    );

    let report = t.pipeline.prepare_checkout().await.unwrap();

    assert_eq!(report.line("L1").unwrap().state, LineState::Prepared);
    assert_eq!(t.cart.line_attributes("L1").unwrap()[DESIGN_IMAGE_URL], fallback);
    assert_eq!(t.images.upload_count(), 0);
}

#[tokio::test]
async fn test_cdn_outage_degrades_but_prepares_cart() {
    let t = TestPipeline::new(vec![CartLine::new("L1", 1)]);
    let saved = t.pipeline.store.save(mug_draft("prod_123", DATA_URL)).await.unwrap();
    t.pipeline.attach_design("L1", &saved, None).await.unwrap();
    t.images
        .behavior()
        .set_outcome(customizer_cdn::mock::MockOutcome::Fail);

    let report = t.pipeline.prepare_checkout().await.unwrap();

    assert_eq!(
        report.line("L1").unwrap().state,
        LineState::PreparedWithDegradedImage
    );
    assert!(report.partial_error().is_some());
    assert_eq!(t.cart.line_attributes("L1").unwrap()[DESIGN_IMAGE_URL], DATA_URL);
    assert!(!t.cart.snapshot().attributes.contains_key(PREPARED_DESIGN_URLS));

    t.images.behavior().reset();
    let retry = t.pipeline.prepare_checkout().await.unwrap();
    assert!(retry.is_fully_prepared());
    assert!(t.cart.snapshot().attributes.contains_key(PREPARED_DESIGN_URLS));
}

#[tokio::test]
async fn test_designs_survive_reload() {
    let t = TestPipeline::new(vec![]);
    let mut state = birthday_mug(DATA_URL);
    let caption = state.elements()[1].id.clone();
    state
        .transform_element(&caption, TransformPatch::move_to(120.0, 320.0))
        .unwrap();

    let saved = t.pipeline.store.save(state.to_draft("prod_123")).await.unwrap();

    let reopened = t.reopened_store();
    let loaded = reopened.get_by_id(&saved.id).await.unwrap().unwrap();
    assert_eq!(loaded, saved);
    assert_eq!(reopened.current_id().await.unwrap(), Some(saved.id.clone()));

    let restored = customizer_designs::DesignState::from_stored(&loaded);
    assert_eq!(restored.element(&caption).unwrap().x, 120.0);
}

#[tokio::test]
async fn test_store_is_bounded_across_products() {
    let t = TestPipeline::new(vec![]);
    let mut first = None;
    for i in 0..=MAX_DESIGNS {
        let saved = t
            .pipeline
            .store
            .save(mug_draft(&format!("prod_{}", i), DATA_URL))
            .await
            .unwrap();
        first.get_or_insert(saved.id);
        // lastModified has millisecond resolution
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let all = t.pipeline.store.list().await.unwrap();
    assert_eq!(all.len(), MAX_DESIGNS);
    assert!(all.iter().all(|d| Some(&d.id) != first.as_ref()));
}

#[tokio::test]
async fn test_slot_lookup_after_updates() {
    let t = TestPipeline::new(vec![]);
    let mut front = mug_draft("prod_123", DATA_URL);
    front.selected_custom_image = Some("front".to_string());
    let saved = t.pipeline.store.save(front).await.unwrap();

    t.pipeline
        .store
        .update(
            &saved.id,
            DesignPatch {
                name: Some("Front print".to_string()),
                ..DesignPatch::default()
            },
        )
        .await
        .unwrap();

    let found = t
        .pipeline
        .store
        .get_for_product_and_slot("prod_123", Some("front"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, saved.id);
    assert_eq!(found.name.as_deref(), Some("Front print"));
    assert_eq!(t.pipeline.store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_autosave_session_feeds_checkout() {
    let t = TestPipeline::new(vec![CartLine::new("L1", 1)]);
    let draft = Arc::new(Mutex::new(mug_draft("prod_123", DATA_URL)));

    let snapshot = {
        let draft = Arc::clone(&draft);
        move || Some(draft.lock().unwrap().clone())
    };
    let session = t
        .pipeline
        .store
        .start_auto_save(snapshot, t.pipeline.config.autosave_interval());

    let id = session.save_now().await.unwrap();
    draft.lock().unwrap().stage_size = StageSize::new(600.0, 600.0);
    assert_eq!(session.save_now().await, Some(id.clone()));
    session.stop().await;

    let design = t.pipeline.store.get_by_id(&id).await.unwrap().unwrap();
    assert_eq!(design.stage_size, StageSize::new(600.0, 600.0));

    t.pipeline.attach_design("L1", &design, None).await.unwrap();
    let report = t.pipeline.prepare_checkout().await.unwrap();
    assert!(report.is_fully_prepared());
}
