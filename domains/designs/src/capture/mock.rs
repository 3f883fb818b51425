//! Mock render surface for testing capture without an editor

use customizer_common::{Error, Result};

use super::{RasterFrame, RenderSurface};

/// Programmable surface: returns a fixed frame or a readout failure
#[derive(Debug, Clone)]
pub struct MockSurface {
    outcome: std::result::Result<RasterFrame, String>,
    overlay_visible: bool,
    requested_ratios: Vec<f64>,
    overlay_during_rasterize: Vec<bool>,
}

impl MockSurface {
    /// Surface that renders `frame` on every call
    pub fn new(frame: RasterFrame) -> Self {
        Self {
            outcome: Ok(frame),
            overlay_visible: false,
            requested_ratios: Vec::new(),
            overlay_during_rasterize: Vec::new(),
        }
    }

    /// Surface whose pixel readout is blocked
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            outcome: Err(reason.into()),
            overlay_visible: false,
            requested_ratios: Vec::new(),
            overlay_during_rasterize: Vec::new(),
        }
    }

    /// Change what the next rasterize call returns
    pub fn set_frame(&mut self, frame: RasterFrame) {
        self.outcome = Ok(frame);
    }

    pub fn requested_ratios(&self) -> Vec<f64> {
        self.requested_ratios.clone()
    }

    /// Overlay visibility observed at each rasterize call
    pub fn overlay_seen_during_rasterize(&self) -> Vec<bool> {
        self.overlay_during_rasterize.clone()
    }
}

#[async_trait::async_trait]
impl RenderSurface for MockSurface {
    fn overlay_visible(&self) -> bool {
        self.overlay_visible
    }

    fn set_overlay_visible(&mut self, visible: bool) {
        self.overlay_visible = visible;
    }

    async fn rasterize(&mut self, pixel_ratio: f64) -> Result<RasterFrame> {
        self.requested_ratios.push(pixel_ratio);
        self.overlay_during_rasterize.push(self.overlay_visible);
        match &self.outcome {
            Ok(frame) => Ok(frame.clone()),
            Err(reason) => Err(Error::Capture(format!("Pixel readout blocked: {}", reason))),
        }
    }
}
