//! Artifact capture: rasterize the full composition into a PNG
//!
//! The editor surface renders; this module hides the selection overlay for
//! the duration of the readout, checks the frame, and encodes it.

pub mod mock;

use std::ops::{Deref, DerefMut};

use image::{ExtendedColorType, ImageEncoder};

use customizer_common::{Error, ImageReference, Result};

use crate::domain::entities::StageSize;

/// Pixel-density multiplier for captures
pub const PIXEL_RATIO: f64 = 2.0;

/// Straight (non-premultiplied) RGBA8 pixels, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RasterFrame {
    /// A frame filled with one RGBA colour
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    fn is_blank(&self) -> bool {
        self.pixels.chunks_exact(4).all(|px| px[3] == 0)
    }
}

/// Editor surface that can draw the composition off-screen
#[async_trait::async_trait]
pub trait RenderSurface: Send {
    fn overlay_visible(&self) -> bool;

    fn set_overlay_visible(&mut self, visible: bool);

    /// Render every element in z-order over the template.
    ///
    /// Fails with `Capture` when pixel readout is blocked.
    async fn rasterize(&mut self, pixel_ratio: f64) -> Result<RasterFrame>;
}

/// Hides the overlay while held and restores its previous visibility on drop
pub struct OverlayGuard<'a, S: RenderSurface + ?Sized> {
    surface: &'a mut S,
    was_visible: bool,
}

impl<'a, S: RenderSurface + ?Sized> OverlayGuard<'a, S> {
    pub fn hide(surface: &'a mut S) -> Self {
        let was_visible = surface.overlay_visible();
        if was_visible {
            surface.set_overlay_visible(false);
        }
        Self {
            surface,
            was_visible,
        }
    }
}

impl<S: RenderSurface + ?Sized> Deref for OverlayGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.surface
    }
}

impl<S: RenderSurface + ?Sized> DerefMut for OverlayGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.surface
    }
}

impl<S: RenderSurface + ?Sized> Drop for OverlayGuard<'_, S> {
    fn drop(&mut self) {
        if self.was_visible {
            self.surface.set_overlay_visible(true);
        }
    }
}

/// A lossless capture of the composition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedArtifact {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl CapturedArtifact {
    pub fn to_data_url(&self) -> String {
        self.to_reference().to_string()
    }

    pub fn to_reference(&self) -> ImageReference {
        ImageReference::data_url_from_bytes("image/png", &self.png)
    }
}

/// Produces `CapturedArtifact`s from a render surface
#[derive(Debug, Clone, Copy)]
pub struct ArtifactCapture {
    pixel_ratio: f64,
}

impl Default for ArtifactCapture {
    fn default() -> Self {
        Self {
            pixel_ratio: PIXEL_RATIO,
        }
    }
}

impl ArtifactCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pixel_ratio(&self) -> f64 {
        self.pixel_ratio
    }

    fn expected_size(&self, stage: StageSize) -> (u32, u32) {
        (
            (stage.width * self.pixel_ratio).round() as u32,
            (stage.height * self.pixel_ratio).round() as u32,
        )
    }

    /// Rasterize the composition with the overlay hidden
    pub async fn capture<S>(&self, surface: &mut S, stage: StageSize) -> Result<CapturedArtifact>
    where
        S: RenderSurface + ?Sized,
    {
        let frame = {
            let mut guard = OverlayGuard::hide(surface);
            guard.rasterize(self.pixel_ratio).await?
        };

        let (width, height) = self.expected_size(stage);
        if frame.width != width || frame.height != height {
            return Err(Error::Capture(format!(
                "Rasterized frame is {}x{}, expected {}x{}",
                frame.width, frame.height, width, height
            )));
        }
        if frame.pixels.len() != width as usize * height as usize * 4 {
            return Err(Error::Capture(format!(
                "Rasterized frame has {} bytes for {}x{} RGBA",
                frame.pixels.len(),
                width,
                height
            )));
        }
        if frame.is_blank() {
            return Err(Error::Capture(
                "Rasterized frame is blank; a source may be blocking pixel readout".to_string(),
            ));
        }

        let mut png = Vec::new();
        image::codecs::png::PngEncoder::new(&mut png)
            .write_image(&frame.pixels, width, height, ExtendedColorType::Rgba8)
            .map_err(|e| Error::Capture(format!("PNG encoding failed: {}", e)))?;

        tracing::debug!(width, height, bytes = png.len(), "Captured design artifact");
        Ok(CapturedArtifact { png, width, height })
    }
}
