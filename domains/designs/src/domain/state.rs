//! In-memory model of one editing session
//!
//! Holds the stage, the element list and the selection. Every operation
//! either applies completely or returns an error and leaves the model
//! untouched. Invariants:
//! - element ids are unique
//! - `z_index` values are unique, so they form a total paint order
//! - at most one element is selected
//! - scales are stored as magnitudes, never negative

use uuid::Uuid;

use customizer_common::{Error, Result};

use super::entities::{
    DesignDraft, DesignElement, ElementContent, Geometry, StageSize, StoredDesign, TextPatch,
    TransformPatch, MIN_DIMENSION,
};

/// Editing state for one design
#[derive(Debug, Clone, PartialEq)]
pub struct DesignState {
    stage: StageSize,
    elements: Vec<DesignElement>,
}

impl DesignState {
    pub fn new(stage: StageSize) -> Self {
        Self {
            stage,
            elements: Vec::new(),
        }
    }

    /// Hydrate an editor from a persisted snapshot; nothing starts selected.
    pub fn from_stored(design: &StoredDesign) -> Self {
        let mut elements = design.elements.clone();
        for element in &mut elements {
            element.selected = false;
            element.scale_x = element.scale_x.abs();
            element.scale_y = element.scale_y.abs();
        }
        Self {
            stage: design.stage_size,
            elements,
        }
    }

    pub fn stage(&self) -> StageSize {
        self.stage
    }

    /// Elements in insertion order
    pub fn elements(&self) -> &[DesignElement] {
        &self.elements
    }

    pub fn element(&self, id: &str) -> Option<&DesignElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn selected(&self) -> Option<&DesignElement> {
        self.elements.iter().find(|e| e.selected)
    }

    /// Elements in ascending paint order
    pub fn paint_order(&self) -> Vec<&DesignElement> {
        let mut ordered: Vec<&DesignElement> = self.elements.iter().collect();
        ordered.sort_by_key(|e| e.z_index);
        ordered
    }

    /// `src` of every image element, bottom-most first
    pub fn image_sources(&self) -> Vec<String> {
        self.paint_order()
            .into_iter()
            .filter_map(|e| e.src().map(str::to_string))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn index_of(&self, id: &str) -> Result<usize> {
        self.elements
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| Error::NotFound(format!("Element {} not found", id)))
    }

    fn max_z(&self) -> Option<i64> {
        self.elements.iter().map(|e| e.z_index).max()
    }

    fn min_z(&self) -> Option<i64> {
        self.elements.iter().map(|e| e.z_index).min()
    }

    /// Append an element above everything else and return its id.
    pub fn add_element(&mut self, content: ElementContent, geometry: Geometry) -> Result<String> {
        let id = format!("el_{}", Uuid::new_v4().simple());
        let element = DesignElement {
            id: id.clone(),
            content,
            x: geometry.x,
            y: geometry.y,
            rotation: geometry.rotation,
            scale_x: geometry.scale_x,
            scale_y: geometry.scale_y,
            width: geometry.width,
            height: geometry.height,
            opacity: geometry.opacity,
            z_index: self.max_z().map_or(0, |z| z + 1),
            selected: false,
        };
        let element = self.bounded(element)?;
        self.elements.push(element);
        Ok(id)
    }

    /// Select one element, deselecting any other.
    pub fn select_element(&mut self, id: &str) -> Result<()> {
        let index = self.index_of(id)?;
        for (i, element) in self.elements.iter_mut().enumerate() {
            element.selected = i == index;
        }
        Ok(())
    }

    pub fn deselect_all(&mut self) {
        for element in &mut self.elements {
            element.selected = false;
        }
    }

    /// Merge a geometry change into an element.
    ///
    /// Scales are stored as magnitudes. Position and size are clamped to
    /// the stage; a resize below [`MIN_DIMENSION`] is rejected and the
    /// previous box kept.
    pub fn transform_element(&mut self, id: &str, patch: TransformPatch) -> Result<()> {
        let index = self.index_of(id)?;
        let mut next = self.elements[index].clone();

        if let Some(x) = patch.x {
            next.x = x;
        }
        if let Some(y) = patch.y {
            next.y = y;
        }
        if let Some(rotation) = patch.rotation {
            next.rotation = rotation;
        }
        if let Some(scale_x) = patch.scale_x {
            next.scale_x = scale_x;
        }
        if let Some(scale_y) = patch.scale_y {
            next.scale_y = scale_y;
        }
        if let Some(width) = patch.width {
            next.width = Some(width);
        }
        if let Some(height) = patch.height {
            next.height = Some(height);
        }
        if let Some(opacity) = patch.opacity {
            next.opacity = opacity;
        }

        let next = self.bounded(next)?;
        self.elements[index] = next;
        Ok(())
    }

    /// Apply the stage bounding policy to a candidate element.
    fn bounded(&self, mut element: DesignElement) -> Result<DesignElement> {
        let values = [
            element.x,
            element.y,
            element.rotation,
            element.scale_x,
            element.scale_y,
            element.opacity,
            element.width.unwrap_or(0.0),
            element.height.unwrap_or(0.0),
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::Validation(format!(
                "Element {} has a non-finite geometry value",
                element.id
            )));
        }
        if !(0.0..=1.0).contains(&element.opacity) {
            return Err(Error::Validation(format!(
                "Element {} opacity {} is outside 0..=1",
                element.id, element.opacity
            )));
        }

        element.scale_x = element.scale_x.abs();
        element.scale_y = element.scale_y.abs();
        if element.scale_x == 0.0 || element.scale_y == 0.0 {
            return Err(Error::Validation(format!(
                "Element {} cannot be scaled to zero",
                element.id
            )));
        }

        let (width, x) = fit_axis(
            &element.id,
            element.width,
            element.scale_x,
            element.x,
            self.stage.width,
        )?;
        let (height, y) = fit_axis(
            &element.id,
            element.height,
            element.scale_y,
            element.y,
            self.stage.height,
        )?;
        element.width = width;
        element.x = x;
        element.height = height;
        element.y = y;
        Ok(element)
    }

    /// Edit content of a text element.
    pub fn edit_text(&mut self, id: &str, patch: TextPatch) -> Result<()> {
        let index = self.index_of(id)?;
        let ElementContent::Text {
            text,
            font_size,
            font_family,
            fill,
        } = &self.elements[index].content
        else {
            return Err(Error::Validation(format!(
                "Element {} is not a text element",
                id
            )));
        };

        let font_size = patch.font_size.unwrap_or(*font_size);
        if !font_size.is_finite() || font_size <= 0.0 {
            return Err(Error::Validation(format!(
                "Element {} font size must be positive",
                id
            )));
        }

        let content = ElementContent::Text {
            text: patch.text.unwrap_or_else(|| text.clone()),
            font_size,
            font_family: patch.font_family.unwrap_or_else(|| font_family.clone()),
            fill: patch.fill.unwrap_or_else(|| fill.clone()),
        };
        self.elements[index].content = content;
        Ok(())
    }

    /// Swap the source of an image element.
    pub fn replace_image(&mut self, id: &str, src: impl Into<String>) -> Result<()> {
        let index = self.index_of(id)?;
        let src = src.into();
        if src.trim().is_empty() {
            return Err(Error::Validation(format!(
                "Element {} image source cannot be empty",
                id
            )));
        }
        match &mut self.elements[index].content {
            ElementContent::Image { src: current } => {
                *current = src;
                Ok(())
            }
            ElementContent::Text { .. } => Err(Error::Validation(format!(
                "Element {} is not an image element",
                id
            ))),
        }
    }

    pub fn bring_to_front(&mut self, id: &str) -> Result<()> {
        let index = self.index_of(id)?;
        let top = self.max_z().unwrap_or(0);
        if self.elements[index].z_index != top {
            self.elements[index].z_index = top + 1;
        }
        Ok(())
    }

    pub fn send_to_back(&mut self, id: &str) -> Result<()> {
        let index = self.index_of(id)?;
        let bottom = self.min_z().unwrap_or(0);
        if self.elements[index].z_index != bottom {
            self.elements[index].z_index = bottom - 1;
        }
        Ok(())
    }

    pub fn remove_element(&mut self, id: &str) -> Result<DesignElement> {
        let index = self.index_of(id)?;
        Ok(self.elements.remove(index))
    }

    /// Snapshot for the persistence store; selection is not carried over.
    pub fn to_draft(&self, product_id: impl Into<String>) -> DesignDraft {
        let mut draft = DesignDraft::new(product_id, self.stage);
        draft.elements = self
            .elements
            .iter()
            .cloned()
            .map(|mut e| {
                e.selected = false;
                e
            })
            .collect();
        draft
    }
}

/// Clamp one axis of an element box to `[0, stage]`.
///
/// Returns the (possibly shrunk) unscaled size and the clamped position.
fn fit_axis(
    id: &str,
    size: Option<f64>,
    scale: f64,
    position: f64,
    stage: f64,
) -> Result<(Option<f64>, f64)> {
    let Some(size) = size else {
        return Ok((None, position.clamp(0.0, stage.max(0.0))));
    };

    let mut rendered = size * scale;
    if rendered < MIN_DIMENSION {
        return Err(Error::Validation(format!(
            "Element {} would be {:.1} units, below the minimum of {}",
            id, rendered, MIN_DIMENSION
        )));
    }

    let mut size = size;
    if rendered > stage {
        rendered = stage;
        size = stage / scale;
    }
    let position = position.clamp(0.0, (stage - rendered).max(0.0));
    Ok((Some(size), position))
}
