//! Domain entities for the Designs domain
//!
//! Field names and shapes follow the persisted browser document, so every
//! entity serializes camelCase and timestamps are epoch milliseconds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Smallest width or height (in stage units) an element may be resized to
pub const MIN_DIMENSION: f64 = 10.0;

/// Writes whole numbers the way a browser's `JSON.stringify` does: `10`, not `10.0`
mod js_number {
    use serde::Serializer;

    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() && value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
            serializer.serialize_i64(*value as i64)
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub mod option {
        use serde::Serializer;

        pub fn serialize<S: Serializer>(
            value: &Option<f64>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => super::serialize(v, serializer),
                None => serializer.serialize_none(),
            }
        }
    }
}

/// Dimensions of the editing stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageSize {
    #[serde(serialize_with = "js_number::serialize")]
    pub width: f64,
    #[serde(serialize_with = "js_number::serialize")]
    pub height: f64,
}

impl StageSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Type-specific content of an element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ElementContent {
    Image {
        src: String,
    },
    #[serde(rename_all = "camelCase")]
    Text {
        text: String,
        #[serde(serialize_with = "js_number::serialize")]
        font_size: f64,
        font_family: String,
        fill: String,
    },
}

impl ElementContent {
    pub fn image(src: impl Into<String>) -> Self {
        ElementContent::Image { src: src.into() }
    }

    pub fn text(text: impl Into<String>) -> Self {
        ElementContent::Text {
            text: text.into(),
            font_size: 24.0,
            font_family: "Arial".to_string(),
            fill: "#000000".to_string(),
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            ElementContent::Image { .. } => ElementKind::Image,
            ElementContent::Text { .. } => ElementKind::Text,
        }
    }
}

/// Element type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Image,
    Text,
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementKind::Image => write!(f, "image"),
            ElementKind::Text => write!(f, "text"),
        }
    }
}

fn one() -> f64 {
    1.0
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A positioned image or text element on the stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignElement {
    pub id: String,
    #[serde(flatten)]
    pub content: ElementContent,
    #[serde(serialize_with = "js_number::serialize")]
    pub x: f64,
    #[serde(serialize_with = "js_number::serialize")]
    pub y: f64,
    #[serde(default, serialize_with = "js_number::serialize")]
    pub rotation: f64,
    #[serde(default = "one", serialize_with = "js_number::serialize")]
    pub scale_x: f64,
    #[serde(default = "one", serialize_with = "js_number::serialize")]
    pub scale_y: f64,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "js_number::option::serialize"
    )]
    pub width: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "js_number::option::serialize"
    )]
    pub height: Option<f64>,
    #[serde(default = "one", serialize_with = "js_number::serialize")]
    pub opacity: f64,
    pub z_index: i64,
    /// Editor-only selection flag
    #[serde(default, skip_serializing_if = "is_false")]
    pub selected: bool,
}

impl DesignElement {
    pub fn kind(&self) -> ElementKind {
        self.content.kind()
    }

    /// Image source, for image elements
    pub fn src(&self) -> Option<&str> {
        match &self.content {
            ElementContent::Image { src } => Some(src),
            ElementContent::Text { .. } => None,
        }
    }

    /// Rendered width on the stage, if the element has an explicit box
    pub fn rendered_width(&self) -> Option<f64> {
        self.width.map(|w| w * self.scale_x)
    }

    /// Rendered height on the stage, if the element has an explicit box
    pub fn rendered_height(&self) -> Option<f64> {
        self.height.map(|h| h * self.scale_y)
    }
}

/// Placement supplied when an element is added
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub x: f64,
    pub y: f64,
    pub rotation: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub opacity: f64,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            width: None,
            height: None,
            opacity: 1.0,
        }
    }
}

impl Geometry {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }

    pub fn sized(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }
}

/// Partial geometry change from a drag or transform handle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransformPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub rotation: Option<f64>,
    pub scale_x: Option<f64>,
    pub scale_y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub opacity: Option<f64>,
}

impl TransformPatch {
    pub fn move_to(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    pub fn scale(scale_x: f64, scale_y: f64) -> Self {
        Self {
            scale_x: Some(scale_x),
            scale_y: Some(scale_y),
            ..Self::default()
        }
    }

    pub fn resize(width: f64, height: f64) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }
}

/// Partial change to a text element's content
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextPatch {
    pub text: Option<String>,
    pub font_size: Option<f64>,
    pub font_family: Option<String>,
    pub fill: Option<String>,
}

/// An image the shopper uploaded during the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedImage {
    pub id: String,
    pub src: String,
    pub name: String,
}

/// Product variant id, kept in whichever JSON form it was written
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariantId {
    Number(serde_json::Number),
    Text(String),
}

impl std::fmt::Display for VariantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VariantId::Number(n) => write!(f, "{}", n),
            VariantId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for VariantId {
    fn from(value: &str) -> Self {
        VariantId::Text(value.to_string())
    }
}

impl From<String> for VariantId {
    fn from(value: String) -> Self {
        VariantId::Text(value)
    }
}

impl From<u64> for VariantId {
    fn from(value: u64) -> Self {
        VariantId::Number(value.into())
    }
}

/// Verbatim JSON a design was read from.
///
/// Never part of equality; the repository compares the parsed source
/// against the live value before reusing these bytes.
#[derive(Clone, Default)]
pub struct SourceJson(pub(crate) Option<Box<serde_json::value::RawValue>>);

impl SourceJson {
    pub(crate) fn get(&self) -> Option<&str> {
        self.0.as_deref().map(serde_json::value::RawValue::get)
    }
}

impl std::fmt::Debug for SourceJson {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(raw) => write!(f, "SourceJson({} bytes)", raw.get().len()),
            None => f.write_str("SourceJson(None)"),
        }
    }
}

impl PartialEq for SourceJson {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

/// A persisted snapshot of one editing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDesign {
    pub id: String,
    pub product_id: String,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    #[serde(default)]
    pub product_title: String,
    #[serde(default)]
    pub elements: Vec<DesignElement>,
    #[serde(default)]
    pub uploaded_images: Vec<UploadedImage>,
    pub stage_size: StageSize,
    #[serde(default)]
    pub background_image: Option<String>,
    /// Correlation key for products with several customizable slots
    #[serde(default)]
    pub selected_custom_image: Option<String>,
    /// Cached raster of the composition, as a data URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_image_base64: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Fields this crate does not model, kept so rewrites do not drop them
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    #[serde(skip)]
    pub source: SourceJson,
}

impl StoredDesign {
    /// Elements in ascending paint order
    pub fn paint_order(&self) -> Vec<&DesignElement> {
        let mut ordered: Vec<&DesignElement> = self.elements.iter().collect();
        ordered.sort_by_key(|e| e.z_index);
        ordered
    }

    /// Whether this design belongs to a product and customizable slot
    pub fn matches(&self, product_id: &str, slot: Option<&str>) -> bool {
        self.product_id == product_id && self.selected_custom_image.as_deref() == slot
    }

    pub fn summary(&self) -> DesignSummary {
        DesignSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            product_id: self.product_id.clone(),
            product_title: self.product_title.clone(),
            element_count: self.elements.len(),
            has_preview: self.design_image_base64.is_some(),
            last_modified: self.last_modified,
        }
    }
}

/// Everything a save needs; the store assigns `id` and `lastModified`
#[derive(Debug, Clone, PartialEq)]
pub struct DesignDraft {
    pub product_id: String,
    pub variant_id: Option<VariantId>,
    pub product_title: String,
    pub elements: Vec<DesignElement>,
    pub uploaded_images: Vec<UploadedImage>,
    pub stage_size: StageSize,
    pub background_image: Option<String>,
    pub selected_custom_image: Option<String>,
    pub design_image_base64: Option<String>,
    pub name: Option<String>,
}

impl DesignDraft {
    pub fn new(product_id: impl Into<String>, stage_size: StageSize) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id: None,
            product_title: String::new(),
            elements: Vec::new(),
            uploaded_images: Vec::new(),
            stage_size,
            background_image: None,
            selected_custom_image: None,
            design_image_base64: None,
            name: None,
        }
    }

    pub fn into_stored(self, id: String, last_modified: DateTime<Utc>) -> StoredDesign {
        StoredDesign {
            id,
            product_id: self.product_id,
            variant_id: self.variant_id,
            product_title: self.product_title,
            elements: self.elements,
            uploaded_images: self.uploaded_images,
            stage_size: self.stage_size,
            background_image: self.background_image,
            selected_custom_image: self.selected_custom_image,
            design_image_base64: self.design_image_base64,
            last_modified,
            name: self.name,
            extra: serde_json::Map::new(),
            source: SourceJson::default(),
        }
    }
}

/// Partial update of a stored design; `None` leaves a field as is
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesignPatch {
    pub variant_id: Option<VariantId>,
    pub product_title: Option<String>,
    pub elements: Option<Vec<DesignElement>>,
    pub uploaded_images: Option<Vec<UploadedImage>>,
    pub stage_size: Option<StageSize>,
    pub background_image: Option<String>,
    pub selected_custom_image: Option<String>,
    pub design_image_base64: Option<String>,
    pub name: Option<String>,
}

impl DesignPatch {
    pub fn apply(self, design: &mut StoredDesign) {
        if let Some(v) = self.variant_id {
            design.variant_id = Some(v);
        }
        if let Some(v) = self.product_title {
            design.product_title = v;
        }
        if let Some(v) = self.elements {
            design.elements = v;
        }
        if let Some(v) = self.uploaded_images {
            design.uploaded_images = v;
        }
        if let Some(v) = self.stage_size {
            design.stage_size = v;
        }
        if let Some(v) = self.background_image {
            design.background_image = Some(v);
        }
        if let Some(v) = self.selected_custom_image {
            design.selected_custom_image = Some(v);
        }
        if let Some(v) = self.design_image_base64 {
            design.design_image_base64 = Some(v);
        }
        if let Some(v) = self.name {
            design.name = Some(v);
        }
    }
}

impl From<DesignDraft> for DesignPatch {
    /// Every field of a fresh snapshot replaces the stored one
    fn from(draft: DesignDraft) -> Self {
        Self {
            variant_id: draft.variant_id,
            product_title: Some(draft.product_title),
            elements: Some(draft.elements),
            uploaded_images: Some(draft.uploaded_images),
            stage_size: Some(draft.stage_size),
            background_image: draft.background_image,
            selected_custom_image: draft.selected_custom_image,
            design_image_base64: draft.design_image_base64,
            name: draft.name,
        }
    }
}

/// Lightweight listing entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignSummary {
    pub id: String,
    pub name: Option<String>,
    pub product_id: String,
    pub product_title: String,
    pub element_count: usize,
    pub has_preview: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_modified: DateTime<Utc>,
}
