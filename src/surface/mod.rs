//! Display surfaces the pipeline renders into.
//!
//! The host owns the real view; it exposes it to the pipeline through the
//! small [`Surface`] capability. [`HtmlSurface`] is an in-memory
//! implementation that accumulates an HTML fragment, used by the CLI and by
//! tests.

mod insert;

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

pub use insert::{
    LOADING_CLASS, LOADING_TEXT, insert, prepare_svg, show_loading, show_message, tag_image_map,
};

/// Capability a host view provides to receive rendered diagrams.
///
/// Methods take `&self`: a surface is shared between the caller and any
/// in-flight render.
pub trait Surface: Send + Sync {
    /// `false` once the host has torn the view down. Detached surfaces
    /// ignore every mutation.
    fn is_attached(&self) -> bool;

    /// Remove all content.
    fn clear(&self);

    /// Append trusted markup produced by the pipeline.
    fn insert_markup(&self, markup: &str);

    /// Append an element with plain-text content.
    fn append_element(&self, element: &Element);
}

/// A plain element with text content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub text: String,
    pub class: Option<String>,
    pub style: Option<String>,
}

impl Element {
    pub fn new(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    /// Serialize with escaped text and attributes.
    pub fn to_html(&self) -> String {
        let mut html = format!("<{}", self.tag);
        if let Some(class) = &self.class {
            html.push_str(&format!(" class=\"{}\"", htmlize::escape_attribute(class)));
        }
        if let Some(style) = &self.style {
            html.push_str(&format!(" style=\"{}\"", htmlize::escape_attribute(style)));
        }
        html.push('>');
        html.push_str(&htmlize::escape_text(&self.text));
        html.push_str(&format!("</{}>", self.tag));
        html
    }
}

/// One top-level child of an [`HtmlSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceNode {
    Markup(String),
    Element(Element),
}

impl SurfaceNode {
    pub fn to_html(&self) -> String {
        match self {
            SurfaceNode::Markup(markup) => markup.clone(),
            SurfaceNode::Element(element) => element.to_html(),
        }
    }
}

/// In-memory surface that renders to an HTML fragment.
#[derive(Debug)]
pub struct HtmlSurface {
    nodes: Mutex<Vec<SurfaceNode>>,
    attached: AtomicBool,
}

impl Default for HtmlSurface {
    fn default() -> Self {
        Self {
            nodes: Mutex::new(Vec::new()),
            attached: AtomicBool::new(true),
        }
    }
}

impl HtmlSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the host tearing the view down.
    pub fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }

    /// Snapshot of the current children.
    pub fn nodes(&self) -> Vec<SurfaceNode> {
        self.nodes.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }

    /// The whole fragment.
    pub fn to_html(&self) -> String {
        self.nodes.lock().iter().map(SurfaceNode::to_html).collect()
    }
}

impl Surface for HtmlSurface {
    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    fn clear(&self) {
        if self.is_attached() {
            self.nodes.lock().clear();
        }
    }

    fn insert_markup(&self, markup: &str) {
        if self.is_attached() {
            self.nodes.lock().push(SurfaceNode::Markup(markup.to_string()));
        }
    }

    fn append_element(&self, element: &Element) {
        if self.is_attached() {
            self.nodes.lock().push(SurfaceNode::Element(element.clone()));
        }
    }
}
