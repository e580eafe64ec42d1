//! Rendering backends.
//!
//! Two backends turn a [`DiagramSource`] into a [`RenderResult`]:
//!
//! - [`RemoteBackend`] — GET requests against a PlantUML server
//! - [`LocalBackend`] — a PlantUML engine run as a subprocess
//!
//! [`select`] picks one per call from the live configuration and the
//! platform's capabilities.

pub mod local;
pub mod process;
pub mod remote;
mod selector;

use std::path::Path;

use puml_render_config::OutputFormat;

use crate::error::RenderError;
use crate::source::DiagramSource;

pub use local::LocalBackend;
pub use process::{Invocation, ProcessOutput, ProcessRunner, TokioProcessRunner};
pub use remote::RemoteBackend;
pub use selector::{BackendKind, PlatformCapabilities, select};

/// Marker a map document must contain to carry clickable regions.
pub const MAP_MARKER: &str = "<map";

/// Where a raster image's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Served by the remote backend at this URL.
    Url(String),
    /// PNG bytes produced locally, base64-encoded.
    Base64(String),
}

impl ImageSource {
    /// Value for an `<img src>` attribute.
    pub fn to_src(&self) -> String {
        match self {
            ImageSource::Url(url) => url.clone(),
            ImageSource::Base64(data) => format!("data:image/png;base64,{data}"),
        }
    }
}

/// A rendered artifact. The variant always matches the requested format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderResult {
    Raster {
        image: ImageSource,
        /// Image-map document, present only if it contains [`MAP_MARKER`].
        map: Option<String>,
    },
    Vector(String),
    Text(String),
}

impl RenderResult {
    pub fn format(&self) -> OutputFormat {
        match self {
            RenderResult::Raster { .. } => OutputFormat::Png,
            RenderResult::Vector(_) => OutputFormat::Svg,
            RenderResult::Text(_) => OutputFormat::Txt,
        }
    }
}

/// Keep a map document only if it actually describes clickable regions.
pub(crate) fn usable_map(document: String) -> Option<String> {
    document.contains(MAP_MARKER).then_some(document)
}

/// The backend chosen for one render call.
pub enum Backend {
    Remote(RemoteBackend),
    Local(LocalBackend),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Remote(_) => BackendKind::Remote,
            Backend::Local(_) => BackendKind::Local,
        }
    }

    /// Render `source` as `format`.
    ///
    /// `document_dir` is the folder of the document the source came from; the
    /// local engine runs there so relative `!include` directives resolve.
    pub async fn render(
        &self,
        source: &DiagramSource,
        format: OutputFormat,
        document_dir: Option<&Path>,
    ) -> Result<RenderResult, RenderError> {
        match self {
            Backend::Remote(remote) => remote.render(source, format).await,
            Backend::Local(local) => local.render(source, format, document_dir).await,
        }
    }
}
