//! Remote backend: renders through a PlantUML server over HTTP.
//!
//! Every request addresses `{base}/{format}/{key}`. ureq is blocking, so each
//! request runs on the blocking pool.

use std::sync::Arc;

use puml_render_config::OutputFormat;

use super::{ImageSource, RenderResult, usable_map};
use crate::encoding::RequestKey;
use crate::error::RenderError;
use crate::http::{HttpBody, HttpFetch};
use crate::source::DiagramSource;

/// Shown when a server answers a text-art request with an image.
pub const ASCII_UNSUPPORTED: &str = "Your configured PlantUML Server does not support ASCII Art";

/// Raw PNG signature.
const PNG_SIGNATURE: &[u8] = b"\x89PNG";
/// PNG signature after a lossy UTF-8 decode (0x89 becomes U+FFFD).
const PNG_SIGNATURE_LOSSY: &str = "\u{FFFD}PNG";

pub struct RemoteBackend {
    base_url: String,
    http: Arc<dyn HttpFetch>,
}

impl RemoteBackend {
    /// `base_url` must already have the empty-string fallback applied.
    pub fn new(base_url: impl Into<String>, http: Arc<dyn HttpFetch>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/{segment}/{key}`
    pub fn url(&self, segment: &str, key: &RequestKey) -> String {
        format!("{}/{}/{}", self.base_url, segment, key)
    }

    pub async fn render(
        &self,
        source: &DiagramSource,
        format: OutputFormat,
    ) -> Result<RenderResult, RenderError> {
        let key = source.key();
        match format {
            OutputFormat::Png => self.render_png(&key).await,
            OutputFormat::Svg => {
                let body = self.fetch(self.url(format.url_segment(), &key)).await?;
                Ok(RenderResult::Vector(body.text()))
            }
            OutputFormat::Txt => {
                let body = self.fetch(self.url(format.url_segment(), &key)).await?;
                if is_raster_fallback(body.bytes()) {
                    crate::debug_info!("REMOTE", "Server returned an image for txt/{}", key);
                    return Err(RenderError::UnsupportedFeature(ASCII_UNSUPPORTED.to_string()));
                }
                Ok(RenderResult::Text(body.text()))
            }
        }
    }

    async fn render_png(&self, key: &RequestKey) -> Result<RenderResult, RenderError> {
        let image_url = self.url(OutputFormat::Png.url_segment(), key);
        // The surface loads the image from the URL itself; only the status
        // is checked here.
        self.check(image_url.clone()).await?;

        let map = match self.fetch(self.url("map", key)).await {
            Ok(body) => usable_map(body.text()),
            Err(e) => {
                crate::debug_info!("REMOTE", "Map fetch failed, showing image only: {}", e);
                None
            }
        };

        Ok(RenderResult::Raster {
            image: ImageSource::Url(image_url),
            map,
        })
    }

    async fn check(&self, url: String) -> Result<(), RenderError> {
        crate::debug_trace!("REMOTE", "HEAD {}", url);
        let http = Arc::clone(&self.http);
        tokio::task::spawn_blocking(move || http.head(&url))
            .await
            .map_err(|e| RenderError::Network(format!("request task failed: {e}")))?
            .map_err(RenderError::Network)
    }

    async fn fetch(&self, url: String) -> Result<HttpBody, RenderError> {
        crate::debug_trace!("REMOTE", "GET {}", url);
        let http = Arc::clone(&self.http);
        tokio::task::spawn_blocking(move || http.get(&url))
            .await
            .map_err(|e| RenderError::Network(format!("request task failed: {e}")))?
            .map_err(RenderError::Network)
    }
}

/// Whether a text-art response is actually a PNG.
pub fn is_raster_fallback(body: &[u8]) -> bool {
    body.starts_with(PNG_SIGNATURE) || body.starts_with(PNG_SIGNATURE_LOSSY.as_bytes())
}
