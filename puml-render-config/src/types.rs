//! Configuration types and enums.

use serde::{Deserialize, Serialize};

/// Artifact kind produced by a render.
///
/// Each variant maps to one path segment on the remote service and one
/// `-t` flag on the local engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG image, optionally paired with a clickable image map.
    #[default]
    Png,
    /// Inline SVG markup.
    Svg,
    /// Preformatted ASCII art.
    #[serde(alias = "ascii")]
    Txt,
}

impl OutputFormat {
    /// Path segment used by the remote service (`{base}/{segment}/{key}`).
    pub fn url_segment(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Svg => "svg",
            OutputFormat::Txt => "txt",
        }
    }

    /// Value appended to the local engine's `-t` flag.
    pub fn engine_flag(&self) -> String {
        format!("-t{}", self.url_segment())
    }

    /// Prefix used for cache keys of this format.
    pub fn cache_prefix(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Svg => "svg",
            OutputFormat::Txt => "ascii",
        }
    }

    /// File extension used when exporting.
    pub fn file_extension(&self) -> &'static str {
        self.url_segment()
    }

    /// Parse a user-facing name (`png`, `svg`, `txt`, `ascii`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "png" => Some(OutputFormat::Png),
            "svg" => Some(OutputFormat::Svg),
            "txt" | "ascii" => Some(OutputFormat::Txt),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.url_segment())
    }
}
