//! Diagram source preparation.
//!
//! A [`DiagramSource`] is the exact text handed to a backend: the raw block
//! body with whitespace normalized, wiki-style links rewritten, and the
//! configured header prepended. Its [`RequestKey`] is derived from that
//! final text, so two blocks only share a cache entry if the engine would
//! see identical input.

use std::path::Path;
use std::sync::LazyLock;

use puml_render_config::OutputFormat;
use regex::{Captures, Regex};

use crate::encoding::{self, RequestKey};

static NBSP_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&nbsp;").expect("NBSP_ENTITY regex pattern is valid"));

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("WHITESPACE_RUN regex pattern is valid"));

static WIKI_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[\[([\s\S]*?)\]\]\]").expect("WIKI_LINK regex pattern is valid")
});

/// Whitespace handling applied to a block body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// Only non-breaking spaces are normalized.
    #[default]
    Standard,
    /// Additionally collapses every whitespace run inside a line to one space,
    /// and rejoins lines with CRLF.
    Compact,
}

/// A link target resolved by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    /// File name without extension, used as the default link text.
    pub basename: String,
    /// URL that opens the file in the host application.
    pub url: String,
}

/// Host capability for resolving `[[[target|alias]]]` links.
pub trait LinkResolver: Send + Sync {
    /// Resolve `target` relative to the document at `document_path`.
    fn resolve(&self, target: &str, document_path: &Path) -> Option<ResolvedLink>;
}

/// Final, immutable text handed to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramSource {
    text: String,
}

impl DiagramSource {
    /// Prepare a block body without link rewriting.
    pub fn prepare(raw: &str, header: &str, dialect: Dialect) -> Self {
        Self::with_header(header, normalize_whitespace(raw, dialect))
    }

    /// Prepare a block body, rewriting `[[[...]]]` links through `resolver`.
    pub fn prepare_with_links(
        raw: &str,
        header: &str,
        dialect: Dialect,
        format: OutputFormat,
        resolver: &dyn LinkResolver,
        document_path: &Path,
    ) -> Self {
        let normalized = normalize_whitespace(raw, dialect);
        let linked = replace_links(&normalized, format, resolver, document_path);
        Self::with_header(header, linked)
    }

    /// Wrap text that is already final (e.g. a whole `.puml` file).
    pub fn from_final(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    fn with_header(header: &str, body: String) -> Self {
        if header.is_empty() {
            Self { text: body }
        } else {
            Self {
                text: format!("{header}\r\n{body}"),
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Request key of the final text.
    pub fn key(&self) -> RequestKey {
        encoding::encode(&self.text)
    }
}

/// Replace non-breaking spaces (literal and `&nbsp;`) with plain spaces and
/// apply the dialect's line rules.
pub fn normalize_whitespace(raw: &str, dialect: Dialect) -> String {
    let text = raw.replace('\u{00A0}', " ");
    let text = NBSP_ENTITY.replace_all(&text, " ").into_owned();
    match dialect {
        Dialect::Standard => text,
        Dialect::Compact => text
            .split('\n')
            .map(|line| {
                let line = line.strip_suffix('\r').unwrap_or(line);
                WHITESPACE_RUN.replace_all(line, " ").into_owned()
            })
            .collect::<Vec<_>>()
            .join("\r\n"),
    }
}

/// Rewrite `[[[target|alias]]]` links into PlantUML hyperlinks.
///
/// PNG output gets a URL link (clickable through the image map); SVG and
/// text output get the bare file name.
pub fn replace_links(
    text: &str,
    format: OutputFormat,
    resolver: &dyn LinkResolver,
    document_path: &Path,
) -> String {
    WIKI_LINK
        .replace_all(text, |caps: &Captures| {
            let inner = &caps[1];
            let mut parts = inner.splitn(2, '|');
            let target = parts.next().unwrap_or_default();
            let alias = parts.next().filter(|a| !a.is_empty());

            let Some(link) = resolver.resolve(target, document_path) else {
                return format!("File with name: {target} not found");
            };

            if format == OutputFormat::Png {
                let text = alias.unwrap_or(&link.basename);
                format!("[[{} {}]]", link.url, text)
            } else {
                format!("[[{}]]", link.basename)
            }
        })
        .into_owned()
}
