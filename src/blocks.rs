//! Diagram block registry: fenced code-block tags and embeddable file types.

use std::collections::HashMap;
use std::path::Path;

use puml_render_config::OutputFormat;

use crate::source::Dialect;

/// A fenced code-block tag the host registers with the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramBlock {
    /// The fenced code block tag (e.g. "plantuml", "plantuml-svg").
    pub tag: String,
    /// Display name for UI.
    pub display_name: String,
    /// Artifact produced for this block.
    pub format: OutputFormat,
    /// Whitespace handling applied to the block body.
    pub dialect: Dialect,
}

/// Return the default set of diagram blocks.
pub fn default_diagram_blocks() -> Vec<DiagramBlock> {
    vec![
        DiagramBlock {
            tag: "plantuml".into(),
            display_name: "PlantUML".into(),
            format: OutputFormat::Png,
            dialect: Dialect::Standard,
        },
        DiagramBlock {
            tag: "plantuml-svg".into(),
            display_name: "PlantUML (SVG)".into(),
            format: OutputFormat::Svg,
            dialect: Dialect::Standard,
        },
        DiagramBlock {
            tag: "plantuml-ascii".into(),
            display_name: "PlantUML (ASCII)".into(),
            format: OutputFormat::Txt,
            dialect: Dialect::Standard,
        },
        // Kept for documents written against the first image-map release.
        DiagramBlock {
            tag: "plantuml-map".into(),
            display_name: "PlantUML (map)".into(),
            format: OutputFormat::Png,
            dialect: Dialect::Compact,
        },
    ]
}

/// File extensions rendered as whole-file diagrams.
pub const EMBED_EXTENSIONS: &[&str] = &["puml", "pu"];

/// Lookup table from block tag to block definition.
#[derive(Debug, Clone)]
pub struct BlockRegistry {
    blocks: HashMap<String, DiagramBlock>,
}

impl Default for BlockRegistry {
    fn default() -> Self {
        let mut registry = Self {
            blocks: HashMap::new(),
        };
        for block in default_diagram_blocks() {
            registry.add_block(block);
        }
        registry
    }
}

impl BlockRegistry {
    /// Get the block definition for a tag.
    pub fn get(&self, tag: &str) -> Option<&DiagramBlock> {
        self.blocks.get(tag.trim())
    }

    /// Check if a tag is a known diagram block.
    pub fn is_diagram_block(&self, tag: &str) -> bool {
        self.get(tag).is_some()
    }

    /// Add or replace a block definition.
    pub fn add_block(&mut self, block: DiagramBlock) {
        self.blocks.insert(block.tag.clone(), block);
    }

    /// All registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.blocks.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

/// Whether `path` is a diagram file that can be embedded directly.
pub fn is_embeddable_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            EMBED_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}
