//! Result insertion: turns a [`RenderResult`] into surface content.

use lol_html::{RewriteStrSettings, element, rewrite_str};

use super::{Element, Surface};
use crate::backend::{MAP_MARKER, RenderResult};
use crate::encoding::RequestKey;

/// Placeholder text shown while a render is in flight.
pub const LOADING_TEXT: &str = "Generating PlantUML diagram";
/// Class of the placeholder element.
pub const LOADING_CLASS: &str = "puml-loading";

const INTERNAL_LINK_CLASS: &str = "internal-link";

/// Replace the surface content with the loading placeholder.
pub fn show_loading(surface: &dyn Surface) {
    if !surface.is_attached() {
        return;
    }
    surface.clear();
    surface.append_element(&Element::new("h6", LOADING_TEXT).with_class(LOADING_CLASS));
}

/// Replace the surface content with an inline error message.
pub fn show_message(surface: &dyn Surface, message: &str) {
    if !surface.is_attached() {
        return;
    }
    surface.clear();
    surface.append_element(&Element::new("p", message).with_style("color: red"));
}

/// Insert `result` into `surface`, replacing whatever it showed before.
///
/// Raster images reference their image map by `key`, so the map (when
/// present) is inserted first with its `name` already set.
pub fn insert(surface: &dyn Surface, key: &RequestKey, result: &RenderResult) {
    if !surface.is_attached() {
        crate::debug_trace!("INSERT", "Surface detached, dropping result for {}", key);
        return;
    }
    surface.clear();

    match result {
        RenderResult::Raster { image, map } => {
            if let Some(map) = map.as_deref().filter(|m| m.contains(MAP_MARKER)) {
                surface.insert_markup(&tag_image_map(map, key.as_str()));
            }
            surface.insert_markup(&format!(
                "<img src=\"{}\" usemap=\"#{}\">",
                htmlize::escape_attribute(image.to_src()),
                htmlize::escape_attribute(key.as_str())
            ));
        }
        RenderResult::Vector(svg) => surface.insert_markup(&prepare_svg(svg)),
        RenderResult::Text(text) => surface.insert_markup(&format!(
            "<pre><code>{}</code></pre>",
            htmlize::escape_text(text.as_str())
        )),
    }
}

/// Set `name` on the first `<map>` element of an image-map document.
pub fn tag_image_map(map: &str, name: &str) -> String {
    let mut tagged = false;
    rewrite_str(
        map,
        RewriteStrSettings {
            element_content_handlers: vec![element!("map", move |el| {
                if !tagged {
                    el.set_attribute("name", name)?;
                    tagged = true;
                }
                Ok(())
            })],
            ..RewriteStrSettings::new()
        },
    )
    .unwrap_or_else(|e| {
        crate::debug_error!("INSERT", "Could not rewrite image map: {}", e);
        map.to_string()
    })
}

/// Strip anything before the `<svg` root and mark every hyperlink as an
/// internal link.
pub fn prepare_svg(markup: &str) -> String {
    let start = markup.to_ascii_lowercase().find("<svg").unwrap_or(0);
    let svg = &markup[start..];
    rewrite_str(
        svg,
        RewriteStrSettings {
            element_content_handlers: vec![element!("a", |el| {
                let class = match el.get_attribute("class") {
                    Some(existing)
                        if existing
                            .split_whitespace()
                            .any(|c| c == INTERNAL_LINK_CLASS) =>
                    {
                        return Ok(());
                    }
                    Some(existing) if !existing.trim().is_empty() => {
                        format!("{} {INTERNAL_LINK_CLASS}", existing.trim())
                    }
                    _ => INTERNAL_LINK_CLASS.to_string(),
                };
                el.set_attribute("class", &class)?;
                Ok(())
            })],
            ..RewriteStrSettings::new()
        },
    )
    .unwrap_or_else(|e| {
        crate::debug_error!("INSERT", "Could not rewrite SVG links: {}", e);
        svg.to_string()
    })
}
