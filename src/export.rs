//! Exporting rendered diagrams to files next to the document.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::{DateTime, Utc};
use regex::Regex;

use crate::backend::{ImageSource, RenderResult};
use crate::http::HttpFetch;

static STARTUML_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)@startuml[ \t]+([^\r\n]+)").expect("STARTUML_TITLE regex pattern is valid")
});

/// File name (without extension) for an exported diagram.
///
/// Uses the `@startuml <title>` title when present, otherwise
/// `<document stem>-<timestamp>`.
pub fn export_filename(source: &str, document_path: &Path, now: DateTime<Utc>) -> String {
    if let Some(title) = STARTUML_TITLE
        .captures(source)
        .map(|caps| caps[1].trim().to_string())
        .filter(|t| !t.is_empty())
    {
        return title.replace(['/', '\\'], "_");
    }

    let stem = document_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "diagram".to_string());
    format!("{stem}-{}", now.format("%Y-%m-%d-%H-%M-%S"))
}

/// Folder exports for `document_path` go to.
///
/// An absolute `export_path` is used as is; anything else is relative to the
/// document's folder.
pub fn export_folder(export_path: &str, document_path: &Path) -> PathBuf {
    let export_path = export_path.trim();
    let configured = Path::new(export_path);
    if configured.is_absolute() {
        return configured.to_path_buf();
    }
    let base = document_path.parent().unwrap_or_else(|| Path::new("."));
    if export_path.is_empty() {
        base.to_path_buf()
    } else {
        base.join(configured)
    }
}

/// Write `result` to `folder/filename.<ext>`, creating the folder.
///
/// A raster result served by URL is downloaded through `http`.
pub fn export_result(
    result: &RenderResult,
    folder: &Path,
    filename: &str,
    http: &dyn HttpFetch,
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(folder)
        .with_context(|| format!("Failed to create export folder {folder:?}"))?;

    let path = folder.join(format!("{filename}.{}", result.format().file_extension()));
    let bytes = match result {
        RenderResult::Raster {
            image: ImageSource::Base64(data),
            ..
        } => BASE64_STANDARD
            .decode(data)
            .context("Cached PNG is not valid base64")?,
        RenderResult::Raster {
            image: ImageSource::Url(url),
            ..
        } => http
            .get(url)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Failed to download {url}"))?
            .0,
        RenderResult::Vector(text) | RenderResult::Text(text) => text.clone().into_bytes(),
    };

    std::fs::write(&path, bytes).with_context(|| format!("Failed to write {path:?}"))?;
    crate::debug_info!("EXPORT", "Diagram exported to {:?}", path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpBody;
    use chrono::TimeZone;

    struct StaticHttp;

    impl HttpFetch for StaticHttp {
        fn get(&self, url: &str) -> Result<HttpBody, String> {
            if url.ends_with("/png/K") {
                Ok(HttpBody(b"\x89PNG-bytes".to_vec()))
            } else {
                Err(format!("{url}: status 404"))
            }
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 5).unwrap()
    }

    #[test]
    fn test_filename_from_title() {
        let name = export_filename(
            "@startuml Login Flow \nA -> B\n@enduml",
            Path::new("/notes/auth.md"),
            noon(),
        );
        assert_eq!(name, "Login Flow");
    }

    #[test]
    fn test_filename_from_document_and_time() {
        let name = export_filename("@startuml\nA -> B\n@enduml", Path::new("/notes/auth.md"), noon());
        assert_eq!(name, "auth-2024-03-09-12-30-05");
    }

    #[test]
    fn test_title_with_separator_is_flattened() {
        let name = export_filename("@startuml a/b", Path::new("doc.md"), noon());
        assert_eq!(name, "a_b");
    }

    #[test]
    fn test_export_folder() {
        let doc = Path::new("/notes/sub/doc.md");
        assert_eq!(export_folder("", doc), PathBuf::from("/notes/sub"));
        assert_eq!(export_folder("img", doc), PathBuf::from("/notes/sub/img"));
        assert_eq!(export_folder("/exports", doc), PathBuf::from("/exports"));
    }

    #[test]
    fn test_export_svg_and_text() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("out");

        let svg = export_result(&RenderResult::Vector("<svg/>".into()), &folder, "d", &StaticHttp)
            .unwrap();
        assert_eq!(svg, folder.join("d.svg"));
        assert_eq!(std::fs::read_to_string(&svg).unwrap(), "<svg/>");

        let txt = export_result(&RenderResult::Text("+--+".into()), &folder, "d", &StaticHttp)
            .unwrap();
        assert_eq!(txt, folder.join("d.txt"));
    }

    #[test]
    fn test_export_png_variants() {
        let dir = tempfile::tempdir().unwrap();
        let local = RenderResult::Raster {
            image: ImageSource::Base64(BASE64_STANDARD.encode(b"\x89PNG-local")),
            map: None,
        };
        let path = export_result(&local, dir.path(), "local", &StaticHttp).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"\x89PNG-local");

        let remote = RenderResult::Raster {
            image: ImageSource::Url("https://example.test/png/K".into()),
            map: None,
        };
        let path = export_result(&remote, dir.path(), "remote", &StaticHttp).unwrap();
        assert_eq!(path, dir.path().join("remote.png"));
        assert_eq!(std::fs::read(&path).unwrap(), b"\x89PNG-bytes");

        let missing = RenderResult::Raster {
            image: ImageSource::Url("https://example.test/png/nope".into()),
            map: None,
        };
        assert!(export_result(&missing, dir.path(), "missing", &StaticHttp).is_err());
    }
}
