//! Command-line interface for puml-render.
//!
//! Renders a diagram file to an HTML fragment, sweeps the on-disk cache, or
//! prints a source's request key.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use puml_render_config::{OutputFormat, RenderConfig};

use crate::cache::{FileStore, RenderCache};
use crate::export;
use crate::http::UreqFetch;
use crate::service::DiagramRenderer;
use crate::source::{Dialect, DiagramSource};
use crate::surface::{HtmlSurface, insert};

/// puml-render - render PlantUML diagrams through a server or a local engine
#[derive(Parser)]
#[command(name = "puml-render")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Debug log level (0 = off, 4 = trace); overrides DEBUG_LEVEL
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<u8>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render a diagram file and print the HTML fragment
    Render {
        /// Diagram source file
        file: PathBuf,

        /// Output format (png, svg, txt); defaults to the configured default_format
        #[arg(short, long, value_parser = parse_format)]
        format: Option<OutputFormat>,

        /// Write the fragment here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Also export the artifact to the configured export folder
        #[arg(long)]
        export: bool,
    },
    /// Evict cache entries older than the retention window
    Sweep,
    /// Print the request key of a diagram file
    Key {
        /// Diagram source file
        file: PathBuf,
    },
}

fn parse_format(name: &str) -> Result<OutputFormat, String> {
    OutputFormat::from_name(name).ok_or_else(|| format!("unknown format '{name}' (png, svg, txt)"))
}

/// Run the parsed command.
pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Render {
            file,
            format,
            output,
            export,
        } => render(config, &file, format, output.as_deref(), export),
        Commands::Sweep => {
            let cache = RenderCache::new(Arc::new(FileStore::open_default()));
            let stats = cache.sweep(config.cache_retention_days);
            println!(
                "Scanned {} entries, evicted {}, {} failures",
                stats.scanned, stats.evicted, stats.failures
            );
            Ok(())
        }
        Commands::Key { file } => {
            let text = read_source(&file)?;
            let source = DiagramSource::prepare(&text, &config.header, Dialect::Standard);
            println!("{}", source.key());
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RenderConfig> {
    match path {
        Some(path) => RenderConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {path:?}")),
        None => RenderConfig::load(),
    }
}

fn read_source(file: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {file:?}"))
}

fn render(
    config: RenderConfig,
    file: &Path,
    format: Option<OutputFormat>,
    output: Option<&Path>,
    export: bool,
) -> anyhow::Result<()> {
    let text = read_source(file)?;
    let format = format.unwrap_or(config.default_format);
    let export_path = config.export_path.clone();
    let http = UreqFetch::new(config.request_timeout());
    let project_root = std::env::current_dir().context("Failed to resolve current directory")?;

    let service = DiagramRenderer::new(config).with_project_root(project_root);
    let source = service.prepare(&text, format, Dialect::Standard, Some(file));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;
    let result = runtime
        .block_on(async {
            service.start().await;
            service.render_source(&source, format, file.parent()).await
        })
        .with_context(|| format!("Failed to render {file:?}"))?;

    let surface = HtmlSurface::new();
    insert(&surface, &source.key(), &result);
    let html = surface.to_html();

    match output {
        Some(path) => std::fs::write(path, &html).with_context(|| format!("Failed to write {path:?}"))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{html}")?;
        }
    }

    if export {
        let folder = export::export_folder(&export_path, file);
        let name = export::export_filename(&text, file, chrono::Utc::now());
        let path = export::export_result(&result, &folder, &name, &http)?;
        eprintln!("Diagram exported to {path:?}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::ffi::OsString;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_render_args() {
        let cli = Cli::try_parse_from([
            "puml-render",
            "render",
            "seq.puml",
            "--format",
            "ascii",
            "--output",
            "out.html",
        ])
        .unwrap();
        match cli.command {
            Commands::Render {
                file,
                format,
                output,
                export,
            } => {
                assert_eq!(file, PathBuf::from("seq.puml"));
                assert_eq!(format, Some(OutputFormat::Txt));
                assert_eq!(output, Some(PathBuf::from("out.html")));
                assert!(!export);
            }
            _ => panic!("expected render command"),
        }
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["puml-render", "render", "a.puml", "-f", "gif"]).is_err());
    }

    #[test]
    fn test_key_command_with_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        RenderConfig::default().save_to(&config_path).unwrap();
        let file = dir.path().join("seq.puml");
        std::fs::write(&file, "Alice -> Bob: hello").unwrap();

        let cli = Cli::try_parse_from([
            OsString::from("puml-render"),
            OsString::from("key"),
            file.into_os_string(),
            OsString::from("--config"),
            config_path.into_os_string(),
        ])
        .unwrap();
        run(cli).unwrap();
    }
}
