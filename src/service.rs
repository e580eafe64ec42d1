//! The rendering service hosts talk to.
//!
//! [`DiagramRenderer`] ties the pipeline together: it prepares the source,
//! runs it through the [`RequestCoordinator`], picks a backend from the
//! current configuration, and inserts the result into the target's surface.
//! Backend errors stop here: an unsupported feature becomes an inline
//! message, anything else leaves the surface empty and is returned to the
//! caller for logging.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use puml_render_config::{OutputFormat, RenderConfig};

use crate::backend::{
    Backend, LocalBackend, PlatformCapabilities, ProcessRunner, RemoteBackend, RenderResult,
    TokioProcessRunner, select,
};
use crate::blocks::{BlockRegistry, is_embeddable_file};
use crate::cache::{CacheStore, FileStore, RenderCache, SweepStats};
use crate::coordinator::{RenderTarget, RequestCoordinator, Scheduled};
use crate::error::RenderError;
use crate::http::{HttpFetch, UreqFetch};
use crate::source::{Dialect, DiagramSource, LinkResolver};
use crate::surface::{insert, show_loading, show_message};

/// Outcome of one scheduled render.
pub type RenderOutcome = Scheduled<Result<(), RenderError>>;

pub struct DiagramRenderer {
    config: ArcSwap<RenderConfig>,
    platform: PlatformCapabilities,
    project_root: PathBuf,
    http: Arc<dyn HttpFetch>,
    runner: Arc<dyn ProcessRunner>,
    cache: RenderCache,
    coordinator: RequestCoordinator,
    blocks: BlockRegistry,
    links: Option<Arc<dyn LinkResolver>>,
    started: AtomicBool,
}

impl DiagramRenderer {
    /// Service with the production HTTP client, process runner and on-disk
    /// cache.
    pub fn new(config: RenderConfig) -> Self {
        let http = Arc::new(UreqFetch::new(config.request_timeout()));
        Self {
            config: ArcSwap::from_pointee(config),
            platform: PlatformCapabilities::current(),
            project_root: PathBuf::from("."),
            http,
            runner: Arc::new(TokioProcessRunner),
            cache: RenderCache::new(Arc::new(FileStore::open_default())),
            coordinator: RequestCoordinator::new(),
            blocks: BlockRegistry::default(),
            links: None,
            started: AtomicBool::new(false),
        }
    }

    pub fn with_http(mut self, http: Arc<dyn HttpFetch>) -> Self {
        self.http = http;
        self
    }

    pub fn with_process_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = RenderCache::new(store);
        self
    }

    pub fn with_platform(mut self, platform: PlatformCapabilities) -> Self {
        self.platform = platform;
        self
    }

    /// Root that relative engine paths resolve against.
    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    pub fn with_link_resolver(mut self, resolver: Arc<dyn LinkResolver>) -> Self {
        self.links = Some(resolver);
        self
    }

    pub fn with_blocks(mut self, blocks: BlockRegistry) -> Self {
        self.blocks = blocks;
        self
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<RenderConfig> {
        self.config.load_full()
    }

    /// Replace the configuration. In-flight renders keep their snapshot.
    ///
    /// The remote request timeout is fixed when the HTTP client is built.
    pub fn update_config(&self, config: RenderConfig) {
        self.config.store(Arc::new(config));
    }

    pub fn blocks(&self) -> &BlockRegistry {
        &self.blocks
    }

    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }

    /// Pick a backend for the current configuration.
    pub fn backend(&self) -> Backend {
        let config = self.config.load();
        match select(&config, self.platform) {
            crate::backend::BackendKind::Remote => Backend::Remote(RemoteBackend::new(
                config.effective_server_url(),
                Arc::clone(&self.http),
            )),
            crate::backend::BackendKind::Local => Backend::Local(
                LocalBackend::new(&config, self.project_root.clone(), Arc::clone(&self.runner))
                    .with_cache(self.cache.clone()),
            ),
        }
    }

    /// Build the final source for a block body.
    pub fn prepare(
        &self,
        raw: &str,
        format: OutputFormat,
        dialect: Dialect,
        document_path: Option<&Path>,
    ) -> DiagramSource {
        let config = self.config.load();
        match (&self.links, document_path) {
            (Some(resolver), Some(path)) => DiagramSource::prepare_with_links(
                raw,
                &config.header,
                dialect,
                format,
                resolver.as_ref(),
                path,
            ),
            _ => DiagramSource::prepare(raw, &config.header, dialect),
        }
    }

    /// Render a fenced block with tag `tag` into `target`, debounced.
    pub async fn schedule(&self, target: &RenderTarget, tag: &str, raw: &str) -> RenderOutcome {
        let Some(block) = self.blocks.get(tag) else {
            return Scheduled::Executed(Err(RenderError::Configuration(format!(
                "'{tag}' is not a diagram block"
            ))));
        };
        let format = block.format;
        let source = self.prepare(raw, format, block.dialect, target.document_path());
        self.schedule_source(target, source, format, target.document_dir())
            .await
    }

    /// Render a whole `.puml` / `.pu` file into `target` with the configured
    /// default format.
    pub async fn render_file(&self, target: &RenderTarget, path: &Path) -> RenderOutcome {
        if !is_embeddable_file(path) {
            return Scheduled::Executed(Err(RenderError::Configuration(format!(
                "{} is not a PlantUML file",
                path.display()
            ))));
        }
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) => {
                return Scheduled::Executed(Err(RenderError::Configuration(format!(
                    "cannot read {}: {e}",
                    path.display()
                ))));
            }
        };
        let format = self.config.load().default_format;
        let source = self.prepare(&text, format, Dialect::Standard, Some(path));
        self.schedule_source(target, source, format, path.parent())
            .await
    }

    async fn schedule_source(
        &self,
        target: &RenderTarget,
        source: DiagramSource,
        format: OutputFormat,
        document_dir: Option<&Path>,
    ) -> RenderOutcome {
        let interval = self.config.load().debounce_interval();
        self.coordinator
            .schedule(target, interval, || async {
                show_loading(target.surface());
                self.render_into(target, &source, format, document_dir).await
            })
            .await
    }

    /// Render without debouncing and insert the result into `target`.
    pub async fn render_into(
        &self,
        target: &RenderTarget,
        source: &DiagramSource,
        format: OutputFormat,
        document_dir: Option<&Path>,
    ) -> Result<(), RenderError> {
        let surface = target.surface();
        match self.render_source(source, format, document_dir).await {
            Ok(result) => {
                insert(surface, &source.key(), &result);
                Ok(())
            }
            Err(e) => {
                if let Some(message) = e.user_message() {
                    show_message(surface, message);
                } else {
                    log::warn!("PlantUML render failed: {e}");
                    if surface.is_attached() {
                        surface.clear();
                    }
                }
                Err(e)
            }
        }
    }

    /// Render to a result without touching any surface.
    pub async fn render_source(
        &self,
        source: &DiagramSource,
        format: OutputFormat,
        document_dir: Option<&Path>,
    ) -> Result<RenderResult, RenderError> {
        let backend = self.backend();
        crate::debug_log!(
            "SERVICE",
            "Rendering {} via {} backend",
            format,
            backend.kind().as_str()
        );
        backend.render(source, format, document_dir).await
    }

    /// One-time startup work: evicts stale cache entries.
    ///
    /// Returns `None` when the service has already been started.
    pub async fn start(&self) -> Option<SweepStats> {
        if self.started.swap(true, Ordering::AcqRel) {
            return None;
        }
        let stats = self.sweep_cache().await;
        crate::debug_info!(
            "SERVICE",
            "Started: cache sweep evicted {} of {} entries",
            stats.evicted,
            stats.scanned
        );
        Some(stats)
    }

    /// Evict cache entries older than the configured retention window.
    ///
    /// Runs on the blocking pool.
    pub async fn sweep_cache(&self) -> SweepStats {
        let cache = self.cache.clone();
        let days = self.config.load().cache_retention_days;
        match tokio::task::spawn_blocking(move || cache.sweep(days)).await {
            Ok(stats) => stats,
            Err(e) => {
                log::error!("Cache sweep task failed: {e}");
                SweepStats::default()
            }
        }
    }
}
