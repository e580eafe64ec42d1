// Library exports for hosts, the CLI, and integration tests
//
// # Mutex Usage Policy
//
//   - `tokio::sync::Mutex`    — only for the per-target render gate in
//                               `coordinator`, which is held across `.await`.
//
//   - `parking_lot::Mutex`    — everything else: short, sync-only critical
//                               sections (debounce timestamps, the target map,
//                               the debug log file, in-memory stores). Never
//                               held across an `.await`.

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[macro_use]
pub mod debug;

pub mod backend;
pub mod blocks;
pub mod cache;
pub mod cli;
pub mod coordinator;
pub mod encoding;
pub mod error;
pub mod export;
pub mod http;
pub mod service;
pub mod source;
pub mod surface;
pub mod sync;

pub use backend::{ImageSource, RenderResult};
pub use coordinator::{RenderTarget, RequestCoordinator, Scheduled};
pub use encoding::{RequestKey, encode};
pub use error::RenderError;
pub use puml_render_config::{OutputFormat, RenderConfig};
pub use service::DiagramRenderer;
pub use surface::{HtmlSurface, Surface};
