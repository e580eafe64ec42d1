//! Configuration system for the puml-render diagram pipeline.
//!
//! This crate provides configuration loading, saving, and default values:
//!
//! - [`RenderConfig`] — every setting the pipeline reads
//! - [`OutputFormat`] — the artifact kinds a render can produce
//! - [`ConfigError`] — typed load/save/validation failures

pub mod config;
pub mod defaults;
pub mod error;
mod types;

pub use config::RenderConfig;
pub use error::ConfigError;
pub use types::OutputFormat;
