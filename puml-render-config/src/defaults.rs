//! Default value functions for configuration.
//!
//! Used as `#[serde(default = "crate::defaults::...")]` attributes on
//! `RenderConfig` fields.

/// Public PlantUML server used when no server URL is configured.
pub const SERVER_URL: &str = "https://www.plantuml.com/plantuml";

pub fn server_url() -> String {
    SERVER_URL.to_string()
}

/// Largest debounce interval `validate()` accepts (one hour).
pub const MAX_DEBOUNCE_SECS: f64 = 3600.0;

/// Largest cache retention window `validate()` accepts (one hundred years).
pub const MAX_CACHE_RETENTION_DAYS: u32 = 36_500;

pub fn debounce_secs() -> f64 {
    3.0
}

pub fn java_path() -> String {
    "java".to_string()
}

pub fn cache_retention_days() -> u32 {
    60
}

pub fn request_timeout_secs() -> u64 {
    30
}

pub fn bool_false() -> bool {
    false
}
