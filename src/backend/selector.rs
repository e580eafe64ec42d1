//! Backend selection policy.

use puml_render_config::RenderConfig;

/// What the current platform allows the pipeline to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    pub can_spawn_processes: bool,
}

impl PlatformCapabilities {
    /// Capabilities of the platform this binary was built for.
    pub const fn current() -> Self {
        Self {
            can_spawn_processes: !cfg!(any(
                target_os = "ios",
                target_os = "android",
                target_family = "wasm"
            )),
        }
    }

    /// A platform that cannot spawn subprocesses.
    pub const fn restricted() -> Self {
        Self {
            can_spawn_processes: false,
        }
    }
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self::current()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Remote,
    Local,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Remote => "remote",
            BackendKind::Local => "local",
        }
    }
}

/// Choose a backend for one render call.
///
/// Must be called per render: the configuration can change at any time.
pub fn select(config: &RenderConfig, platform: PlatformCapabilities) -> BackendKind {
    if !platform.can_spawn_processes {
        BackendKind::Remote
    } else if config.has_local_engine() {
        BackendKind::Local
    } else {
        BackendKind::Remote
    }
}
