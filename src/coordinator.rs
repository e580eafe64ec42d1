//! Per-target request coordination.
//!
//! Every [`RenderTarget`] gets a stable identity the first time it is
//! scheduled. The [`RequestCoordinator`] maps that identity to a
//! [`DebounceState`] which
//!
//! - drops requests arriving within the debounce interval of the last
//!   executed one (leading edge: the first request of a burst runs at once),
//! - serializes the renders it lets through, in scheduling order.
//!
//! The map only holds a weak reference to each target, so state for a torn
//! down surface is pruned on the next schedule call.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::surface::Surface;

struct TargetInner {
    surface: Arc<dyn Surface>,
    document_path: Option<PathBuf>,
    identity: OnceLock<Uuid>,
}

/// A display surface undergoing rendering.
///
/// Cloning yields another handle to the same target; the identity lives as
/// long as any handle does.
#[derive(Clone)]
pub struct RenderTarget {
    inner: Arc<TargetInner>,
}

impl RenderTarget {
    pub fn new(surface: Arc<dyn Surface>) -> Self {
        Self {
            inner: Arc::new(TargetInner {
                surface,
                document_path: None,
                identity: OnceLock::new(),
            }),
        }
    }

    /// Target for a block inside the document at `path`.
    pub fn for_document(surface: Arc<dyn Surface>, path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(TargetInner {
                surface,
                document_path: Some(path.into()),
                identity: OnceLock::new(),
            }),
        }
    }

    pub fn surface(&self) -> &dyn Surface {
        self.inner.surface.as_ref()
    }

    pub fn document_path(&self) -> Option<&Path> {
        self.inner.document_path.as_deref()
    }

    /// Folder containing the document, if known.
    pub fn document_dir(&self) -> Option<&Path> {
        self.document_path().and_then(Path::parent)
    }

    /// Identity, if the target has been scheduled at least once.
    pub fn identity(&self) -> Option<Uuid> {
        self.inner.identity.get().copied()
    }

    fn assign_identity(&self) -> Uuid {
        *self.inner.identity.get_or_init(Uuid::new_v4)
    }

    fn downgrade(&self) -> Weak<TargetInner> {
        Arc::downgrade(&self.inner)
    }
}

impl std::fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTarget")
            .field("identity", &self.identity())
            .field("document_path", &self.inner.document_path)
            .finish()
    }
}

/// Debounce bookkeeping for one target.
#[derive(Default)]
pub struct DebounceState {
    last_invoked: Mutex<Option<Instant>>,
    /// Held for the duration of a render. tokio's mutex is FIFO, so renders
    /// complete in the order they were let through.
    gate: tokio::sync::Mutex<()>,
}

impl DebounceState {
    /// Record an invocation at `now` unless one happened less than
    /// `interval` ago.
    fn try_invoke(&self, now: Instant, interval: Duration) -> bool {
        let mut last = self.last_invoked.lock();
        if let Some(prev) = *last
            && now.saturating_duration_since(prev) < interval
        {
            return false;
        }
        *last = Some(now);
        true
    }
}

struct Registration {
    target: Weak<TargetInner>,
    state: Arc<DebounceState>,
}

/// Outcome of [`RequestCoordinator::schedule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheduled<T> {
    Executed(T),
    /// Dropped by the debounce window; the render closure was not called.
    Suppressed,
}

impl<T> Scheduled<T> {
    pub fn is_executed(&self) -> bool {
        matches!(self, Scheduled::Executed(_))
    }
}

/// Owns the identity → [`DebounceState`] map.
#[derive(Default)]
pub struct RequestCoordinator {
    states: Mutex<HashMap<Uuid, Registration>>,
}

impl RequestCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `render` for `target` unless it is debounced.
    ///
    /// `interval` is read per call so configuration changes apply
    /// immediately. A render already in flight for the same target is never
    /// aborted; the next one waits for it.
    pub async fn schedule<F, Fut, T>(
        &self,
        target: &RenderTarget,
        interval: Duration,
        render: F,
    ) -> Scheduled<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let id = target.assign_identity();
        let state = self.state_for(id, target);

        if !state.try_invoke(Instant::now(), interval) {
            crate::debug_trace!("COORDINATOR", "Suppressed render for {}", id);
            return Scheduled::Suppressed;
        }

        let _gate = state.gate.lock().await;
        crate::debug_log!("COORDINATOR", "Rendering target {}", id);
        Scheduled::Executed(render().await)
    }

    fn state_for(&self, id: Uuid, target: &RenderTarget) -> Arc<DebounceState> {
        let mut states = self.states.lock();
        states.retain(|_, reg| reg.target.strong_count() > 0);
        let reg = states.entry(id).or_insert_with(|| Registration {
            target: target.downgrade(),
            state: Arc::new(DebounceState::default()),
        });
        Arc::clone(&reg.state)
    }

    /// Drop the state for `target`, e.g. when the host destroys its view.
    pub fn forget(&self, target: &RenderTarget) {
        if let Some(id) = target.identity() {
            self.states.lock().remove(&id);
        }
    }

    /// Number of targets with live debounce state.
    pub fn tracked_targets(&self) -> usize {
        self.states
            .lock()
            .values()
            .filter(|reg| reg.target.strong_count() > 0)
            .count()
    }
}
