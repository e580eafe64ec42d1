//! Source synchronization between views of the same diagram file.
//!
//! Hosts that show one `.puml` file in several panes register each pane with
//! a [`ViewRegistry`]. An edit dispatched from one pane is applied to every
//! other pane showing the same file, marked as synced so the receiving panes
//! do not broadcast it again.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Opaque handle returned by [`ViewRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewHandle(u64);

/// An edit to a diagram file's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceChange {
    /// Full text after the edit.
    pub text: String,
    /// Set on changes that arrived from another view.
    pub synced: bool,
}

impl SourceChange {
    pub fn local(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            synced: false,
        }
    }
}

/// A view that can receive edits made elsewhere.
pub trait SyncView: Send + Sync {
    fn apply(&self, change: &SourceChange);
}

struct Registered<V> {
    handle: ViewHandle,
    document: PathBuf,
    view: Arc<V>,
}

/// Explicit registry of open views.
pub struct ViewRegistry<V: SyncView> {
    views: Mutex<Vec<Registered<V>>>,
    next_handle: AtomicU64,
}

impl<V: SyncView> Default for ViewRegistry<V> {
    fn default() -> Self {
        Self {
            views: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(0),
        }
    }
}

impl<V: SyncView> ViewRegistry<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, document: impl Into<PathBuf>, view: Arc<V>) -> ViewHandle {
        let handle = ViewHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.views.lock().push(Registered {
            handle,
            document: document.into(),
            view,
        });
        handle
    }

    pub fn unregister(&self, handle: ViewHandle) -> Option<Arc<V>> {
        let mut views = self.views.lock();
        let index = views.iter().position(|r| r.handle == handle)?;
        Some(views.remove(index).view)
    }

    pub fn len(&self) -> usize {
        self.views.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.lock().is_empty()
    }

    /// Views currently showing `document`.
    pub fn views_for(&self, document: &Path) -> Vec<ViewHandle> {
        self.views
            .lock()
            .iter()
            .filter(|r| r.document == document)
            .map(|r| r.handle)
            .collect()
    }

    /// Forward a change made in `from` to every other view of the same file.
    ///
    /// Returns the number of views updated. Synced changes are not forwarded.
    pub fn dispatch(&self, from: ViewHandle, change: &SourceChange) -> usize {
        if change.synced {
            return 0;
        }

        // Collect targets first: `apply` may call back into the registry.
        let targets: Vec<Arc<V>> = {
            let views = self.views.lock();
            let Some(document) = views
                .iter()
                .find(|r| r.handle == from)
                .map(|r| r.document.clone())
            else {
                return 0;
            };
            views
                .iter()
                .filter(|r| r.handle != from && r.document == document)
                .map(|r| Arc::clone(&r.view))
                .collect()
        };

        let synced = SourceChange {
            text: change.text.clone(),
            synced: true,
        };
        for view in &targets {
            view.apply(&synced);
        }
        targets.len()
    }
}
