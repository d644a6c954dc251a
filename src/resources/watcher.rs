//! File-system change notifications backing resource subscriptions
//! (spec.md §4.6), built on the `notify` crate.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use notify::Watcher as _;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

/// Failures raised by the watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("failed to watch path: {0}")]
    Notify(#[from] notify::Error),
}

/// The kind of change observed, ordered by the precedence spec.md §4.6
/// assigns when multiple kinds coincide in one debounce window:
/// create > delete > rename > write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WatchEventKind {
    Write,
    Rename,
    Delete,
    Create,
}

/// One fan-out notification delivered to subscribers of `path`.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchEventKind,
}

pub type Callback = Arc<dyn Fn(WatchEvent) + Send + Sync>;

/// Wraps a `notify` recommended watcher, fanning each event out to every
/// registered callback for that path. Callbacks run on spawned tasks
/// outside of any lock, so one panicking callback cannot poison the
/// watcher's internal state or block delivery to other subscribers
/// (spec.md §5: "callback fan-out is spawned outside locks").
pub struct FileSystemWatcher {
    inner: tokio::sync::Mutex<notify::RecommendedWatcher>,
    callbacks: Arc<RwLock<HashMap<PathBuf, Vec<Callback>>>>,
}

impl FileSystemWatcher {
    /// Creates a watcher that dispatches events to registered callbacks.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::Notify`] if the platform watcher backend
    /// fails to initialise.
    pub fn new() -> Result<Self, WatcherError> {
        let callbacks: Arc<RwLock<HashMap<PathBuf, Vec<Callback>>>> =
            Arc::new(RwLock::new(HashMap::new()));
        let dispatch_callbacks = Arc::clone(&callbacks);

        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "filesystem watch error");
                    return;
                }
            };
            let Some(kind) = classify(&event.kind) else {
                return;
            };
            for path in event.paths {
                let callbacks = Arc::clone(&dispatch_callbacks);
                let watch_event = WatchEvent { path: path.clone(), kind };
                tokio::spawn(async move {
                    let targets = callbacks.read().await.get(&path).cloned();
                    let Some(targets) = targets else { return };
                    for cb in targets {
                        let ev = watch_event.clone();
                        // Run on a blocking thread so a panicking
                        // callback is caught there rather than unwinding
                        // through the dispatch task.
                        let _ = tokio::task::spawn_blocking(move || cb(ev)).await;
                    }
                });
            }
        })?;

        Ok(Self {
            inner: tokio::sync::Mutex::new(watcher),
            callbacks,
        })
    }

    /// Begins watching `path` non-recursively, registering `callback` to
    /// receive every event observed for it.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::Notify`] if the underlying watch cannot be
    /// established.
    pub async fn watch(
        &self,
        path: PathBuf,
        callback: Callback,
    ) -> Result<(), WatcherError> {
        self.callbacks
            .write()
            .await
            .entry(path.clone())
            .or_default()
            .push(callback);
        self.inner
            .lock()
            .await
            .watch(&path, notify::RecursiveMode::NonRecursive)?;
        Ok(())
    }

    /// Stops watching `path`, removing every callback registered for it.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::Notify`] if the underlying unwatch fails.
    pub async fn unwatch(&self, path: &PathBuf) -> Result<(), WatcherError> {
        self.callbacks.write().await.remove(path);
        self.inner.lock().await.unwatch(path)?;
        Ok(())
    }
}

fn classify(kind: &notify::EventKind) -> Option<WatchEventKind> {
    use notify::EventKind;
    match kind {
        EventKind::Create(_) => Some(WatchEventKind::Create),
        EventKind::Remove(_) => Some(WatchEventKind::Delete),
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => Some(WatchEventKind::Rename),
        EventKind::Modify(_) => Some(WatchEventKind::Write),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn watch_fires_callback_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("watched.txt");
        tokio::fs::write(&file, "initial").await.unwrap();

        let watcher = FileSystemWatcher::new().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        watcher
            .watch(
                file.clone(),
                Arc::new(move |_event: WatchEvent| {
                    count_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await
            .unwrap();

        tokio::fs::write(&file, "changed").await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(count.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn unwatch_removes_callbacks() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("watched.txt");
        tokio::fs::write(&file, "initial").await.unwrap();

        let watcher = FileSystemWatcher::new().unwrap();
        watcher
            .watch(file.clone(), Arc::new(|_| {}))
            .await
            .unwrap();
        assert!(watcher.callbacks.read().await.contains_key(&file));

        watcher.unwatch(&file).await.unwrap();
        assert!(!watcher.callbacks.read().await.contains_key(&file));
    }

    #[test]
    fn event_kind_precedence_order() {
        assert!(WatchEventKind::Create > WatchEventKind::Delete);
        assert!(WatchEventKind::Delete > WatchEventKind::Rename);
        assert!(WatchEventKind::Rename > WatchEventKind::Write);
    }
}
