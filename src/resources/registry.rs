//! Resource registration, lookup and pagination (spec.md §4.4-4.5).

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock, Weak};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

use super::validator::{UriValidator, ValidationError};
use super::watcher::{FileSystemWatcher, WatchEvent};

/// Failures surfaced by the registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("resource not found: {uri}")]
    NotFound { uri: String },

    #[error("resource already registered: {uri}")]
    AlreadyExists { uri: String },

    #[error("resource is not watchable: {uri}")]
    NotWatchable { uri: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Where a resource's bytes come from.
#[derive(Debug, Clone)]
pub enum ResourceContents {
    /// Held directly in memory.
    Inline(Vec<u8>),
    /// Read from disk on every `resources/read` miss.
    File(PathBuf),
}

/// A registered resource.
#[derive(Debug, Clone)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    pub contents: ResourceContents,
    /// Whether changes to this resource's backing storage should be
    /// watched and fanned out to subscribers (spec.md §4.5, §4.7).
    pub watchable: bool,
}

/// The subset of [`Resource`] returned by `resources/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSummary {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl From<&Resource> for ResourceSummary {
    fn from(r: &Resource) -> Self {
        Self {
            uri: r.uri.clone(),
            name: r.name.clone(),
            description: r.description.clone(),
            mime_type: r.mime_type.clone(),
        }
    }
}

/// The wire shape of `resources/read`'s `contents` entries (spec.md §3):
/// exactly one of `text`/`blob` is populated, depending on whether the
/// bytes are valid UTF-8.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceContent {
    pub uri: String,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

impl ResourceContent {
    #[must_use]
    pub fn from_bytes(uri: String, mime_type: Option<String>, bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self {
                uri,
                mime_type,
                text: Some(text.to_string()),
                blob: None,
            },
            Err(_) => Self {
                uri,
                mime_type,
                text: None,
                blob: Some(base64_encode(bytes)),
            },
        }
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// One page of a `resources/list` listing.
pub struct Page {
    pub items: Vec<ResourceSummary>,
    pub next_cursor: Option<String>,
}

/// Delivered to a `resources/subscribe` callback on every change.
#[derive(Debug, Clone)]
pub struct ResourceChangeEvent {
    pub uri: String,
    pub contents: Result<Vec<u8>, String>,
}

/// A subscriber callback, invoked once per change with freshly-read
/// content (or the error encountered reading it).
pub type SubscriptionCallback = Arc<dyn Fn(ResourceChangeEvent) + Send + Sync>;

/// Holds every registered resource, ordered by URI for stable,
/// lexicographic cursor pagination (spec.md §4.4).
pub struct ResourceRegistry {
    resources: RwLock<BTreeMap<String, Resource>>,
    subscriptions: RwLock<HashMap<String, Vec<SubscriptionCallback>>>,
    validator: UriValidator,
    watcher: OnceLock<Arc<FileSystemWatcher>>,
    self_weak: OnceLock<Weak<ResourceRegistry>>,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new(UriValidator::default())
    }
}

impl ResourceRegistry {
    #[must_use]
    pub fn new(validator: UriValidator) -> Self {
        Self {
            resources: RwLock::new(BTreeMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            validator,
            watcher: OnceLock::new(),
            self_weak: OnceLock::new(),
        }
    }

    /// Wires a file-system watcher into the registry so that registering a
    /// `watchable` resource backed by `file://`/absolute paths starts
    /// observing it automatically. Call once, right after wrapping the
    /// registry in an `Arc`. A second call is a no-op.
    pub fn attach_watcher(&self, watcher: Arc<FileSystemWatcher>, self_weak: Weak<ResourceRegistry>) {
        let _ = self.watcher.set(watcher);
        let _ = self.self_weak.set(self_weak);
    }

    /// Registers a new resource.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the URI fails validation, or
    /// [`RegistryError::AlreadyExists`] if a resource is already
    /// registered under that URI.
    pub async fn register(&self, resource: Resource) -> Result<(), RegistryError> {
        self.validator.validate(&resource.uri)?;
        let watchable = resource.watchable;
        let uri = resource.uri.clone();
        {
            let mut resources = self.resources.write().await;
            if resources.contains_key(&resource.uri) {
                return Err(RegistryError::AlreadyExists { uri: resource.uri });
            }
            resources.insert(uri.clone(), resource);
        }

        if watchable {
            self.start_watching(&uri).await;
        }
        Ok(())
    }

    async fn start_watching(&self, uri: &str) {
        let (Some(watcher), Some(self_weak)) = (self.watcher.get(), self.self_weak.get()) else {
            return;
        };
        let Some(path) = uri_to_watch_path(uri) else {
            return;
        };
        let self_weak = self_weak.clone();
        let cb_uri = uri.to_string();
        let callback: super::watcher::Callback = Arc::new(move |_event: WatchEvent| {
            let self_weak = self_weak.clone();
            let cb_uri = cb_uri.clone();
            tokio::spawn(async move {
                if let Some(registry) = self_weak.upgrade() {
                    registry.notify_change(&cb_uri).await;
                }
            });
        });
        if let Err(err) = watcher.watch(path, callback).await {
            warn!(uri, error = %err, "failed to start watching resource");
        }
    }

    /// Removes a resource. A no-op (returns `Ok`) if it was not present.
    pub async fn unregister(&self, uri: &str) {
        self.resources.write().await.remove(uri);
        self.subscriptions.write().await.remove(uri);
        if let Some(watcher) = self.watcher.get() {
            if let Some(path) = uri_to_watch_path(uri) {
                let _ = watcher.unwatch(&path).await;
            }
        }
    }

    pub async fn lookup(&self, uri: &str) -> Option<Resource> {
        self.resources.read().await.get(uri).cloned()
    }

    /// Returns one page of resources starting after `cursor`
    /// (exclusive), ordered lexicographically by URI.
    pub async fn paginate(&self, cursor: Option<&str>, limit: usize) -> Page {
        let resources = self.resources.read().await;
        let iter = match cursor {
            Some(c) => resources_after(&resources, c),
            None => Box::new(resources.values()),
        };
        let mut items: Vec<ResourceSummary> = iter.take(limit + 1).map(ResourceSummary::from).collect();
        let next_cursor = if items.len() > limit {
            items.truncate(limit);
            items.last().map(|r| r.uri.clone())
        } else {
            None
        };
        Page { items, next_cursor }
    }

    /// Reads a resource's bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if no resource is registered
    /// under `uri`, or [`RegistryError::Io`] if a file-backed resource
    /// cannot be read.
    pub async fn read(&self, uri: &str) -> Result<Vec<u8>, RegistryError> {
        let resource = self
            .lookup(uri)
            .await
            .ok_or_else(|| RegistryError::NotFound { uri: uri.to_string() })?;
        match resource.contents {
            ResourceContents::Inline(bytes) => Ok(bytes),
            ResourceContents::File(path) => Ok(tokio::fs::read(path).await?),
        }
    }

    /// Registers `callback` to be invoked on every change to `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if `uri` is not registered, or
    /// [`RegistryError::NotWatchable`] if the resource was registered with
    /// `watchable: false`.
    pub async fn subscribe(&self, uri: &str, callback: SubscriptionCallback) -> Result<(), RegistryError> {
        let resource = self
            .lookup(uri)
            .await
            .ok_or_else(|| RegistryError::NotFound { uri: uri.to_string() })?;
        if !resource.watchable {
            return Err(RegistryError::NotWatchable { uri: uri.to_string() });
        }
        self.subscriptions
            .write()
            .await
            .entry(uri.to_string())
            .or_default()
            .push(callback);
        Ok(())
    }

    /// Removes every callback registered for `uri`.
    pub async fn unsubscribe(&self, uri: &str) {
        self.subscriptions.write().await.remove(uri);
    }

    pub async fn is_subscribed(&self, uri: &str) -> bool {
        self.subscriptions.read().await.contains_key(uri)
    }

    /// Reads fresh content for `uri` and invokes every subscriber
    /// callback concurrently. A no-op if nobody is subscribed.
    pub async fn notify_change(&self, uri: &str) {
        let callbacks = self.subscriptions.read().await.get(uri).cloned();
        let Some(callbacks) = callbacks else { return };
        if callbacks.is_empty() {
            return;
        }
        let contents = self.read(uri).await.map_err(|e| e.to_string());
        for cb in callbacks {
            let event = ResourceChangeEvent {
                uri: uri.to_string(),
                contents: contents.clone(),
            };
            // Run on a blocking thread so a panicking callback is caught
            // there rather than unwinding through this task.
            let _ = tokio::task::spawn_blocking(move || cb(event)).await;
        }
    }
}

/// Maps a registered resource's URI onto a filesystem path the watcher can
/// observe, per spec.md §4.7 ("expect `file://` scheme or absolute path;
/// no-op if scheme doesn't map").
fn uri_to_watch_path(uri: &str) -> Option<PathBuf> {
    if let Some(rest) = uri.strip_prefix("file://") {
        Some(PathBuf::from(rest))
    } else if uri.starts_with('/') {
        Some(PathBuf::from(uri))
    } else {
        None
    }
}

fn resources_after<'a>(
    map: &'a BTreeMap<String, Resource>,
    cursor: &str,
) -> Box<dyn Iterator<Item = &'a Resource> + 'a> {
    let cursor = cursor.to_string();
    Box::new(map.range((std::ops::Bound::Excluded(cursor), std::ops::Bound::Unbounded)).map(|(_, v)| v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn resource(uri: &str) -> Resource {
        Resource {
            uri: uri.to_string(),
            name: uri.to_string(),
            description: None,
            mime_type: Some("text/plain".to_string()),
            contents: ResourceContents::Inline(b"hello".to_vec()),
            watchable: false,
        }
    }

    #[tokio::test]
    async fn register_then_lookup() {
        let registry = ResourceRegistry::default();
        registry.register(resource("file:///a.txt")).await.unwrap();
        assert!(registry.lookup("file:///a.txt").await.is_some());
    }

    #[tokio::test]
    async fn duplicate_registration_rejected() {
        let registry = ResourceRegistry::default();
        registry.register(resource("file:///a.txt")).await.unwrap();
        let err = registry.register(resource("file:///a.txt")).await.unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn pagination_walks_all_pages_in_order() {
        let registry = ResourceRegistry::default();
        for n in 0..5 {
            registry
                .register(resource(&format!("file:///{n}.txt")))
                .await
                .unwrap();
        }
        let page1 = registry.paginate(None, 2).await;
        assert_eq!(page1.items.len(), 2);
        assert!(page1.next_cursor.is_some());

        let page2 = registry.paginate(page1.next_cursor.as_deref(), 2).await;
        assert_eq!(page2.items.len(), 2);

        let page3 = registry.paginate(page2.next_cursor.as_deref(), 2).await;
        assert_eq!(page3.items.len(), 1);
        assert!(page3.next_cursor.is_none());
    }

    #[tokio::test]
    async fn read_returns_inline_bytes() {
        let registry = ResourceRegistry::default();
        registry.register(resource("file:///a.txt")).await.unwrap();
        let bytes = registry.read("file:///a.txt").await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn subscribe_requires_existing_resource() {
        let registry = ResourceRegistry::default();
        let callback: SubscriptionCallback = Arc::new(|_| {});
        let err = registry.subscribe("file:///missing.txt", callback).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn subscribe_requires_watchable_resource() {
        let registry = ResourceRegistry::default();
        registry.register(resource("file:///a.txt")).await.unwrap();
        let callback: SubscriptionCallback = Arc::new(|_| {});
        let err = registry.subscribe("file:///a.txt", callback).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotWatchable { .. }));
    }

    #[tokio::test]
    async fn notify_change_invokes_every_subscriber_with_fresh_content() {
        let registry = ResourceRegistry::default();
        let mut watchable = resource("file:///a.txt");
        watchable.watchable = true;
        registry.register(watchable).await.unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let hits = Arc::clone(&hits);
            let callback: SubscriptionCallback = Arc::new(move |event: ResourceChangeEvent| {
                assert_eq!(event.contents.as_deref(), Ok(b"hello".as_slice()));
                hits.fetch_add(1, Ordering::SeqCst);
            });
            registry.subscribe("file:///a.txt", callback).await.unwrap();
        }

        registry.notify_change("file:///a.txt").await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unsubscribe_removes_all_callbacks() {
        let registry = ResourceRegistry::default();
        let mut watchable = resource("file:///a.txt");
        watchable.watchable = true;
        registry.register(watchable).await.unwrap();
        let callback: SubscriptionCallback = Arc::new(|_| {});
        registry.subscribe("file:///a.txt", callback).await.unwrap();
        assert!(registry.is_subscribed("file:///a.txt").await);
        registry.unsubscribe("file:///a.txt").await;
        assert!(!registry.is_subscribed("file:///a.txt").await);
    }
}
