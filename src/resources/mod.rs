//! Resource subsystem: URI-addressed, cached, watchable content
//! (spec.md §4.4-§4.9).

pub mod cache;
pub mod metrics;
pub mod registry;
pub mod validator;
pub mod watcher;

pub use cache::{CacheError, CacheStats, ResourceCache};
pub use metrics::ResourceMetrics;
pub use registry::{
    Resource, RegistryError, ResourceChangeEvent, ResourceContent, ResourceRegistry, ResourceSummary,
    SubscriptionCallback,
};
pub use validator::{UriValidator, ValidationError};
pub use watcher::{Callback as WatchCallback, FileSystemWatcher, WatchEvent, WatchEventKind, WatcherError};
