//! Session registry with a capacity cap and idle-eviction sweeper
//! (spec.md §4.2, §5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::Session;
use crate::error::SessionError;
use crate::transport::LineWriter;

fn now_unix_ms() -> i64 {
    // Millisecond-resolution monotonic wall clock; duplicated in a few
    // places rather than threaded through every call site, matching how
    // std::time::SystemTime is used elsewhere in this crate.
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Owns every live [`Session`], guarded by a single lock (spec.md §5:
/// "the session map is guarded by a single lock; no session-level lock
/// is ever held across an `.await` that touches the map").
pub struct SessionManager<W> {
    sessions: RwLock<HashMap<Uuid, Arc<Session<W>>>>,
    max_sessions: usize,
    idle_timeout: Duration,
}

impl<W> SessionManager<W>
where
    W: tokio::io::AsyncWrite + Unpin + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(max_sessions: usize, idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
            idle_timeout,
        }
    }

    /// Registers a new session for `writer`, rejecting the connection if
    /// the manager is already at capacity.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::CapacityReached`] if `max_sessions`
    /// sessions are already tracked.
    pub async fn create(&self, writer: LineWriter<W>) -> Result<Arc<Session<W>>, SessionError> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            return Err(SessionError::CapacityReached {
                max: self.max_sessions,
            });
        }
        let session = Arc::new(Session::new(writer, now_unix_ms()));
        sessions.insert(session.id(), Arc::clone(&session));
        debug!(session_id = %session.id(), count = sessions.len(), "session created");
        Ok(session)
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Session<W>>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) {
        if let Some(session) = self.sessions.write().await.remove(&id) {
            session.begin_shutdown().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Evicts any session whose `last_activity` is older than
    /// `idle_timeout`. Returns the number of sessions evicted.
    pub async fn sweep_idle(&self) -> usize {
        let cutoff = now_unix_ms() - i64::try_from(self.idle_timeout.as_millis()).unwrap_or(i64::MAX);
        let stale: Vec<Uuid> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, s)| s.last_activity_unix_ms() < cutoff)
            .map(|(id, _)| *id)
            .collect();

        for id in &stale {
            self.remove(*id).await;
        }
        if !stale.is_empty() {
            info!(count = stale.len(), "evicted idle sessions");
        }
        stale.len()
    }

    /// Closes every tracked session. Idempotent — calling this on an
    /// already-empty manager is a no-op.
    pub async fn close_all(&self) {
        let mut sessions = self.sessions.write().await;
        for (_, session) in sessions.drain() {
            session.begin_shutdown().await;
        }
    }

    /// Runs the idle sweeper loop until `cancel` fires. Intended to be
    /// spawned once per server instance.
    pub async fn run_sweeper(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep_idle().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer() -> LineWriter<tokio::io::DuplexStream> {
        let (_client, server) = tokio::io::duplex(64);
        let (_reader, writer) = crate::transport::split(server);
        writer
    }

    #[tokio::test]
    async fn creates_and_counts_sessions() {
        let manager: SessionManager<tokio::io::DuplexStream> =
            SessionManager::new(10, Duration::from_secs(60));
        manager.create(writer()).await.unwrap();
        manager.create(writer()).await.unwrap();
        assert_eq!(manager.len().await, 2);
    }

    #[tokio::test]
    async fn rejects_past_capacity() {
        let manager: SessionManager<tokio::io::DuplexStream> =
            SessionManager::new(1, Duration::from_secs(60));
        manager.create(writer()).await.unwrap();
        let err = manager.create(writer()).await.unwrap_err();
        assert!(matches!(err, SessionError::CapacityReached { max: 1 }));
    }

    #[tokio::test]
    async fn remove_drops_session() {
        let manager: SessionManager<tokio::io::DuplexStream> =
            SessionManager::new(10, Duration::from_secs(60));
        let session = manager.create(writer()).await.unwrap();
        manager.remove(session.id()).await;
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn sweep_idle_evicts_stale_sessions() {
        let manager: SessionManager<tokio::io::DuplexStream> =
            SessionManager::new(10, Duration::from_millis(0));
        manager.create(writer()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let evicted = manager.sweep_idle().await;
        assert_eq!(evicted, 1);
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn close_all_empties_manager() {
        let manager: SessionManager<tokio::io::DuplexStream> =
            SessionManager::new(10, Duration::from_secs(60));
        manager.create(writer()).await.unwrap();
        manager.create(writer()).await.unwrap();
        manager.close_all().await;
        assert!(manager.is_empty().await);
        manager.close_all().await;
    }
}
