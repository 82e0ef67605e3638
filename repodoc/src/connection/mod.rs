//! Connection management for tool-server subprocesses
//!
//! [`ConnectionPool`] keeps at most one live [`ServerConnection`] per
//! [`OwnerKey`]. The owner map is only touched under the pool lock. Each
//! owner has its own slot lock, so creating or using one owner's connection
//! never blocks another owner, while two callers with the same key queue on
//! the same slot and share a single process.
//!
//! A slot stays in the map once created; emptying it (release, teardown)
//! never removes it. Empty slots nobody holds are pruned on the next
//! acquire, so a caller queued on a slot never ends up with a private one.

pub mod locator;
pub mod process;

pub use locator::ServerLocator;
pub use process::{LaunchOptions, ServerConnection};

use crate::error::{GatewayError, Result};
use crate::protocol::RpcRequest;
use crate::stats::GatewayStats;
use crate::types::OwnerKey;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slot = Arc<Mutex<Option<ServerConnection>>>;

/// Owner-keyed pool of live tool-server connections
#[derive(Debug)]
pub struct ConnectionPool {
    locator: ServerLocator,
    options: LaunchOptions,
    slots: Mutex<HashMap<OwnerKey, Slot>>,
    stats: Arc<GatewayStats>,
}

impl ConnectionPool {
    /// Create an empty pool; processes start lazily on first acquire
    pub fn new(locator: ServerLocator, options: LaunchOptions, stats: Arc<GatewayStats>) -> Self {
        Self {
            locator,
            options,
            slots: Mutex::new(HashMap::new()),
            stats,
        }
    }

    /// Borrow the connection for `owner`, starting a process if there is none.
    ///
    /// The lease is exclusive: a second acquire for the same owner waits until
    /// the first lease is dropped, then reuses the same process.
    pub async fn acquire(&self, owner: &OwnerKey) -> Result<ConnectionLease> {
        let slot = {
            let mut slots = self.slots.lock().await;
            prune_empty_slots(&mut slots, owner);
            slots.entry(owner.clone()).or_default().clone()
        };

        let mut guard = slot.lock_owned().await;

        let reusable = match guard.as_mut() {
            Some(conn) => {
                if conn.is_alive() {
                    true
                } else {
                    tracing::warn!("Connection for {} exited, replacing it", owner);
                    false
                }
            }
            None => false,
        };

        if !reusable {
            if let Some(dead) = guard.take() {
                self.stats.record_teardown();
                if let Err(e) = dead.terminate().await {
                    tracing::debug!("Cleanup of exited connection for {}: {}", owner, e);
                }
            }
            let program = self.locator.locate()?;
            let conn = ServerConnection::spawn(&program, &self.options).await?;
            self.stats.record_spawn();
            tracing::debug!("Opened connection for {}", owner);
            *guard = Some(conn);
        }

        Ok(ConnectionLease {
            owner: owner.clone(),
            guard,
            stats: Arc::clone(&self.stats),
            in_flight: false,
        })
    }

    /// Terminate `owner`'s connection.
    ///
    /// Waits for a lease in flight to finish first. A caller queued behind
    /// the release gets a new process in the same slot.
    pub async fn release(&self, owner: &OwnerKey) -> Result<()> {
        let slot = self.slots.lock().await.get(owner).cloned();
        let Some(slot) = slot else {
            return Ok(());
        };

        let conn = slot.lock().await.take();
        match conn {
            Some(conn) => {
                tracing::debug!("Releasing connection for {}", owner);
                conn.terminate().await
            }
            None => Ok(()),
        }
    }

    /// Terminate every connection, returning how many were stopped
    pub async fn shutdown_all(&self) -> usize {
        let slots: Vec<(OwnerKey, Slot)> = self.snapshot_slots().await;
        let mut stopped = 0;

        for (owner, slot) in slots {
            let conn = slot.lock().await.take();
            if let Some(conn) = conn {
                if let Err(e) = conn.terminate().await {
                    tracing::warn!("Connection for {} did not stop cleanly: {}", owner, e);
                }
                stopped += 1;
            }
        }

        if stopped > 0 {
            tracing::info!("Stopped {} tool-server connection(s)", stopped);
        }
        stopped
    }

    /// Owners that currently hold a live process.
    ///
    /// Waits for in-flight leases to finish.
    pub async fn live_owners(&self) -> Vec<OwnerKey> {
        let mut live = Vec::new();
        for (owner, slot) in self.snapshot_slots().await {
            if slot.lock().await.is_some() {
                live.push(owner);
            }
        }
        live.sort();
        live
    }

    /// Number of owner slots in the map, empty ones included
    pub async fn slot_count(&self) -> usize {
        self.slots.lock().await.len()
    }

    async fn snapshot_slots(&self) -> Vec<(OwnerKey, Slot)> {
        self.slots
            .lock()
            .await
            .iter()
            .map(|(owner, slot)| (owner.clone(), Arc::clone(slot)))
            .collect()
    }
}

/// Drop slots that hold no connection and that nobody else references.
///
/// A slot referenced outside the map belongs to a lease, a queued acquire or
/// a release in progress, and must stay so they all keep sharing it.
fn prune_empty_slots(slots: &mut HashMap<OwnerKey, Slot>, keep: &OwnerKey) {
    slots.retain(|owner, slot| {
        if owner == keep || Arc::strong_count(slot) > 1 {
            return true;
        }
        match slot.try_lock() {
            Ok(conn) => conn.is_some(),
            Err(_) => true,
        }
    });
}

/// Exclusive use of one owner's connection.
///
/// Dropping the lease returns the connection to the pool, unless a request
/// was still in flight: then the connection is out of step with its
/// requests and is torn down instead.
#[derive(Debug)]
pub struct ConnectionLease {
    owner: OwnerKey,
    guard: OwnedMutexGuard<Option<ServerConnection>>,
    stats: Arc<GatewayStats>,
    in_flight: bool,
}

impl ConnectionLease {
    /// Owner this lease belongs to
    pub fn owner(&self) -> &OwnerKey {
        &self.owner
    }

    /// Send a request built with a fresh id and read its response line.
    ///
    /// A timeout or process failure discards the connection, so the owner's
    /// next acquire starts a new process. So does dropping this future before
    /// it completes.
    pub async fn round_trip(&mut self, build: impl FnOnce(u64) -> RpcRequest) -> Result<String> {
        let conn = self
            .guard
            .as_mut()
            .ok_or_else(|| GatewayError::process("connection was already discarded"))?;
        let request = build(conn.next_request_id());

        self.in_flight = true;
        let result = conn.round_trip(&request).await;
        self.in_flight = false;

        if let Err(e) = &result {
            if e.tears_down_connection() {
                self.discard().await;
            }
        }
        result
    }

    /// Terminate the leased connection and leave the owner's slot empty
    pub async fn discard(&mut self) {
        if let Some(conn) = self.guard.take() {
            tracing::warn!("Tearing down connection for {}", self.owner);
            self.stats.record_teardown();
            if let Err(e) = conn.terminate().await {
                tracing::debug!("Teardown of {}: {}", self.owner, e);
            }
        }
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        if !self.in_flight {
            return;
        }
        let Some(conn) = self.guard.take() else {
            return;
        };

        tracing::warn!(
            "Call for {} was abandoned mid-request, tearing down its connection",
            self.owner
        );
        self.stats.record_teardown();

        // Without a runtime the child is still killed on drop
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let owner = self.owner.clone();
            handle.spawn(async move {
                if let Err(e) = conn.terminate().await {
                    tracing::debug!("Teardown of {}: {}", owner, e);
                }
            });
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_utils::FakeToolServer;
    use std::time::Duration;

    fn pool_for(server: &FakeToolServer) -> (ConnectionPool, Arc<GatewayStats>) {
        let stats = Arc::new(GatewayStats::default());
        let cache = server.dir().join("cache");
        let config = server.config(&cache);
        let pool = ConnectionPool::new(
            ServerLocator::from_config(&config),
            LaunchOptions::pooled(&config),
            Arc::clone(&stats),
        );
        (pool, stats)
    }

    #[tokio::test]
    async fn test_reuse_for_same_owner() {
        let server = FakeToolServer::builder().respond(r#"{"result":1}"#).build();
        let (pool, stats) = pool_for(&server);
        let owner = OwnerKey::new("main");

        for _ in 0..3 {
            let mut lease = pool.acquire(&owner).await.unwrap();
            lease.round_trip(RpcRequest::tools_list).await.unwrap();
        }

        assert_eq!(stats.snapshot().processes_spawned, 1);
        assert_eq!(server.launch_count(), 1);
        assert_eq!(pool.live_owners().await, vec![owner.clone()]);

        pool.release(&owner).await.unwrap();
        assert!(pool.live_owners().await.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_owners_get_distinct_processes() {
        let server = FakeToolServer::builder().respond(r#"{"result":1}"#).build();
        let (pool, _) = pool_for(&server);

        let a = pool.acquire(&OwnerKey::worker(0, 0)).await.unwrap();
        let b = pool.acquire(&OwnerKey::worker(0, 1)).await.unwrap();
        drop((a, b));

        assert_eq!(server.launch_count(), 2);
        assert_eq!(pool.shutdown_all().await, 2);
    }

    #[tokio::test]
    async fn test_timeout_discards_connection() {
        let server = FakeToolServer::builder()
            .respond_to_after("slow", Duration::from_secs(3), r#"{"result":1}"#)
            .respond(r#"{"result":2}"#)
            .build();
        let stats = Arc::new(GatewayStats::default());
        let mut config = server.config(&server.dir().join("cache"));
        config.response_timeout_secs = 1;
        let pool = ConnectionPool::new(
            ServerLocator::from_config(&config),
            LaunchOptions::pooled(&config),
            Arc::clone(&stats),
        );
        let owner = OwnerKey::new("main");

        let slow = crate::types::ToolCall::new("slow");
        let mut lease = pool.acquire(&owner).await.unwrap();
        let err = lease
            .round_trip(|id| RpcRequest::tools_call(id, &slow))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));
        drop(lease);

        assert!(pool.live_owners().await.is_empty());
        let mut lease = pool.acquire(&owner).await.unwrap();
        lease.round_trip(RpcRequest::tools_list).await.unwrap();
        drop(lease);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.processes_spawned, 2);
        assert_eq!(snapshot.teardowns, 1);
        pool.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_abandoned_request_discards_connection() {
        let server = FakeToolServer::builder()
            .respond_to_after("slow", Duration::from_secs(2), r#"{"result":"slow"}"#)
            .respond(r#"{"result":"fast"}"#)
            .build();
        let (pool, stats) = pool_for(&server);
        let owner = OwnerKey::new("main");

        let slow = crate::types::ToolCall::new("slow");
        let mut lease = pool.acquire(&owner).await.unwrap();
        let abandoned = tokio::time::timeout(
            Duration::from_millis(300),
            lease.round_trip(|id| RpcRequest::tools_call(id, &slow)),
        )
        .await;
        assert!(abandoned.is_err());
        drop(lease);

        // the late "slow" reply must not answer the next request
        let mut lease = pool.acquire(&owner).await.unwrap();
        let line = lease.round_trip(RpcRequest::tools_list).await.unwrap();
        assert!(line.contains("fast"));
        drop(lease);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.processes_spawned, 2);
        assert_eq!(snapshot.teardowns, 1);
        pool.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_release_waits_for_lease_in_flight() {
        let server = FakeToolServer::builder()
            .respond_to_after("slow", Duration::from_millis(1500), r#"{"result":"slow"}"#)
            .respond(r#"{"result":"fast"}"#)
            .build();
        let (pool, _) = pool_for(&server);
        let pool = Arc::new(pool);
        let owner = OwnerKey::new("a");

        let first = tokio::spawn({
            let pool = Arc::clone(&pool);
            let owner = owner.clone();
            async move {
                let slow = crate::types::ToolCall::new("slow");
                let mut lease = pool.acquire(&owner).await.unwrap();
                lease
                    .round_trip(|id| RpcRequest::tools_call(id, &slow))
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(300)).await;

        let release = tokio::spawn({
            let pool = Arc::clone(&pool);
            let owner = owner.clone();
            async move { pool.release(&owner).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let second = tokio::spawn({
            let pool = Arc::clone(&pool);
            let owner = owner.clone();
            async move {
                let mut lease = pool.acquire(&owner).await.unwrap();
                lease.round_trip(RpcRequest::tools_list).await
            }
        });
        tokio::time::sleep(Duration::from_millis(300)).await;

        // the first call is still running on the only process
        assert_eq!(server.launch_count(), 1);

        assert!(first.await.unwrap().unwrap().contains("slow"));
        release.await.unwrap().unwrap();
        assert!(second.await.unwrap().unwrap().contains("fast"));

        assert_eq!(server.launch_count(), 2);
        assert_eq!(pool.live_owners().await, vec![owner]);
        assert_eq!(pool.shutdown_all().await, 1);
    }

    #[tokio::test]
    async fn test_empty_slots_are_pruned() {
        let server = FakeToolServer::builder().respond(r#"{"result":1}"#).build();
        let (pool, _) = pool_for(&server);

        for name in ["a", "b", "c"] {
            let owner = OwnerKey::new(name);
            drop(pool.acquire(&owner).await.unwrap());
            pool.release(&owner).await.unwrap();
        }
        // only the slot just acquired survives pruning
        assert_eq!(pool.slot_count().await, 1);

        drop(pool.acquire(&OwnerKey::new("d")).await.unwrap());
        assert_eq!(pool.slot_count().await, 1);
        assert_eq!(pool.live_owners().await, vec![OwnerKey::new("d")]);
        pool.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_missing_executable_is_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = crate::test_utils::missing_server_config(dir.path());
        let pool = ConnectionPool::new(
            ServerLocator::from_config(&config),
            LaunchOptions::pooled(&config),
            Arc::new(GatewayStats::default()),
        );

        let err = pool.acquire(&OwnerKey::new("main")).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ConnectionUnavailable);
    }
}
