// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-cluster write serialization within this process.
//!
//! Writers in other processes are not covered, so the rule name check in
//! [`crate::engine::diff`] can still race against them.

use crate::types::ClusterRef;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

#[derive(Default)]
pub struct ClusterLocks {
    enabled: bool,
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

/// Held for the duration of a read-diff-submit cycle. Does nothing when
/// serialization is disabled.
pub struct ClusterGuard {
    _guard: Option<OwnedMutexGuard<()>>,
}

impl ClusterLocks {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            locks: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn acquire(&self, cluster: &ClusterRef) -> ClusterGuard {
        if !self.enabled {
            return ClusterGuard { _guard: None };
        }
        // The shard guard from entry() must be gone before awaiting.
        let lock = self
            .locks
            .entry(cluster.reference.value.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        debug!("Waiting for write lock on {}", cluster);
        ClusterGuard {
            _guard: Some(lock.lock_owned().await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vsphere::{ManagedObjectRef, ObjectKind};
    use std::time::Duration;

    fn make_cluster(id: &str) -> ClusterRef {
        ClusterRef {
            reference: ManagedObjectRef::new(ObjectKind::ClusterComputeResource, id),
            name: id.to_string(),
            path: format!("/dc1/host/{}", id),
            datacenter: Some("dc1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_same_cluster_is_serialized() {
        let locks = Arc::new(ClusterLocks::new(true));
        let cluster = make_cluster("domain-c1");
        let guard = locks.acquire(&cluster).await;

        let contender = {
            let locks = locks.clone();
            let cluster = cluster.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&cluster).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_other_clusters_are_independent() {
        let locks = ClusterLocks::new(true);
        let _first = locks.acquire(&make_cluster("domain-c1")).await;

        let second = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(&make_cluster("domain-c2")),
        )
        .await;

        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_clusters_share_one_lock_each() {
        let locks = Arc::new(ClusterLocks::new(true));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let locks = locks.clone();
                tokio::spawn(async move {
                    let cluster = make_cluster(&format!("domain-c{}", i % 4));
                    let _guard = locks.acquire(&cluster).await;
                    tokio::task::yield_now().await;
                })
            })
            .collect();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .unwrap()
                .unwrap();
        }

        assert_eq!(locks.locks.len(), 4);
    }

    #[tokio::test]
    async fn test_disabled_locks_never_block() {
        let locks = ClusterLocks::new(false);
        let cluster = make_cluster("domain-c1");
        let _first = locks.acquire(&cluster).await;

        let second = tokio::time::timeout(Duration::from_millis(100), locks.acquire(&cluster)).await;

        assert!(second.is_ok());
    }
}
