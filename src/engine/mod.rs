// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster configuration reconciliation engine.
//!
//! Every operation runs the same sequential pipeline: resolve the cluster,
//! read live state, diff against the declaration, submit one reconfigure
//! and poll it, then read back. Nothing is cached between operations.

pub mod diff;
pub mod extract;
pub mod locator;
pub mod locks;
pub mod observe;
pub mod task;

mod groups;
mod overrides;
mod rules;
mod settings;

pub use groups::PendingGroup;
pub use locks::ClusterLocks;
pub use overrides::PendingVmOverride;
pub use rules::PendingRule;
pub use task::{TaskDriver, TaskReport};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{ClusterRef, ClusterTarget};
use crate::vsphere::ManagementPlane;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result of reading a managed entity back from the management plane.
#[derive(Clone, Debug, PartialEq)]
pub enum ReadOutcome<T> {
    Present(T),
    /// The entity, or the cluster holding it, no longer exists.
    Gone,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Live state already matched; nothing was submitted.
    Unchanged,
    Applied,
}

pub struct Engine {
    plane: Arc<dyn ManagementPlane>,
    driver: TaskDriver,
    locks: ClusterLocks,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(
        plane: Arc<dyn ManagementPlane>,
        driver: TaskDriver,
        locks: ClusterLocks,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            plane,
            driver,
            locks,
            cancel,
        }
    }

    pub fn from_config(plane: Arc<dyn ManagementPlane>, config: &Config, cancel: CancellationToken) -> Self {
        Self::new(
            plane,
            TaskDriver::new(
                config.task_timeout,
                config.task_poll_interval,
                config.task_poll_max_interval,
            ),
            ClusterLocks::new(config.serialize_cluster_writes),
            cancel,
        )
    }

    fn plane(&self) -> &dyn ManagementPlane {
        self.plane.as_ref()
    }

    /// Resolve a cluster, mapping "cluster does not exist" to `None`.
    async fn resolve_existing(&self, target: &ClusterTarget) -> Result<Option<ClusterRef>> {
        match locator::resolve(self.plane(), target).await {
            Ok(cluster) => Ok(Some(cluster)),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
