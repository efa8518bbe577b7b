// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Management-plane access: the client trait the engine talks to, its wire
//! types, an HTTP gateway client and an in-memory simulator.

pub mod gateway;
pub mod simulator;
pub mod types;

pub use gateway::GatewayClient;
pub use simulator::SimulatedPlane;
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// Failures reported by a management-plane client.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaneError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("duplicate name: {0}")]
    DuplicateName(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Operations the reconciliation engine needs from the management plane.
///
/// Implementations never cache: every call observes live state.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ManagementPlane: Send + Sync {
    /// Look up an object by its opaque identifier.
    async fn find_by_id(
        &self,
        kind: ObjectKind,
        id: &str,
    ) -> Result<Option<InventoryObject>, PlaneError>;

    /// Look up objects by inventory path.
    ///
    /// - An absolute path (`/dc1/host/prod`) matches exactly and ignores the
    ///   query's datacenter.
    /// - A relative path with a datacenter matches `/<dc>/<folder>/<path>`,
    ///   where the folder is given by [`ObjectKind::inventory_folder`].
    /// - A relative path without a datacenter matches every object whose path
    ///   ends in `/<path>`, across all datacenters.
    async fn find_by_path(&self, query: &PathQuery) -> Result<Vec<InventoryObject>, PlaneError>;

    async fn get_cluster_config(
        &self,
        cluster: &ManagedObjectRef,
    ) -> Result<ClusterConfigInfo, PlaneError>;

    /// Submit an incremental reconfigure. The returned task must be polled
    /// with [`ManagementPlane::task_info`].
    async fn reconfigure(
        &self,
        cluster: &ManagedObjectRef,
        spec: &ClusterConfigSpec,
    ) -> Result<TaskHandle, PlaneError>;

    async fn task_info(&self, task: &TaskHandle) -> Result<TaskInfo, PlaneError>;
}
