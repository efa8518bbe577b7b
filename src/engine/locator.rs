// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Resolution of cluster ids and inventory paths to managed objects.

use crate::error::{Error, Result};
use crate::types::{ClusterRef, ClusterTarget};
use crate::vsphere::{InventoryObject, ManagementPlane, ObjectKind, PathQuery};
use tracing::{debug, instrument};

/// Resolve the compute cluster a declaration targets.
pub async fn resolve(plane: &dyn ManagementPlane, target: &ClusterTarget) -> Result<ClusterRef> {
    resolve_cluster(plane, target.datacenter.as_deref(), &target.cluster).await
}

/// Resolve a compute cluster by managed object id or inventory path.
pub async fn resolve_cluster(
    plane: &dyn ManagementPlane,
    datacenter: Option<&str>,
    identifier: &str,
) -> Result<ClusterRef> {
    resolve_object(plane, ObjectKind::ClusterComputeResource, datacenter, identifier)
        .await
        .map(ClusterRef::from)
}

/// Resolve a datastore cluster (storage pod) by managed object id or
/// inventory path.
pub async fn resolve_datastore_cluster(
    plane: &dyn ManagementPlane,
    datacenter: Option<&str>,
    identifier: &str,
) -> Result<ClusterRef> {
    resolve_object(plane, ObjectKind::StoragePod, datacenter, identifier)
        .await
        .map(ClusterRef::from)
}

#[instrument(skip(plane))]
async fn resolve_object(
    plane: &dyn ManagementPlane,
    kind: ObjectKind,
    datacenter: Option<&str>,
    identifier: &str,
) -> Result<InventoryObject> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Err(Error::InvalidSpec(format!("{} identifier is empty", kind)));
    }

    // Anything without a path separator may be an opaque id
    if !identifier.contains('/') {
        if let Some(object) = plane.find_by_id(kind, identifier).await? {
            debug!("Resolved {} by id to {}", identifier, object.path);
            return Ok(object);
        }
    }

    let query = PathQuery {
        // Absolute paths bypass the datacenter scope
        datacenter: if identifier.starts_with('/') {
            None
        } else {
            datacenter.map(str::to_string)
        },
        path: identifier.to_string(),
        kind,
    };
    let mut matches = plane.find_by_path(&query).await?;

    match matches.len() {
        0 => Err(Error::not_found(format!("{} {}", kind, identifier))),
        1 => {
            let object = matches.remove(0);
            debug!("Resolved {} by path to {}", identifier, object.reference);
            Ok(object)
        }
        _ => {
            let mut paths: Vec<String> = matches.into_iter().map(|o| o.path).collect();
            paths.sort();
            Err(Error::Ambiguous {
                name: identifier.to_string(),
                matches: paths,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vsphere::{MockManagementPlane, SimulatedPlane};

    fn make_plane() -> SimulatedPlane {
        let plane = SimulatedPlane::new();
        plane.add_datacenter("dc1");
        plane.add_datacenter("dc2");
        plane.add_cluster("dc1", "prod");
        plane.add_cluster("dc2", "prod");
        plane.add_cluster("dc1", "staging");
        plane.add_datastore_cluster("dc1", "pod1");
        plane
    }

    #[tokio::test]
    async fn test_resolve_by_id() {
        let plane = make_plane();
        let staging = plane.add_cluster("dc2", "edge");

        let cluster = resolve_cluster(&plane, None, &staging.value).await.unwrap();

        assert_eq!(cluster.reference, staging);
        assert_eq!(cluster.path, "/dc2/host/edge");
    }

    #[tokio::test]
    async fn test_resolve_relative_path_in_datacenter() {
        let plane = make_plane();

        let cluster = resolve(&plane, &ClusterTarget::new(Some("dc2"), "prod"))
            .await
            .unwrap();

        assert_eq!(cluster.path, "/dc2/host/prod");
        assert_eq!(cluster.datacenter.as_deref(), Some("dc2"));
    }

    #[tokio::test]
    async fn test_absolute_path_bypasses_scope() {
        let plane = make_plane();

        let cluster = resolve(&plane, &ClusterTarget::new(Some("dc2"), "/dc1/host/staging"))
            .await
            .unwrap();

        assert_eq!(cluster.name, "staging");
    }

    #[tokio::test]
    async fn test_unscoped_name_is_ambiguous() {
        let plane = make_plane();

        let result = resolve(&plane, &ClusterTarget::new(None, "prod")).await;

        match result {
            Err(Error::Ambiguous { name, matches }) => {
                assert_eq!(name, "prod");
                assert_eq!(matches, vec!["/dc1/host/prod", "/dc2/host/prod"]);
            }
            other => panic!("expected Ambiguous, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_cluster_is_not_found() {
        let plane = make_plane();

        let result = resolve(&plane, &ClusterTarget::new(Some("dc1"), "nope")).await;

        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_datastore_cluster_is_not_a_compute_cluster() {
        let plane = make_plane();

        let pod = resolve_datastore_cluster(&plane, Some("dc1"), "pod1").await.unwrap();
        assert_eq!(pod.path, "/dc1/datastore/pod1");

        let result = resolve_cluster(&plane, Some("dc1"), "pod1").await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces_as_transient() {
        let mut plane = MockManagementPlane::new();
        plane
            .expect_find_by_id()
            .returning(|_, _| Err(crate::vsphere::PlaneError::Transport("reset".to_string())));
        plane.expect_find_by_path().times(0);

        let result = resolve_cluster(&plane, None, "domain-c7").await;

        assert!(matches!(result, Err(Error::TransientRpc(_))));
    }
}
