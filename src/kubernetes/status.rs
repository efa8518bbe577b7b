// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Status writes for clusterkeeper resources.

use crate::constants::OPERATOR_NAME;
use crate::error::Result;
use crate::types::resources::{
    ComputeClusterConfig, ComputeClusterGroup, ComputeClusterRule, ComputeClusterVmOverride, EntityStatus,
};
use kube::{
    api::{Patch, PatchParams},
    Api, Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::{debug, instrument};

/// A custom resource carrying an [`EntityStatus`].
pub trait HasStatus: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug {
    fn entity_status(&self) -> Option<&EntityStatus>;
}

impl HasStatus for ComputeClusterRule {
    fn entity_status(&self) -> Option<&EntityStatus> {
        self.status.as_ref()
    }
}

impl HasStatus for ComputeClusterGroup {
    fn entity_status(&self) -> Option<&EntityStatus> {
        self.status.as_ref()
    }
}

impl HasStatus for ComputeClusterVmOverride {
    fn entity_status(&self) -> Option<&EntityStatus> {
        self.status.as_ref()
    }
}

impl HasStatus for ComputeClusterConfig {
    fn entity_status(&self) -> Option<&EntityStatus> {
        self.status.as_ref()
    }
}

/// Write `status` to the status subresource of `obj`, unless it is already
/// what the object carries.
#[instrument(skip(api, obj, status), fields(name = %obj.name_any(), phase = %status.phase))]
pub async fn set_status<K: HasStatus>(api: &Api<K>, obj: &K, status: EntityStatus) -> Result<()> {
    if obj.entity_status() == Some(&status) {
        debug!("Status unchanged");
        return Ok(());
    }

    let patch = serde_json::json!({
        "apiVersion": K::api_version(&()),
        "kind": K::kind(&()),
        "status": status,
    });
    let pp = PatchParams::apply(OPERATOR_NAME).force();
    api.patch_status(&obj.name_any(), &pp, &Patch::Apply(&patch))
        .await?;
    debug!("Status updated");
    Ok(())
}
