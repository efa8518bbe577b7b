// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! DRS, HA and storage DRS settings.
//!
//! Create and update are the same sparse update: only declared settings
//! that differ from live state are submitted. Undeclared settings are never
//! touched, and removing a declaration leaves the live values as they are.

use super::diff::{build_config_delta, render_spec};
use super::extract::extract_config;
use super::{locator, observe, Engine, ReadOutcome, UpdateOutcome};
use crate::error::{Error, Result};
use crate::types::cluster::{ConfigDeclaration, StorageDrsSettings};
use crate::types::{ClusterConfigDelta, ClusterRef};
use tracing::{debug, info, instrument};

impl Engine {
    /// Live settings of the declared cluster, with storage DRS taken from
    /// the declared datastore cluster.
    #[instrument(skip(self, declaration), fields(cluster = %declaration.target))]
    pub async fn read_config(&self, declaration: &ConfigDeclaration) -> Result<ReadOutcome<ClusterConfigDelta>> {
        let Some(cluster) = self.resolve_existing(&declaration.target).await? else {
            return Ok(ReadOutcome::Gone);
        };
        let mut settings = observe::read_config(self.plane(), &cluster).await?;
        settings.storage_drs = StorageDrsSettings::default();

        if let Some(pod) = self.resolve_datastore_cluster(declaration).await? {
            settings.storage_drs = observe::read_config(self.plane(), &pod).await?.storage_drs;
        }
        Ok(ReadOutcome::Present(settings))
    }

    /// Bring the declared settings in line with live state.
    #[instrument(skip(self, declaration), fields(cluster = %declaration.target))]
    pub async fn apply_config(&self, declaration: &ConfigDeclaration) -> Result<UpdateOutcome> {
        let desired = extract_config(declaration)?;
        let mut outcome = UpdateOutcome::Unchanged;

        let compute = ClusterConfigDelta {
            storage_drs: StorageDrsSettings::default(),
            ..desired.clone()
        };
        if !compute.is_empty() {
            let cluster = locator::resolve(self.plane(), &declaration.target).await?;
            if self.converge_settings(&cluster, &compute).await? == UpdateOutcome::Applied {
                outcome = UpdateOutcome::Applied;
            }
        }

        if !desired.storage_drs.is_empty() {
            let pod = self
                .resolve_datastore_cluster(declaration)
                .await?
                .ok_or_else(|| Error::InvalidSpec("storageDrs settings require a datastoreCluster".to_string()))?;
            let storage = ClusterConfigDelta {
                storage_drs: desired.storage_drs,
                ..Default::default()
            };
            if self.converge_settings(&pod, &storage).await? == UpdateOutcome::Applied {
                outcome = UpdateOutcome::Applied;
            }
        }
        Ok(outcome)
    }

    async fn resolve_datastore_cluster(&self, declaration: &ConfigDeclaration) -> Result<Option<ClusterRef>> {
        match declaration.datastore_cluster.as_deref() {
            Some(identifier) if !identifier.trim().is_empty() => locator::resolve_datastore_cluster(
                self.plane(),
                declaration.target.datacenter.as_deref(),
                identifier,
            )
            .await
            .map(Some),
            _ => Ok(None),
        }
    }

    async fn converge_settings(&self, target: &ClusterRef, desired: &ClusterConfigDelta) -> Result<UpdateOutcome> {
        let _guard = self.locks.acquire(target).await;

        let observed = observe::read_config(self.plane(), target).await?;
        let delta = build_config_delta(&observed, desired);
        if delta.is_empty() {
            debug!("Settings of {} are up to date", target);
            return Ok(UpdateOutcome::Unchanged);
        }

        let spec = render_spec(&[], &[], &delta)?;
        self.driver
            .submit(self.plane(), target, &spec, None, &self.cancel)
            .await?;

        let after = observe::read_config(self.plane(), target).await?;
        if !build_config_delta(&after, desired).is_empty() {
            return Err(Error::NotConverged(format!(
                "settings of {} do not match the declaration after update",
                target
            )));
        }
        info!("Updated settings of {}", target);
        Ok(UpdateOutcome::Applied)
    }
}
