// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle of VM and host groups. A group is identified by its name, so
//! there is no key to carry between phases.

use super::diff::{build_group_operations, render_spec, GroupOperation};
use super::extract::extract_group;
use super::locks::ClusterGuard;
use super::observe::{read_group_by_name, read_groups};
use super::{locator, Engine, ReadOutcome, UpdateOutcome};
use crate::error::{Error, Result};
use crate::types::group::{GroupDeclaration, GroupIdentity};
use crate::types::{ClusterConfigDelta, ClusterGroup, ClusterRef};
use crate::vsphere::ClusterConfigSpec;
use std::slice;
use tracing::{debug, info, instrument};

/// A group create that passed validation and the name check but has not
/// been submitted. The cluster stays locked until it is submitted or dropped.
pub struct PendingGroup<'a> {
    engine: &'a Engine,
    cluster: ClusterRef,
    name: String,
    spec: ClusterConfigSpec,
    _guard: ClusterGuard,
}

impl PendingGroup<'_> {
    pub async fn submit(self) -> Result<ClusterGroup> {
        self.engine.add_group(&self.cluster, &self.name, &self.spec).await
    }
}

impl Engine {
    /// Create a group. Fails with `NameConflict` if the name is taken.
    #[instrument(skip(self, declaration), fields(group = %declaration.name, cluster = %declaration.target))]
    pub async fn create_group(&self, declaration: &GroupDeclaration) -> Result<ClusterGroup> {
        self.prepare_group(declaration).await?.submit().await
    }

    pub async fn prepare_group(&self, declaration: &GroupDeclaration) -> Result<PendingGroup<'_>> {
        let desired = extract_group(declaration)?;
        let cluster = locator::resolve(self.plane(), &declaration.target).await?;
        let guard = self.locks.acquire(&cluster).await;

        let observed = read_groups(self.plane(), &cluster).await?;
        if observed.iter().any(|g| g.name == desired.name) {
            return Err(Error::name_conflict("group", cluster.path.clone(), desired.name));
        }
        let name = desired.name.clone();
        let spec = render_spec(&[], &[GroupOperation::Add(desired)], &ClusterConfigDelta::default())?;
        Ok(PendingGroup {
            engine: self,
            cluster,
            name,
            spec,
            _guard: guard,
        })
    }

    /// Re-drive a create that was submitted but never confirmed: an identical
    /// group of the same name is adopted, a different one is a conflict.
    #[instrument(skip(self, declaration), fields(group = %declaration.name, cluster = %declaration.target))]
    pub async fn recover_group(&self, declaration: &GroupDeclaration) -> Result<ClusterGroup> {
        let desired = extract_group(declaration)?;
        let cluster = locator::resolve(self.plane(), &declaration.target).await?;
        let _guard = self.locks.acquire(&cluster).await;

        match read_group_by_name(self.plane(), &cluster, &desired.name).await {
            Ok(found) if found.kind == desired.kind && found.same_members(&desired) => {
                info!("Adopting existing group {}", found.name);
                Ok(found)
            }
            Ok(_) => Err(Error::name_conflict("group", cluster.path.clone(), desired.name)),
            Err(Error::NotFound { .. }) => {
                let name = desired.name.clone();
                let spec = render_spec(&[], &[GroupOperation::Add(desired)], &ClusterConfigDelta::default())?;
                self.add_group(&cluster, &name, &spec).await
            }
            Err(e) => Err(e),
        }
    }

    async fn add_group(&self, cluster: &ClusterRef, name: &str, spec: &ClusterConfigSpec) -> Result<ClusterGroup> {
        self.driver
            .submit(self.plane(), cluster, spec, None, &self.cancel)
            .await?;

        let created = read_group_by_name(self.plane(), cluster, name).await?;
        info!("Created {} group {} with {} members", created.kind, created.name, created.members.len());
        Ok(created)
    }

    #[instrument(skip(self, identity), fields(group = %identity.name, cluster = %identity.target))]
    pub async fn read_group(&self, identity: &GroupIdentity) -> Result<ReadOutcome<ClusterGroup>> {
        let Some(cluster) = self.resolve_existing(&identity.target).await? else {
            return Ok(ReadOutcome::Gone);
        };
        match read_group_by_name(self.plane(), &cluster, &identity.name).await {
            Ok(group) => Ok(ReadOutcome::Present(group)),
            Err(Error::NotFound { .. }) => {
                debug!("Group {} is gone", identity.name);
                Ok(ReadOutcome::Gone)
            }
            Err(e) => Err(e),
        }
    }

    /// Replace the membership of an existing group.
    #[instrument(skip(self, identity, declaration), fields(group = %identity.name, cluster = %identity.target))]
    pub async fn update_group(&self, identity: &GroupIdentity, declaration: &GroupDeclaration) -> Result<UpdateOutcome> {
        let desired = extract_group(declaration)?;
        if desired.name != identity.name {
            return Err(Error::InvalidSpec(format!(
                "group {} cannot be renamed to {}",
                identity.name, desired.name
            )));
        }
        let cluster = locator::resolve(self.plane(), &declaration.target).await?;
        let _guard = self.locks.acquire(&cluster).await;

        let observed = read_groups(self.plane(), &cluster).await?;
        if !observed.iter().any(|g| g.name == desired.name) {
            return Err(Error::not_found(format!("group {} in {}", desired.name, cluster)));
        }

        let operations = build_group_operations(&observed, slice::from_ref(&desired))?;
        if operations.is_empty() {
            debug!("Group {} is up to date", desired.name);
            return Ok(UpdateOutcome::Unchanged);
        }

        let spec = render_spec(&[], &operations, &ClusterConfigDelta::default())?;
        self.driver
            .submit(self.plane(), &cluster, &spec, None, &self.cancel)
            .await?;

        let current = read_group_by_name(self.plane(), &cluster, &desired.name).await?;
        if !current.same_members(&desired) {
            return Err(Error::NotConverged(format!(
                "group {} in {} does not have the declared members after update",
                desired.name, cluster
            )));
        }
        info!("Updated group {}", desired.name);
        Ok(UpdateOutcome::Applied)
    }

    /// Remove a group. A group still referenced by a rule is rejected by the
    /// management plane.
    #[instrument(skip(self, identity), fields(group = %identity.name, cluster = %identity.target))]
    pub async fn delete_group(&self, identity: &GroupIdentity) -> Result<()> {
        let Some(cluster) = self.resolve_existing(&identity.target).await? else {
            debug!("Cluster {} is gone, so is group {}", identity.target, identity.name);
            return Ok(());
        };
        let _guard = self.locks.acquire(&cluster).await;

        match read_group_by_name(self.plane(), &cluster, &identity.name).await {
            Ok(_) => {}
            Err(Error::NotFound { .. }) => {
                debug!("Group {} is already gone", identity.name);
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let spec = render_spec(
            &[],
            &[GroupOperation::Remove(identity.name.clone())],
            &ClusterConfigDelta::default(),
        )?;
        match self
            .driver
            .submit(self.plane(), &cluster, &spec, None, &self.cancel)
            .await
        {
            Ok(_) => {
                info!("Deleted group {}", identity.name);
                Ok(())
            }
            // Only a re-read can tell a removed group from a lost task
            Err(Error::NotFound { what }) => match read_group_by_name(self.plane(), &cluster, &identity.name).await {
                Err(Error::NotFound { .. }) => {
                    info!("Deleted group {}", identity.name);
                    Ok(())
                }
                Ok(_) => Err(Error::NotConverged(format!(
                    "group {} is still present after removal ({})",
                    identity.name, what
                ))),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        }
    }
}
