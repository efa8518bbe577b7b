// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle of per-VM DRS overrides. The VM identifies the override, and
//! the plane keeps at most one per VM in a cluster.

use super::diff::{build_override_operation, render_override_spec, OverrideOperation};
use super::extract::extract_vm_override;
use super::locks::ClusterGuard;
use super::observe::read_vm_override;
use super::{locator, Engine, ReadOutcome, UpdateOutcome};
use crate::error::{Error, Result};
use crate::types::vm_override::{VmOverrideDeclaration, VmOverrideIdentity};
use crate::types::{ClusterRef, DrsVmOverride};
use crate::vsphere::{ClusterConfigSpec, ManagedObjectRef};
use tracing::{debug, info, instrument};

/// An override create that passed validation and the existence check but
/// has not been submitted. Holds the cluster lock until dropped.
pub struct PendingVmOverride<'a> {
    engine: &'a Engine,
    cluster: ClusterRef,
    vm: ManagedObjectRef,
    spec: ClusterConfigSpec,
    _guard: ClusterGuard,
}

impl PendingVmOverride<'_> {
    pub async fn submit(self) -> Result<DrsVmOverride> {
        self.engine.add_vm_override(&self.cluster, &self.vm, &self.spec).await
    }
}

impl Engine {
    /// Create an override. Fails with `NameConflict` if the VM already has one.
    #[instrument(skip(self, declaration), fields(vm = %declaration.virtual_machine_id, cluster = %declaration.target))]
    pub async fn create_vm_override(&self, declaration: &VmOverrideDeclaration) -> Result<DrsVmOverride> {
        self.prepare_vm_override(declaration).await?.submit().await
    }

    pub async fn prepare_vm_override(&self, declaration: &VmOverrideDeclaration) -> Result<PendingVmOverride<'_>> {
        let desired = extract_vm_override(declaration)?;
        let cluster = locator::resolve(self.plane(), &declaration.target).await?;
        let guard = self.locks.acquire(&cluster).await;

        match read_vm_override(self.plane(), &cluster, &desired.vm).await {
            Ok(_) => {
                return Err(Error::name_conflict(
                    "DRS override",
                    cluster.path.clone(),
                    desired.vm.value,
                ))
            }
            Err(Error::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        let vm = desired.vm.clone();
        let spec = render_override_spec(&[OverrideOperation::Set(desired)]);
        Ok(PendingVmOverride {
            engine: self,
            cluster,
            vm,
            spec,
            _guard: guard,
        })
    }

    /// Re-drive a create that was submitted but never confirmed. An identical
    /// override is adopted, a different one is a conflict.
    #[instrument(skip(self, declaration), fields(vm = %declaration.virtual_machine_id, cluster = %declaration.target))]
    pub async fn recover_vm_override(&self, declaration: &VmOverrideDeclaration) -> Result<DrsVmOverride> {
        let desired = extract_vm_override(declaration)?;
        let cluster = locator::resolve(self.plane(), &declaration.target).await?;
        let _guard = self.locks.acquire(&cluster).await;

        match read_vm_override(self.plane(), &cluster, &desired.vm).await {
            Ok(found) if found == desired => {
                info!("Adopting existing DRS override for {}", found.vm);
                Ok(found)
            }
            Ok(_) => Err(Error::name_conflict(
                "DRS override",
                cluster.path.clone(),
                desired.vm.value,
            )),
            Err(Error::NotFound { .. }) => {
                let vm = desired.vm.clone();
                let spec = render_override_spec(&[OverrideOperation::Set(desired)]);
                self.add_vm_override(&cluster, &vm, &spec).await
            }
            Err(e) => Err(e),
        }
    }

    async fn add_vm_override(
        &self,
        cluster: &ClusterRef,
        vm: &ManagedObjectRef,
        spec: &ClusterConfigSpec,
    ) -> Result<DrsVmOverride> {
        self.driver
            .submit(self.plane(), cluster, spec, None, &self.cancel)
            .await?;

        let created = read_vm_override(self.plane(), cluster, vm).await?;
        info!("Created DRS override for {} (enabled: {})", created.vm, created.enabled);
        Ok(created)
    }

    #[instrument(skip(self, identity), fields(vm = %identity.virtual_machine_id, cluster = %identity.target))]
    pub async fn read_vm_override(&self, identity: &VmOverrideIdentity) -> Result<ReadOutcome<DrsVmOverride>> {
        let Some(cluster) = self.resolve_existing(&identity.target).await? else {
            return Ok(ReadOutcome::Gone);
        };
        let vm = ManagedObjectRef::virtual_machine(identity.virtual_machine_id.trim());
        match read_vm_override(self.plane(), &cluster, &vm).await {
            Ok(found) => Ok(ReadOutcome::Present(found)),
            Err(Error::NotFound { .. }) => {
                debug!("DRS override for {} is gone", vm);
                Ok(ReadOutcome::Gone)
            }
            Err(e) => Err(e),
        }
    }

    /// Bring an existing override in line with the declaration. The entry is
    /// re-added whole, which replaces the one on the plane.
    #[instrument(skip(self, identity, declaration), fields(vm = %identity.virtual_machine_id, cluster = %identity.target))]
    pub async fn update_vm_override(
        &self,
        identity: &VmOverrideIdentity,
        declaration: &VmOverrideDeclaration,
    ) -> Result<UpdateOutcome> {
        let desired = extract_vm_override(declaration)?;
        if desired.vm.value != identity.virtual_machine_id.trim() {
            return Err(Error::InvalidSpec(format!(
                "DRS override for {} cannot be moved to {}",
                identity.virtual_machine_id, desired.vm.value
            )));
        }
        let cluster = locator::resolve(self.plane(), &declaration.target).await?;
        let _guard = self.locks.acquire(&cluster).await;

        let observed = read_vm_override(self.plane(), &cluster, &desired.vm).await?;
        let Some(operation) = build_override_operation(Some(&observed), &desired) else {
            debug!("DRS override for {} is up to date", desired.vm);
            return Ok(UpdateOutcome::Unchanged);
        };

        let spec = render_override_spec(&[operation]);
        self.driver
            .submit(self.plane(), &cluster, &spec, None, &self.cancel)
            .await?;

        let current = read_vm_override(self.plane(), &cluster, &desired.vm).await?;
        if current != desired {
            return Err(Error::NotConverged(format!(
                "DRS override for {} in {} does not match the declaration after update",
                desired.vm, cluster
            )));
        }
        info!("Updated DRS override for {}", desired.vm);
        Ok(UpdateOutcome::Applied)
    }

    #[instrument(skip(self, identity), fields(vm = %identity.virtual_machine_id, cluster = %identity.target))]
    pub async fn delete_vm_override(&self, identity: &VmOverrideIdentity) -> Result<()> {
        let Some(cluster) = self.resolve_existing(&identity.target).await? else {
            debug!("Cluster {} is gone, so is the override for {}", identity.target, identity.virtual_machine_id);
            return Ok(());
        };
        let _guard = self.locks.acquire(&cluster).await;

        let vm = ManagedObjectRef::virtual_machine(identity.virtual_machine_id.trim());
        match read_vm_override(self.plane(), &cluster, &vm).await {
            Ok(_) => {}
            Err(Error::NotFound { .. }) => {
                debug!("DRS override for {} is already gone", vm);
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let spec = render_override_spec(&[OverrideOperation::Remove(vm.clone())]);
        match self
            .driver
            .submit(self.plane(), &cluster, &spec, None, &self.cancel)
            .await
        {
            Ok(_) => {
                info!("Deleted DRS override for {}", vm);
                Ok(())
            }
            Err(Error::NotFound { what }) => match read_vm_override(self.plane(), &cluster, &vm).await {
                Err(Error::NotFound { .. }) => {
                    info!("Deleted DRS override for {}", vm);
                    Ok(())
                }
                Ok(_) => Err(Error::NotConverged(format!(
                    "DRS override for {} is still present after removal ({})",
                    vm, what
                ))),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        }
    }
}
