// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! DRS override reconciler - keeps the per-VM DRS override declared by a
//! ComputeClusterVmOverride in place. An override that was already set on
//! the VM before this operator created one is left alone.

use super::{advance, creating_phase, requeue_after, requeue_for_drift};
use crate::constants::finalizers;
use crate::engine::{Engine, ReadOutcome};
use crate::error::{Error, Result};
use crate::kubernetes::set_status;
use crate::types::phase::{EntityPhase, Ownership, PhaseEvent};
use crate::types::resources::{ComputeClusterVmOverride, EntityStatus};
use futures::StreamExt;
use kube::{
    runtime::{
        controller::Action,
        finalizer::{finalizer, Event},
        watcher, Controller,
    },
    Api, Client, ResourceExt,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub struct VmOverrideReconciler {
    client: Client,
    engine: Arc<Engine>,
    default_datacenter: Option<String>,
}

impl VmOverrideReconciler {
    pub fn new(client: Client, engine: Arc<Engine>, default_datacenter: Option<String>) -> Self {
        Self {
            client,
            engine,
            default_datacenter,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let overrides: Api<ComputeClusterVmOverride> = Api::all(self.client.clone());
        let context = Arc::new(self);

        Controller::new(overrides, watcher::Config::default())
            .graceful_shutdown_on(async move { shutdown.cancelled().await })
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled DRS override: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

async fn reconcile(resource: Arc<ComputeClusterVmOverride>, ctx: Arc<VmOverrideReconciler>) -> Result<Action> {
    let namespace = resource.namespace().unwrap_or_default();
    let api: Api<ComputeClusterVmOverride> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, finalizers::VM_OVERRIDE, resource, |event| async {
        match event {
            Event::Apply(resource) => apply(&api, &resource, &ctx).await,
            Event::Cleanup(resource) => cleanup(&api, &resource, &ctx).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

fn phase_of(resource: &ComputeClusterVmOverride) -> (EntityPhase, Option<Ownership>) {
    resource
        .status
        .as_ref()
        .map(|s| (s.phase, s.ownership))
        .unwrap_or_default()
}

#[instrument(skip(api, resource, ctx), fields(vm_override = %resource.name_any()))]
async fn apply(
    api: &Api<ComputeClusterVmOverride>,
    resource: &ComputeClusterVmOverride,
    ctx: &VmOverrideReconciler,
) -> Result<Action> {
    let default_datacenter = ctx.default_datacenter.as_deref();
    let declaration = resource.declaration(default_datacenter);
    let generation = resource.metadata.generation;
    let (current, mut claim) = phase_of(resource);

    let result = match claim {
        None => match ctx.engine.prepare_vm_override(&declaration).await {
            Ok(pending) => {
                let creating = creating_phase(current);
                claim = Some(Ownership::Submitted);
                let status = EntityStatus::with_phase(creating, None, None, generation).with_ownership(claim);
                set_status(api, resource, status).await?;
                pending
                    .submit()
                    .await
                    .map(|_| advance(creating, PhaseEvent::CreateSucceeded))
            }
            Err(e) => Err(e),
        },
        Some(Ownership::Submitted) => {
            let creating = creating_phase(current);
            let status = EntityStatus::with_phase(creating, None, None, generation).with_ownership(claim);
            set_status(api, resource, status).await?;
            ctx.engine
                .recover_vm_override(&declaration)
                .await
                .map(|_| advance(creating, PhaseEvent::CreateSucceeded))
        }
        Some(Ownership::Owned) => {
            let identity = resource.identity(default_datacenter);
            match ctx.engine.read_vm_override(&identity).await {
                Ok(ReadOutcome::Gone) => {
                    info!("DRS override for {} no longer exists, recreating", identity.virtual_machine_id);
                    let status = EntityStatus::with_phase(
                        advance(current, PhaseEvent::Gone),
                        None,
                        Some("DRS override disappeared from the cluster".to_string()),
                        generation,
                    );
                    set_status(api, resource, status).await?;
                    return Ok(Action::await_change());
                }
                Ok(ReadOutcome::Present(_)) => ctx
                    .engine
                    .update_vm_override(&identity, &declaration)
                    .await
                    .map(|_| advance(current, PhaseEvent::UpdateSucceeded)),
                Err(e) => Err(e),
            }
        }
    };

    match result {
        Ok(phase) => {
            let status =
                EntityStatus::with_phase(phase, None, None, generation).with_ownership(Some(Ownership::Owned));
            set_status(api, resource, status).await?;
            Ok(requeue_for_drift())
        }
        Err(e) => {
            warn!("Failed to reconcile DRS override for {}: {}", declaration.virtual_machine_id, e);
            let status = EntityStatus::with_phase(
                advance(current, PhaseEvent::Failed),
                None,
                Some(e.to_string()),
                generation,
            )
            .with_ownership(claim);
            set_status(api, resource, status).await?;
            Err(e)
        }
    }
}

#[instrument(skip(api, resource, ctx), fields(vm_override = %resource.name_any()))]
async fn cleanup(
    api: &Api<ComputeClusterVmOverride>,
    resource: &ComputeClusterVmOverride,
    ctx: &VmOverrideReconciler,
) -> Result<Action> {
    let identity = resource.identity(ctx.default_datacenter.as_deref());
    let generation = resource.metadata.generation;
    let (current, claim) = phase_of(resource);
    if claim != Some(Ownership::Owned) {
        debug!(
            "DRS override for {} was not confirmed as ours ({:?}), leaving it in place",
            identity.virtual_machine_id, claim
        );
        return Ok(Action::await_change());
    }

    let deleting = advance(current, PhaseEvent::DeleteStarted);
    set_status(
        api,
        resource,
        EntityStatus::with_phase(deleting, None, None, generation).with_ownership(claim),
    )
    .await?;

    if let Err(e) = ctx.engine.delete_vm_override(&identity).await {
        let status = EntityStatus::with_phase(
            advance(deleting, PhaseEvent::Failed),
            None,
            Some(e.to_string()),
            generation,
        )
        .with_ownership(claim);
        set_status(api, resource, status).await?;
        return Err(e);
    }

    info!("DRS override for {} removed from {}", identity.virtual_machine_id, identity.target);
    Ok(Action::await_change())
}

fn error_policy(_resource: Arc<ComputeClusterVmOverride>, error: &Error, _ctx: Arc<VmOverrideReconciler>) -> Action {
    error!("Reconciliation error: {}", error);
    requeue_after(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::make_engine;
    use crate::test_utils::MockService;
    use crate::types::cluster::DrsAutomationLevel;
    use crate::types::resources::ComputeClusterVmOverrideSpec;
    use crate::vsphere::{DrsVmConfigInfo, ManagedObjectRef, SimulatedPlane};
    use kube::api::ObjectMeta;

    const OVERRIDE_PATH: &str =
        "/apis/clusterkeeper.io/v1alpha1/namespaces/vsphere/computeclustervmoverrides/db-pin";

    struct Fixture {
        plane: Arc<SimulatedPlane>,
        api: Api<ComputeClusterVmOverride>,
        ctx: VmOverrideReconciler,
        cluster: ManagedObjectRef,
        vm: ManagedObjectRef,
    }

    fn override_json() -> String {
        serde_json::json!({
            "apiVersion": "clusterkeeper.io/v1alpha1",
            "kind": "ComputeClusterVmOverride",
            "metadata": {"name": "db-pin", "namespace": "vsphere"},
            "spec": {"cluster": "prod", "virtualMachineId": "vm-1"}
        })
        .to_string()
    }

    fn make_fixture() -> Fixture {
        let plane = Arc::new(SimulatedPlane::new());
        plane.add_datacenter("dc1");
        let cluster = plane.add_cluster("dc1", "prod");
        let vm = plane.add_vm("dc1", "db-1");

        let client = MockService::new()
            .on_patch(OVERRIDE_PATH, 200, &override_json())
            .into_client();
        Fixture {
            api: Api::namespaced(client.clone(), "vsphere"),
            ctx: VmOverrideReconciler::new(client, Arc::new(make_engine(plane.clone())), Some("dc1".to_string())),
            plane,
            cluster,
            vm,
        }
    }

    fn make_override(
        vm: &ManagedObjectRef,
        level: DrsAutomationLevel,
        status: Option<EntityStatus>,
    ) -> ComputeClusterVmOverride {
        ComputeClusterVmOverride {
            metadata: ObjectMeta {
                name: Some("db-pin".to_string()),
                namespace: Some("vsphere".to_string()),
                generation: Some(1),
                ..Default::default()
            },
            spec: ComputeClusterVmOverrideSpec {
                datacenter: None,
                cluster: "prod".to_string(),
                virtual_machine_id: vm.value.clone(),
                drs_enabled: true,
                automation_level: level,
            },
            status,
        }
    }

    fn make_status(phase: EntityPhase, ownership: Option<Ownership>) -> Option<EntityStatus> {
        Some(EntityStatus::with_phase(phase, None, None, Some(1)).with_ownership(ownership))
    }

    fn behaviors(fixture: &Fixture) -> Vec<Option<String>> {
        let config = fixture.plane.config(&fixture.cluster).unwrap();
        config.drs_vm_config.iter().map(|e| e.behavior.clone()).collect()
    }

    #[tokio::test]
    async fn test_apply_creates_then_updates_override() {
        let fixture = make_fixture();

        apply(
            &fixture.api,
            &make_override(&fixture.vm, DrsAutomationLevel::Manual, None),
            &fixture.ctx,
        )
        .await
        .unwrap();
        let action = apply(
            &fixture.api,
            &make_override(
                &fixture.vm,
                DrsAutomationLevel::FullyAutomated,
                make_status(EntityPhase::Managed, Some(Ownership::Owned)),
            ),
            &fixture.ctx,
        )
        .await
        .unwrap();

        assert_eq!(action, requeue_for_drift());
        assert_eq!(behaviors(&fixture), vec![Some("fullyAutomated".to_string())]);
        assert_eq!(fixture.plane.reconfigure_calls(), 2);
    }

    #[tokio::test]
    async fn test_existing_override_is_never_taken_over() {
        let fixture = make_fixture();
        let vm = fixture.vm.clone();
        fixture.plane.edit_config(&fixture.cluster, |config| {
            config.drs_vm_config.push(DrsVmConfigInfo {
                key: vm,
                enabled: Some(false),
                behavior: Some("manual".to_string()),
            })
        });

        let first = apply(
            &fixture.api,
            &make_override(&fixture.vm, DrsAutomationLevel::FullyAutomated, None),
            &fixture.ctx,
        )
        .await;
        let failed = make_status(EntityPhase::Error, None);
        let second = apply(
            &fixture.api,
            &make_override(&fixture.vm, DrsAutomationLevel::FullyAutomated, failed.clone()),
            &fixture.ctx,
        )
        .await;
        cleanup(
            &fixture.api,
            &make_override(&fixture.vm, DrsAutomationLevel::FullyAutomated, failed),
            &fixture.ctx,
        )
        .await
        .unwrap();

        assert!(matches!(first, Err(Error::NameConflict { .. })));
        assert!(matches!(second, Err(Error::NameConflict { .. })));
        assert_eq!(fixture.plane.reconfigure_calls(), 0);
        assert_eq!(behaviors(&fixture), vec![Some("manual".to_string())]);
    }

    #[tokio::test]
    async fn test_cleanup_removes_owned_override() {
        let fixture = make_fixture();
        apply(
            &fixture.api,
            &make_override(&fixture.vm, DrsAutomationLevel::Manual, None),
            &fixture.ctx,
        )
        .await
        .unwrap();

        cleanup(
            &fixture.api,
            &make_override(
                &fixture.vm,
                DrsAutomationLevel::Manual,
                make_status(EntityPhase::Managed, Some(Ownership::Owned)),
            ),
            &fixture.ctx,
        )
        .await
        .unwrap();

        assert!(behaviors(&fixture).is_empty());
    }
}
