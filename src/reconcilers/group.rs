// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Group reconciler - keeps a VM or host group in line with its
//! ComputeClusterGroup. Groups are identified by name, so the ownership
//! recorded in status decides between create, recovery and update. A group
//! this operator did not create is never updated or deleted.

use super::{advance, creating_phase, requeue_after, requeue_for_drift};
use crate::constants::finalizers;
use crate::engine::{Engine, ReadOutcome};
use crate::error::{Error, Result};
use crate::kubernetes::set_status;
use crate::types::group::GroupIdentity;
use crate::types::phase::{EntityPhase, Ownership, PhaseEvent};
use crate::types::resources::{ComputeClusterGroup, EntityStatus};
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

pub struct GroupReconciler {
    client: Client,
    engine: Arc<Engine>,
    default_datacenter: Option<String>,
}

impl GroupReconciler {
    pub fn new(client: Client, engine: Arc<Engine>, default_datacenter: Option<String>) -> Self {
        Self {
            client,
            engine,
            default_datacenter,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let groups: Api<ComputeClusterGroup> = Api::all(self.client.clone());
        let context = Arc::new(self);

        Controller::new(groups, watcher::Config::default())
            .graceful_shutdown_on(async move { shutdown.cancelled().await })
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled group: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

async fn reconcile(group: Arc<ComputeClusterGroup>, ctx: Arc<GroupReconciler>) -> Result<Action> {
    let namespace = group.namespace().unwrap_or_default();
    let api: Api<ComputeClusterGroup> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, finalizers::GROUP, group, |event| async {
        match event {
            Event::Apply(group) => apply(&api, &group, &ctx).await,
            Event::Cleanup(group) => cleanup(&api, &group, &ctx).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

#[instrument(skip(api, group, ctx), fields(group = %group.name_any()))]
async fn apply(api: &Api<ComputeClusterGroup>, group: &ComputeClusterGroup, ctx: &GroupReconciler) -> Result<Action> {
    let declaration = group.declaration(ctx.default_datacenter.as_deref());
    let generation = group.metadata.generation;
    let current = group.status.as_ref().map(|s| s.phase).unwrap_or_default();
    let mut claim = group.status.as_ref().and_then(|s| s.ownership);

    let result = match claim {
        None => match ctx.engine.prepare_group(&declaration).await {
            Ok(pending) => {
                let creating = creating_phase(current);
                claim = Some(Ownership::Submitted);
                let status = EntityStatus::with_phase(creating, None, None, generation).with_ownership(claim);
                set_status(api, group, status).await?;
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
            set_status(api, group, status).await?;
            ctx.engine
                .recover_group(&declaration)
                .await
                .map(|_| advance(creating, PhaseEvent::CreateSucceeded))
        }
        Some(Ownership::Owned) => {
            let identity = GroupIdentity {
                target: declaration.target.clone(),
                name: declaration.name.clone(),
            };
            match ctx.engine.read_group(&identity).await {
                Ok(ReadOutcome::Gone) => {
                    info!("Group {} no longer exists, recreating", identity.name);
                    let status = EntityStatus::with_phase(
                        advance(current, PhaseEvent::Gone),
                        None,
                        Some("group disappeared from the cluster".to_string()),
                        generation,
                    );
                    set_status(api, group, status).await?;
                    return Ok(Action::await_change());
                }
                Ok(ReadOutcome::Present(_)) => ctx
                    .engine
                    .update_group(&identity, &declaration)
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
            set_status(api, group, status).await?;
            Ok(requeue_for_drift())
        }
        Err(e) => {
            warn!("Failed to reconcile group {}: {}", declaration.name, e);
            let status = EntityStatus::with_phase(
                advance(current, PhaseEvent::Failed),
                None,
                Some(e.to_string()),
                generation,
            )
            .with_ownership(claim);
            set_status(api, group, status).await?;
            Err(e)
        }
    }
}

/// Only a group whose create this operator confirmed is removed.
#[instrument(skip(api, group, ctx), fields(group = %group.name_any()))]
async fn cleanup(api: &Api<ComputeClusterGroup>, group: &ComputeClusterGroup, ctx: &GroupReconciler) -> Result<Action> {
    let identity = GroupIdentity {
        target: group.target(ctx.default_datacenter.as_deref()),
        name: group.group_name(),
    };
    let generation = group.metadata.generation;
    let current = group.status.as_ref().map(|s| s.phase).unwrap_or_default();
    match group.status.as_ref().and_then(|s| s.ownership) {
        Some(Ownership::Owned) => {}
        Some(Ownership::Submitted) => {
            warn!("Group {} was submitted but never confirmed, leaving it in place", identity.name);
            return Ok(Action::await_change());
        }
        None => {
            debug!("Group {} was never created", identity.name);
            return Ok(Action::await_change());
        }
    }

    let owned = Some(Ownership::Owned);
    let deleting = advance(current, PhaseEvent::DeleteStarted);
    set_status(
        api,
        group,
        EntityStatus::with_phase(deleting, None, None, generation).with_ownership(owned),
    )
    .await?;

    if let Err(e) = ctx.engine.delete_group(&identity).await {
        let status = EntityStatus::with_phase(
            advance(deleting, PhaseEvent::Failed),
            None,
            Some(e.to_string()),
            generation,
        )
        .with_ownership(owned);
        set_status(api, group, status).await?;
        return Err(e);
    }

    info!("Group {} removed from {}", identity.name, identity.target);
    Ok(Action::await_change())
}

fn error_policy(_group: Arc<ComputeClusterGroup>, error: &Error, _ctx: Arc<GroupReconciler>) -> Action {
    error!("Reconciliation error: {}", error);
    requeue_after(error)
}
