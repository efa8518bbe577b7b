// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Config reconciler - applies declared DRS/HA/storage DRS settings.
//!
//! There is no finalizer: deleting a ComputeClusterConfig leaves the live
//! settings as they are.

use super::{advance, requeue_after, requeue_for_drift};
use crate::engine::{Engine, UpdateOutcome};
use crate::error::{Error, Result};
use crate::kubernetes::set_status;
use crate::types::phase::{EntityPhase, PhaseEvent};
use crate::types::resources::{ComputeClusterConfig, EntityStatus};
use futures::StreamExt;
use kube::{
    runtime::{controller::Action, watcher, Controller},
    Api, Client, ResourceExt,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub struct ConfigReconciler {
    client: Client,
    engine: Arc<Engine>,
    default_datacenter: Option<String>,
}

impl ConfigReconciler {
    pub fn new(client: Client, engine: Arc<Engine>, default_datacenter: Option<String>) -> Self {
        Self {
            client,
            engine,
            default_datacenter,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let configs: Api<ComputeClusterConfig> = Api::all(self.client.clone());
        let context = Arc::new(self);

        Controller::new(configs, watcher::Config::default())
            .graceful_shutdown_on(async move { shutdown.cancelled().await })
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled cluster config: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

#[instrument(skip(config, ctx), fields(config = %config.name_any()))]
async fn reconcile(config: Arc<ComputeClusterConfig>, ctx: Arc<ConfigReconciler>) -> Result<Action> {
    if config.metadata.deletion_timestamp.is_some() {
        debug!("Cluster config is being deleted, live settings stay as they are");
        return Ok(Action::await_change());
    }

    let namespace = config.namespace().unwrap_or_default();
    let api: Api<ComputeClusterConfig> = Api::namespaced(ctx.client.clone(), &namespace);
    let declaration = config.declaration(ctx.default_datacenter.as_deref());
    let generation = config.metadata.generation;
    let current = config.status.as_ref().map(|s| s.phase).unwrap_or_default();

    match ctx.engine.apply_config(&declaration).await {
        Ok(outcome) => {
            if outcome == UpdateOutcome::Applied {
                info!("Applied settings to {}", declaration.target);
            }
            let phase = match current {
                EntityPhase::Unmanaged | EntityPhase::Creating => EntityPhase::Managed,
                _ => advance(current, PhaseEvent::UpdateSucceeded),
            };
            set_status(&api, config.as_ref(), EntityStatus::with_phase(phase, None, None, generation)).await?;
            Ok(requeue_for_drift())
        }
        Err(e) => {
            let status = EntityStatus::with_phase(
                advance(current, PhaseEvent::Failed),
                None,
                Some(e.to_string()),
                generation,
            );
            set_status(&api, config.as_ref(), status).await?;
            Err(e)
        }
    }
}

fn error_policy(_config: Arc<ComputeClusterConfig>, error: &Error, _ctx: Arc<ConfigReconciler>) -> Action {
    error!("Reconciliation error: {}", error);
    requeue_after(error)
}
