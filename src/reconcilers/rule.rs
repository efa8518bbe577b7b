// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Rule reconciler - keeps a cluster rule in line with its ComputeClusterRule.
//!
//! The rule key lives in the resource status. Without a key the rule is
//! created; once a create has been submitted but not confirmed it is
//! recovered by name instead. With a key it is read back and updated. A key
//! whose rule has vanished is dropped so the next pass recreates the rule.
//!
//! A rule that already exists under the declared name is never taken over:
//! the create keeps failing with `NameConflict` until the name is freed.

use super::{advance, creating_phase, requeue_after, requeue_for_drift};
use crate::constants::finalizers;
use crate::engine::{Engine, ReadOutcome};
use crate::error::{Error, Result};
use crate::kubernetes::set_status;
use crate::types::phase::{EntityPhase, Ownership, PhaseEvent};
use crate::types::resources::{ComputeClusterRule, EntityStatus};
use crate::types::rule::{RuleIdentity, RuleKey};
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

pub struct RuleReconciler {
    client: Client,
    engine: Arc<Engine>,
    default_datacenter: Option<String>,
}

impl RuleReconciler {
    pub fn new(client: Client, engine: Arc<Engine>, default_datacenter: Option<String>) -> Self {
        Self {
            client,
            engine,
            default_datacenter,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let rules: Api<ComputeClusterRule> = Api::all(self.client.clone());
        let context = Arc::new(self);

        Controller::new(rules, watcher::Config::default())
            .graceful_shutdown_on(async move { shutdown.cancelled().await })
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled rule: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }

    fn identity(&self, rule: &ComputeClusterRule) -> RuleIdentity {
        RuleIdentity {
            target: rule.target(self.default_datacenter.as_deref()),
            name: rule.rule_name(),
            key: rule.key(),
        }
    }
}

async fn reconcile(rule: Arc<ComputeClusterRule>, ctx: Arc<RuleReconciler>) -> Result<Action> {
    let namespace = rule.namespace().unwrap_or_default();
    let api: Api<ComputeClusterRule> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, finalizers::RULE, rule, |event| async {
        match event {
            Event::Apply(rule) => apply(&api, &rule, &ctx).await,
            Event::Cleanup(rule) => cleanup(&api, &rule, &ctx).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

fn phase_of(rule: &ComputeClusterRule) -> EntityPhase {
    rule.status.as_ref().map(|s| s.phase).unwrap_or_default()
}

fn ownership_of(rule: &ComputeClusterRule) -> Option<Ownership> {
    rule.status.as_ref().and_then(|s| s.ownership)
}

#[instrument(skip(api, rule, ctx), fields(rule = %rule.name_any()))]
async fn apply(api: &Api<ComputeClusterRule>, rule: &ComputeClusterRule, ctx: &RuleReconciler) -> Result<Action> {
    let declaration = rule.declaration(ctx.default_datacenter.as_deref());
    let generation = rule.metadata.generation;
    let current = phase_of(rule);
    let key = rule.key();
    let mut claim = ownership_of(rule);

    let result: Result<(EntityPhase, Option<RuleKey>)> = match (key, claim) {
        (None, Some(Ownership::Submitted)) => {
            // An earlier create was submitted and may have landed
            let creating = creating_phase(current);
            let status = EntityStatus::with_phase(creating, None, None, generation).with_ownership(claim);
            set_status(api, rule, status).await?;
            ctx.engine
                .recover_rule(&declaration)
                .await
                .map(|spec| (advance(creating, PhaseEvent::CreateSucceeded), spec.key))
        }
        (None, _) => match ctx.engine.prepare_rule(&declaration).await {
            Ok(pending) => {
                let creating = creating_phase(current);
                claim = Some(Ownership::Submitted);
                let status = EntityStatus::with_phase(creating, None, None, generation).with_ownership(claim);
                set_status(api, rule, status).await?;
                pending
                    .submit()
                    .await
                    .map(|spec| (advance(creating, PhaseEvent::CreateSucceeded), spec.key))
            }
            Err(e) => Err(e),
        },
        (Some(key), _) => {
            let identity = ctx.identity(rule);
            match ctx.engine.read_rule(&identity).await {
                Ok(ReadOutcome::Gone) => {
                    info!("Rule {} with key {} no longer exists, recreating", identity.name, key);
                    let status = EntityStatus::with_phase(
                        advance(current, PhaseEvent::Gone),
                        None,
                        Some(format!("rule with key {} disappeared from the cluster", key)),
                        generation,
                    );
                    set_status(api, rule, status).await?;
                    // The status write triggers the next pass
                    return Ok(Action::await_change());
                }
                Ok(ReadOutcome::Present(_)) => ctx
                    .engine
                    .update_rule(&identity, &declaration)
                    .await
                    .map(|_| (advance(current, PhaseEvent::UpdateSucceeded), Some(key))),
                Err(e) => Err(e),
            }
        }
    };

    match result {
        Ok((phase, key)) => {
            let status =
                EntityStatus::with_phase(phase, key, None, generation).with_ownership(Some(Ownership::Owned));
            set_status(api, rule, status).await?;
            Ok(requeue_for_drift())
        }
        Err(e) => {
            warn!("Failed to reconcile rule {}: {}", declaration.name, e);
            let status = EntityStatus::with_phase(
                advance(current, PhaseEvent::Failed),
                key,
                Some(e.to_string()),
                generation,
            )
            .with_ownership(claim);
            set_status(api, rule, status).await?;
            Err(e)
        }
    }
}

/// Only a rule whose key this operator recorded is removed. A create that
/// was submitted but never confirmed is left behind.
#[instrument(skip(api, rule, ctx), fields(rule = %rule.name_any()))]
async fn cleanup(api: &Api<ComputeClusterRule>, rule: &ComputeClusterRule, ctx: &RuleReconciler) -> Result<Action> {
    let identity = ctx.identity(rule);
    let Some(key) = identity.key else {
        if ownership_of(rule) == Some(Ownership::Submitted) {
            warn!("Rule {} was submitted but never confirmed, leaving it in place", identity.name);
        } else {
            debug!("Rule {} was never created", identity.name);
        }
        return Ok(Action::await_change());
    };
    let generation = rule.metadata.generation;
    let owned = Some(Ownership::Owned);
    let deleting = advance(phase_of(rule), PhaseEvent::DeleteStarted);
    set_status(
        api,
        rule,
        EntityStatus::with_phase(deleting, Some(key), None, generation).with_ownership(owned),
    )
    .await?;

    if let Err(e) = ctx.engine.delete_rule(&identity).await {
        let status = EntityStatus::with_phase(
            advance(deleting, PhaseEvent::Failed),
            Some(key),
            Some(e.to_string()),
            generation,
        )
        .with_ownership(owned);
        set_status(api, rule, status).await?;
        return Err(e);
    }

    info!("Rule {} removed from {}", identity.name, identity.target);
    Ok(Action::await_change())
}

fn error_policy(_rule: Arc<ComputeClusterRule>, error: &Error, _ctx: Arc<RuleReconciler>) -> Action {
    error!("Reconciliation error: {}", error);
    requeue_after(error)
}
