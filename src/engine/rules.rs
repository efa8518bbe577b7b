// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Create/read/update/delete of cluster rules.

use super::diff::{build_rule_operations, removal, render_spec};
use super::extract::extract_rule;
use super::locks::ClusterGuard;
use super::observe::{read_rule_by_key, read_rule_by_name, read_rules};
use super::{locator, Engine, ReadOutcome, UpdateOutcome};
use crate::error::{Error, Result};
use crate::types::rule::{RuleDeclaration, RuleIdentity};
use crate::types::{ClusterConfigDelta, ClusterRef, RuleSpec};
use crate::vsphere::ClusterConfigSpec;
use std::slice;
use tracing::{debug, info, instrument, warn};

/// A rule create that passed validation and the name check but has not been
/// submitted. The cluster stays locked until it is submitted or dropped.
pub struct PendingRule<'a> {
    engine: &'a Engine,
    cluster: ClusterRef,
    desired: RuleSpec,
    spec: ClusterConfigSpec,
    _guard: ClusterGuard,
}

impl PendingRule<'_> {
    /// Submit the create and read the new rule back with its key.
    pub async fn submit(self) -> Result<RuleSpec> {
        self.engine.add_rule(&self.cluster, &self.desired, &self.spec).await
    }
}

impl Engine {
    /// Create a rule and return it with the key the management plane
    /// assigned. Fails with `NameConflict`, without submitting anything,
    /// if a rule of that name already exists.
    #[instrument(skip(self, declaration), fields(rule = %declaration.name, cluster = %declaration.target))]
    pub async fn create_rule(&self, declaration: &RuleDeclaration) -> Result<RuleSpec> {
        self.prepare_rule(declaration).await?.submit().await
    }

    /// Everything a create does before it reaches the management plane.
    pub async fn prepare_rule(&self, declaration: &RuleDeclaration) -> Result<PendingRule<'_>> {
        let desired = extract_rule(declaration)?;
        let cluster = locator::resolve(self.plane(), &declaration.target).await?;
        let guard = self.locks.acquire(&cluster).await;

        let observed = read_rules(self.plane(), &cluster).await?;
        let spec = render_create(&cluster, &observed, &desired)?;
        Ok(PendingRule {
            engine: self,
            cluster,
            desired,
            spec,
            _guard: guard,
        })
    }

    /// Re-drive a create that was submitted but never confirmed. A rule of
    /// the same name is adopted if it matches the declaration; a different
    /// rule of that name is a conflict.
    #[instrument(skip(self, declaration), fields(rule = %declaration.name, cluster = %declaration.target))]
    pub async fn recover_rule(&self, declaration: &RuleDeclaration) -> Result<RuleSpec> {
        let desired = extract_rule(declaration)?;
        let cluster = locator::resolve(self.plane(), &declaration.target).await?;
        let _guard = self.locks.acquire(&cluster).await;

        let observed = read_rules(self.plane(), &cluster).await?;
        let mut named = observed.iter().filter(|r| r.name == desired.name);
        match (named.next(), named.next()) {
            (None, _) => {
                let spec = render_create(&cluster, &observed, &desired)?;
                self.add_rule(&cluster, &desired, &spec).await
            }
            (Some(found), None) if found.matches(&desired) => {
                info!("Adopting existing rule {} with key {:?}", found.name, found.key);
                Ok(found.clone())
            }
            _ => Err(Error::name_conflict("rule", cluster.path.clone(), desired.name.clone())),
        }
    }

    async fn add_rule(&self, cluster: &ClusterRef, desired: &RuleSpec, spec: &ClusterConfigSpec) -> Result<RuleSpec> {
        self.driver
            .submit(self.plane(), cluster, spec, None, &self.cancel)
            .await?;

        // The reconfigure does not return the key, read it back by name
        let mut named: Vec<RuleSpec> = read_rules(self.plane(), cluster)
            .await?
            .into_iter()
            .filter(|r| r.name == desired.name)
            .collect();
        match named.len() {
            0 => Err(Error::not_found(format!("rule {} in {} after create", desired.name, cluster))),
            1 => {
                let created = named.remove(0);
                info!("Created rule {} with key {:?}", created.name, created.key);
                Ok(created)
            }
            n => {
                warn!(
                    "Rule {} exists {} times in {}, another writer created it concurrently",
                    desired.name, n, cluster
                );
                Err(Error::name_conflict("rule", cluster.path.clone(), desired.name.clone()))
            }
        }
    }

    /// Read a rule by key, or by name while the key is unknown.
    #[instrument(skip(self, identity), fields(rule = %identity.name, cluster = %identity.target))]
    pub async fn read_rule(&self, identity: &RuleIdentity) -> Result<ReadOutcome<RuleSpec>> {
        let Some(cluster) = self.resolve_existing(&identity.target).await? else {
            debug!("Cluster {} is gone", identity.target);
            return Ok(ReadOutcome::Gone);
        };

        let found = match identity.key {
            Some(key) => read_rule_by_key(self.plane(), &cluster, key).await,
            None => read_rule_by_name(self.plane(), &cluster, &identity.name).await,
        };
        match found {
            Ok(rule) => Ok(ReadOutcome::Present(rule)),
            Err(Error::NotFound { .. }) => {
                debug!("Rule {} is gone", identity.name);
                Ok(ReadOutcome::Gone)
            }
            Err(e) => Err(e),
        }
    }

    /// Converge an existing rule to the declaration. Only changed fields are
    /// submitted, and the result is read back to confirm it took effect.
    #[instrument(skip(self, identity, declaration), fields(rule = %identity.name, cluster = %identity.target))]
    pub async fn update_rule(&self, identity: &RuleIdentity, declaration: &RuleDeclaration) -> Result<UpdateOutcome> {
        let key = identity
            .key
            .ok_or_else(|| Error::not_found(format!("key of rule {}", identity.name)))?;
        let desired = RuleSpec {
            key: Some(key),
            ..extract_rule(declaration)?
        };
        let cluster = locator::resolve(self.plane(), &declaration.target).await?;
        let _guard = self.locks.acquire(&cluster).await;

        let observed = read_rules(self.plane(), &cluster).await?;
        if !observed.iter().any(|r| r.key == Some(key)) {
            return Err(Error::not_found(format!("rule key {} in {}", key, cluster)));
        }

        let operations = build_rule_operations(&cluster, &observed, slice::from_ref(&desired))?;
        if operations.is_empty() {
            debug!("Rule {} is up to date", desired.name);
            return Ok(UpdateOutcome::Unchanged);
        }

        let spec = render_spec(&operations, &[], &ClusterConfigDelta::default())?;
        self.driver
            .submit(self.plane(), &cluster, &spec, None, &self.cancel)
            .await?;

        let current = read_rule_by_key(self.plane(), &cluster, key).await?;
        if !current.matches(&desired) {
            return Err(Error::NotConverged(format!(
                "rule {} in {} does not match the declaration after update",
                desired.name, cluster
            )));
        }
        info!("Updated rule {}", desired.name);
        Ok(UpdateOutcome::Applied)
    }

    /// Remove a rule. Succeeds when the cluster or the rule is already gone
    /// and when the rule never received a key.
    #[instrument(skip(self, identity), fields(rule = %identity.name, cluster = %identity.target))]
    pub async fn delete_rule(&self, identity: &RuleIdentity) -> Result<()> {
        let Some(operation) = removal(identity.key) else {
            debug!("Rule {} was never created, nothing to delete", identity.name);
            return Ok(());
        };
        let Some(cluster) = self.resolve_existing(&identity.target).await? else {
            debug!("Cluster {} is gone, so is rule {}", identity.target, identity.name);
            return Ok(());
        };
        let _guard = self.locks.acquire(&cluster).await;

        if let Some(key) = identity.key {
            match read_rule_by_key(self.plane(), &cluster, key).await {
                Ok(_) => {}
                Err(Error::NotFound { .. }) => {
                    debug!("Rule {} is already gone", identity.name);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }

        let spec = render_spec(&[operation], &[], &ClusterConfigDelta::default())?;
        match self
            .driver
            .submit(self.plane(), &cluster, &spec, None, &self.cancel)
            .await
        {
            Ok(_) => {
                info!("Deleted rule {}", identity.name);
                Ok(())
            }
            // Only a re-read can tell a removed rule from a lost task
            Err(Error::NotFound { what }) => match identity.key {
                Some(key) => match read_rule_by_key(self.plane(), &cluster, key).await {
                    Err(Error::NotFound { .. }) => {
                        info!("Deleted rule {}", identity.name);
                        Ok(())
                    }
                    Ok(_) => Err(Error::NotConverged(format!(
                        "rule {} is still present after removal ({})",
                        identity.name, what
                    ))),
                    Err(e) => Err(e),
                },
                None => Err(Error::NotFound { what }),
            },
            Err(e) => Err(e),
        }
    }
}

/// Spec adding `desired`. Fails with `NameConflict` if the name is taken.
fn render_create(cluster: &ClusterRef, observed: &[RuleSpec], desired: &RuleSpec) -> Result<ClusterConfigSpec> {
    let operations = build_rule_operations(cluster, observed, slice::from_ref(desired))?;
    render_spec(&operations, &[], &ClusterConfigDelta::default())
}
