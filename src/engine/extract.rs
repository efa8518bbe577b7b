// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Validation and normalization of declared state. No I/O.

use crate::error::{Error, Result};
use crate::types::cluster::ConfigDeclaration;
use crate::types::group::{ClusterGroup, GroupDeclaration, GroupKind};
use crate::types::rule::{RuleDeclaration, RuleMembers, RuleSpec};
use crate::types::vm_override::{DrsVmOverride, VmOverrideDeclaration};
use crate::types::ClusterConfigDelta;
use crate::vsphere::ManagedObjectRef;
use std::collections::BTreeSet;

const MIGRATION_THRESHOLD: (i32, i32) = (1, 5);
const SPACE_THRESHOLD_PERCENT: (i32, i32) = (50, 100);
const IO_LATENCY_THRESHOLD_MS: (i32, i32) = (5, 100);

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn member_ids(ids: &[String], what: &str) -> Result<Vec<String>> {
    let mut ids: Vec<String> = ids.iter().map(|id| id.trim().to_string()).collect();
    if ids.iter().any(|id| id.is_empty()) {
        return Err(Error::InvalidSpec(format!("{} contains an empty id", what)));
    }
    let mut seen = BTreeSet::new();
    ids.retain(|id| seen.insert(id.clone()));
    Ok(ids)
}

/// Normalize a rule declaration into a key-less [`RuleSpec`].
pub fn extract_rule(declaration: &RuleDeclaration) -> Result<RuleSpec> {
    let name = declaration.name.trim();
    if name.is_empty() {
        return Err(Error::InvalidSpec("rule name must not be empty".to_string()));
    }

    let vm_group = non_empty(declaration.vm_group_name.as_deref());
    let host_group = non_empty(declaration.host_group_name.as_deref());

    let members = if declaration.kind.uses_groups() {
        if !declaration.virtual_machine_ids.is_empty() {
            return Err(Error::InvalidSpec(format!(
                "{} rule {} takes group names, not virtual machine ids",
                declaration.kind, name
            )));
        }
        match (vm_group, host_group) {
            (Some(vm_group), Some(host_group)) => RuleMembers::Groups {
                vm_group: vm_group.to_string(),
                host_group: host_group.to_string(),
            },
            _ => {
                return Err(Error::InvalidSpec(format!(
                    "{} rule {} requires both a VM group and a host group",
                    declaration.kind, name
                )))
            }
        }
    } else {
        if vm_group.is_some() || host_group.is_some() {
            return Err(Error::InvalidSpec(format!(
                "{} rule {} takes virtual machine ids, not group names",
                declaration.kind, name
            )));
        }
        let ids = member_ids(&declaration.virtual_machine_ids, "virtual machine list")?;
        if ids.is_empty() {
            return Err(Error::InvalidSpec(format!(
                "{} rule {} requires at least one virtual machine",
                declaration.kind, name
            )));
        }
        RuleMembers::vms(ids.into_iter().map(ManagedObjectRef::virtual_machine))
    };

    Ok(RuleSpec {
        key: None,
        name: name.to_string(),
        kind: declaration.kind,
        mandatory: declaration.mandatory,
        enabled: declaration.enabled,
        members,
    })
}

pub fn extract_group(declaration: &GroupDeclaration) -> Result<ClusterGroup> {
    let name = declaration.name.trim();
    if name.is_empty() {
        return Err(Error::InvalidSpec("group name must not be empty".to_string()));
    }
    let ids = member_ids(&declaration.member_ids, "group member list")?;
    let members = ids
        .into_iter()
        .map(|id| match declaration.kind {
            GroupKind::Vm => ManagedObjectRef::virtual_machine(id),
            GroupKind::Host => ManagedObjectRef::host(id),
        })
        .collect();

    Ok(ClusterGroup {
        name: name.to_string(),
        kind: declaration.kind,
        members,
    })
}

pub fn extract_vm_override(declaration: &VmOverrideDeclaration) -> Result<DrsVmOverride> {
    let vm = non_empty(Some(&declaration.virtual_machine_id))
        .ok_or_else(|| Error::InvalidSpec("DRS override needs a virtual machine id".to_string()))?;
    Ok(DrsVmOverride {
        vm: ManagedObjectRef::virtual_machine(vm),
        enabled: declaration.drs_enabled,
        automation_level: Some(declaration.automation_level),
    })
}

fn check_range(field: &str, value: Option<i32>, (min, max): (i32, i32)) -> Result<()> {
    match value {
        Some(v) if v < min || v > max => Err(Error::InvalidSpec(format!(
            "{} must be between {} and {}, got {}",
            field, min, max, v
        ))),
        _ => Ok(()),
    }
}

/// Validate declared cluster settings into a sparse delta. Settings the
/// declaration leaves out stay `None`.
pub fn extract_config(declaration: &ConfigDeclaration) -> Result<ClusterConfigDelta> {
    let drs = declaration.drs.clone().unwrap_or_default();
    check_range("drs.migrationThreshold", drs.migration_threshold, MIGRATION_THRESHOLD)?;

    let storage_drs = declaration.storage_drs.clone().unwrap_or_default();
    check_range(
        "storageDrs.spaceThresholdPercent",
        storage_drs.space_threshold_percent,
        SPACE_THRESHOLD_PERCENT,
    )?;
    check_range(
        "storageDrs.ioLatencyThresholdMs",
        storage_drs.io_latency_threshold_ms,
        IO_LATENCY_THRESHOLD_MS,
    )?;
    if !storage_drs.is_empty() && non_empty(declaration.datastore_cluster.as_deref()).is_none() {
        return Err(Error::InvalidSpec(
            "storageDrs settings require a datastoreCluster".to_string(),
        ));
    }

    Ok(ClusterConfigDelta {
        drs,
        ha: declaration.ha.clone().unwrap_or_default(),
        storage_drs,
    })
}
