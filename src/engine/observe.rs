// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reads live cluster state. Nothing here is cached; every call goes to the
//! management plane.

use crate::error::{Error, Result};
use crate::types::cluster::{
    DrsAutomationLevel, DrsSettings, HaSettings, SdrsAutomationLevel, StorageDrsSettings,
};
use crate::types::{
    ClusterConfigDelta, ClusterGroup, ClusterRef, DrsVmOverride, GroupKind, RuleKey, RuleKind, RuleMembers, RuleSpec,
};
use crate::vsphere::{
    ClusterConfigInfo, DrsVmConfigInfo, GroupInfo, ManagedObjectRef, ManagementPlane, RuleDetail, RuleInfo,
};
use tracing::{debug, instrument};

/// Wire value of an enabled HA host monitoring service
pub(crate) const HOST_MONITORING_ENABLED: &str = "enabled";
pub(crate) const HOST_MONITORING_DISABLED: &str = "disabled";

/// Convert a wire rule into a [`RuleSpec`], or `None` for rules this
/// operator does not model.
pub fn rule_from_info(info: &RuleInfo) -> Option<RuleSpec> {
    let key = info.key?;
    let name = info.name.clone()?;
    let (kind, members) = match info.detail.as_ref()? {
        RuleDetail::Affinity { vms } => (RuleKind::Affinity, RuleMembers::vms(vms.iter().cloned())),
        RuleDetail::AntiAffinity { vms } => {
            (RuleKind::AntiAffinity, RuleMembers::vms(vms.iter().cloned()))
        }
        RuleDetail::VmHost {
            vm_group_name,
            affine_host_group_name,
            anti_affine_host_group_name,
        } => match (affine_host_group_name, anti_affine_host_group_name) {
            (Some(host_group), None) => (
                RuleKind::VmHostAffine,
                RuleMembers::Groups {
                    vm_group: vm_group_name.clone(),
                    host_group: host_group.clone(),
                },
            ),
            (None, Some(host_group)) => (
                RuleKind::VmHostAntiAffine,
                RuleMembers::Groups {
                    vm_group: vm_group_name.clone(),
                    host_group: host_group.clone(),
                },
            ),
            _ => return None,
        },
        RuleDetail::Unknown => return None,
    };

    Some(RuleSpec {
        key: Some(RuleKey(key)),
        name,
        kind,
        mandatory: info.mandatory.unwrap_or(false),
        enabled: info.enabled.unwrap_or(true),
        members,
    })
}

pub fn group_from_info(info: &GroupInfo) -> ClusterGroup {
    match info {
        GroupInfo::Vm { name, vms } => ClusterGroup {
            name: name.clone(),
            kind: GroupKind::Vm,
            members: vms.clone(),
        },
        GroupInfo::Host { name, hosts } => ClusterGroup {
            name: name.clone(),
            kind: GroupKind::Host,
            members: hosts.clone(),
        },
    }
}

/// An override the plane reports without `enabled` has DRS disabled for
/// the VM.
pub fn vm_override_from_info(info: &DrsVmConfigInfo) -> DrsVmOverride {
    DrsVmOverride {
        vm: info.key.clone(),
        enabled: info.enabled.unwrap_or(false),
        automation_level: info.behavior.as_deref().and_then(DrsAutomationLevel::parse),
    }
}

/// Observed settings with every field the plane reports populated.
pub fn config_from_info(info: &ClusterConfigInfo) -> ClusterConfigDelta {
    let drs = DrsSettings {
        enabled: info.drs.enabled,
        automation_level: info
            .drs
            .default_vm_behavior
            .as_deref()
            .and_then(DrsAutomationLevel::parse),
        migration_threshold: info.drs.vmotion_rate,
        vm_overrides_enabled: info.drs.enable_vm_behavior_overrides,
    };
    let ha = HaSettings {
        enabled: info.das.enabled,
        host_monitoring: info.das.host_monitoring.as_deref().and_then(|m| match m {
            HOST_MONITORING_ENABLED => Some(true),
            HOST_MONITORING_DISABLED => Some(false),
            _ => None,
        }),
    };
    let storage_drs = info
        .storage_drs
        .as_ref()
        .map(|sdrs| StorageDrsSettings {
            enabled: sdrs.enabled,
            automation_level: sdrs
                .default_vm_behavior
                .as_deref()
                .and_then(SdrsAutomationLevel::parse),
            space_threshold_percent: sdrs.space_utilization_threshold,
            io_latency_threshold_ms: sdrs.io_latency_threshold,
            io_load_balance_enabled: sdrs.io_load_balance_enabled,
        })
        .unwrap_or_default();

    ClusterConfigDelta { drs, ha, storage_drs }
}

/// All modeled rules of a cluster. Unknown variants, key-less rules and
/// malformed vm-host rules are skipped.
#[instrument(skip(plane, cluster), fields(cluster = %cluster))]
pub async fn read_rules(plane: &dyn ManagementPlane, cluster: &ClusterRef) -> Result<Vec<RuleSpec>> {
    let config = plane.get_cluster_config(&cluster.reference).await?;
    let rules: Vec<RuleSpec> = config
        .rules
        .iter()
        .filter_map(|info| {
            let rule = rule_from_info(info);
            if rule.is_none() {
                debug!(
                    "Skipping unmanaged rule {} (key {:?})",
                    info.name.as_deref().unwrap_or("<unnamed>"),
                    info.key
                );
            }
            rule
        })
        .collect();
    debug!("Read {} rules", rules.len());
    Ok(rules)
}

pub async fn read_rule_by_name(plane: &dyn ManagementPlane, cluster: &ClusterRef, name: &str) -> Result<RuleSpec> {
    read_rules(plane, cluster)
        .await?
        .into_iter()
        .find(|r| r.name == name)
        .ok_or_else(|| Error::not_found(format!("rule {} in {}", name, cluster)))
}

pub async fn read_rule_by_key(plane: &dyn ManagementPlane, cluster: &ClusterRef, key: RuleKey) -> Result<RuleSpec> {
    read_rules(plane, cluster)
        .await?
        .into_iter()
        .find(|r| r.key == Some(key))
        .ok_or_else(|| Error::not_found(format!("rule key {} in {}", key, cluster)))
}

#[instrument(skip(plane, cluster), fields(cluster = %cluster))]
pub async fn read_config(plane: &dyn ManagementPlane, cluster: &ClusterRef) -> Result<ClusterConfigDelta> {
    let config = plane.get_cluster_config(&cluster.reference).await?;
    Ok(config_from_info(&config))
}

#[instrument(skip(plane, cluster), fields(cluster = %cluster))]
pub async fn read_groups(plane: &dyn ManagementPlane, cluster: &ClusterRef) -> Result<Vec<ClusterGroup>> {
    let config = plane.get_cluster_config(&cluster.reference).await?;
    Ok(config.groups.iter().map(group_from_info).collect())
}

pub async fn read_group_by_name(plane: &dyn ManagementPlane, cluster: &ClusterRef, name: &str) -> Result<ClusterGroup> {
    read_groups(plane, cluster)
        .await?
        .into_iter()
        .find(|g| g.name == name)
        .ok_or_else(|| Error::not_found(format!("group {} in {}", name, cluster)))
}

#[instrument(skip(plane, cluster), fields(cluster = %cluster))]
pub async fn read_vm_overrides(plane: &dyn ManagementPlane, cluster: &ClusterRef) -> Result<Vec<DrsVmOverride>> {
    let config = plane.get_cluster_config(&cluster.reference).await?;
    Ok(config.drs_vm_config.iter().map(vm_override_from_info).collect())
}

pub async fn read_vm_override(
    plane: &dyn ManagementPlane,
    cluster: &ClusterRef,
    vm: &ManagedObjectRef,
) -> Result<DrsVmOverride> {
    read_vm_overrides(plane, cluster)
        .await?
        .into_iter()
        .find(|o| &o.vm == vm)
        .ok_or_else(|| Error::not_found(format!("DRS override for {} in {}", vm, cluster)))
}
