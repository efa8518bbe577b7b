// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Computes the operations that move observed state to desired state and
//! renders them into a single reconfigure spec.
//!
//! Rule names are checked against the observed set before an `Add` is
//! emitted, but the management plane does not enforce uniqueness itself:
//! two writers that pass the check concurrently can both create a rule of
//! the same name.

use crate::engine::observe::{HOST_MONITORING_DISABLED, HOST_MONITORING_ENABLED};
use crate::error::{Error, Result};
use crate::types::{
    ClusterConfigDelta, ClusterGroup, ClusterRef, DrsVmOverride, GroupKind, RuleKey, RuleKind, RuleMembers,
    RulePatch, RuleSpec,
};
use crate::vsphere::{
    ArrayUpdateOperation, ClusterConfigSpec, DasConfigInfo, DrsConfigInfo, DrsVmConfigInfo, DrsVmConfigSpecEntry,
    GroupInfo, GroupSpecEntry, ManagedObjectRef, RuleDetail, RuleInfo, RuleSpecEntry, StorageDrsConfigInfo,
};
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq)]
pub enum ReconcileOperation {
    Add(RuleSpec),
    /// Sparse edit; `kind` is needed to render changed members.
    Modify {
        key: RuleKey,
        kind: RuleKind,
        patch: RulePatch,
    },
    Remove(RuleKey),
}

#[derive(Clone, Debug, PartialEq)]
pub enum GroupOperation {
    Add(ClusterGroup),
    Modify(ClusterGroup),
    Remove(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum OverrideOperation {
    /// Adds the override, replacing any existing one for the same VM.
    Set(DrsVmOverride),
    Remove(ManagedObjectRef),
}

fn check_unique_names<'a>(names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(Error::InvalidSpec(format!("name {} is declared more than once", name)));
        }
    }
    Ok(())
}

/// Field-level difference between an observed rule and the desired one.
/// Unchanged fields stay `None`.
pub fn build_rule_patch(observed: &RuleSpec, desired: &RuleSpec) -> RulePatch {
    RulePatch {
        enabled: (observed.enabled != desired.enabled).then_some(desired.enabled),
        mandatory: (observed.mandatory != desired.mandatory).then_some(desired.mandatory),
        members: (!observed.members.same_as(&desired.members)).then(|| desired.members.clone()),
    }
}

/// Operations reconciling `observed` towards `desired`.
///
/// A desired rule with a key that is still present becomes a `Modify` (or
/// nothing, if it already matches). Any other desired rule becomes an `Add`,
/// unless a rule of the same name already exists, which is a
/// [`Error::NameConflict`]. Observed rules absent from `desired` are left
/// alone; removals are requested explicitly with [`removal`].
pub fn build_rule_operations(
    cluster: &ClusterRef,
    observed: &[RuleSpec],
    desired: &[RuleSpec],
) -> Result<Vec<ReconcileOperation>> {
    check_unique_names(desired.iter().map(|r| r.name.as_str()))?;

    let mut operations = Vec::new();
    for rule in desired {
        let existing = rule.key.and_then(|key| {
            observed
                .iter()
                .find(|o| o.key == Some(key))
                .map(|current| (key, current))
        });

        match existing {
            Some((key, current)) => {
                if current.name != rule.name {
                    return Err(Error::InvalidSpec(format!(
                        "rule {} cannot be renamed to {}",
                        current.name, rule.name
                    )));
                }
                if current.kind != rule.kind {
                    return Err(Error::InvalidSpec(format!(
                        "rule {} cannot change type from {} to {}",
                        rule.name, current.kind, rule.kind
                    )));
                }
                let patch = build_rule_patch(current, rule);
                if !patch.is_empty() {
                    operations.push(ReconcileOperation::Modify {
                        key,
                        kind: rule.kind,
                        patch,
                    });
                }
            }
            None => {
                if observed.iter().any(|o| o.name == rule.name) {
                    return Err(Error::name_conflict("rule", cluster.path.clone(), rule.name.clone()));
                }
                operations.push(ReconcileOperation::Add(RuleSpec {
                    key: None,
                    ..rule.clone()
                }));
            }
        }
    }
    Ok(operations)
}

/// Removal of a rule by key. A rule that never received a key was never
/// created, so there is nothing to remove.
pub fn removal(key: Option<RuleKey>) -> Option<ReconcileOperation> {
    key.map(ReconcileOperation::Remove)
}

fn changed<T: PartialEq + Clone>(observed: &Option<T>, desired: &Option<T>) -> Option<T> {
    match desired {
        Some(value) if observed.as_ref() != Some(value) => Some(value.clone()),
        _ => None,
    }
}

/// Sparse delta of the desired settings that differ from the observed ones.
/// Settings not declared in `desired` are never part of the delta.
pub fn build_config_delta(observed: &ClusterConfigDelta, desired: &ClusterConfigDelta) -> ClusterConfigDelta {
    let mut delta = ClusterConfigDelta::default();

    delta.drs.enabled = changed(&observed.drs.enabled, &desired.drs.enabled);
    delta.drs.automation_level = changed(&observed.drs.automation_level, &desired.drs.automation_level);
    delta.drs.migration_threshold = changed(&observed.drs.migration_threshold, &desired.drs.migration_threshold);
    delta.drs.vm_overrides_enabled =
        changed(&observed.drs.vm_overrides_enabled, &desired.drs.vm_overrides_enabled);

    delta.ha.enabled = changed(&observed.ha.enabled, &desired.ha.enabled);
    delta.ha.host_monitoring = changed(&observed.ha.host_monitoring, &desired.ha.host_monitoring);

    let (current, wanted) = (&observed.storage_drs, &desired.storage_drs);
    delta.storage_drs.enabled = changed(&current.enabled, &wanted.enabled);
    delta.storage_drs.automation_level = changed(&current.automation_level, &wanted.automation_level);
    delta.storage_drs.space_threshold_percent =
        changed(&current.space_threshold_percent, &wanted.space_threshold_percent);
    delta.storage_drs.io_latency_threshold_ms =
        changed(&current.io_latency_threshold_ms, &wanted.io_latency_threshold_ms);
    delta.storage_drs.io_load_balance_enabled =
        changed(&current.io_load_balance_enabled, &wanted.io_load_balance_enabled);

    delta
}

pub fn build_group_operations(observed: &[ClusterGroup], desired: &[ClusterGroup]) -> Result<Vec<GroupOperation>> {
    check_unique_names(desired.iter().map(|g| g.name.as_str()))?;

    let mut operations = Vec::new();
    for group in desired {
        match observed.iter().find(|o| o.name == group.name) {
            Some(current) if current.kind != group.kind => {
                return Err(Error::InvalidSpec(format!(
                    "group {} cannot change type from {} to {}",
                    group.name, current.kind, group.kind
                )))
            }
            Some(current) if current.same_members(group) => {}
            Some(_) => operations.push(GroupOperation::Modify(group.clone())),
            None => operations.push(GroupOperation::Add(group.clone())),
        }
    }
    Ok(operations)
}

/// `None` when `observed` already matches.
pub fn build_override_operation(observed: Option<&DrsVmOverride>, desired: &DrsVmOverride) -> Option<OverrideOperation> {
    match observed {
        Some(current) if current == desired => None,
        _ => Some(OverrideOperation::Set(desired.clone())),
    }
}

fn rule_detail(kind: RuleKind, members: &RuleMembers) -> Option<RuleDetail> {
    match (kind, members) {
        (RuleKind::Affinity, RuleMembers::Vms(vms)) => Some(RuleDetail::Affinity { vms: vms.clone() }),
        (RuleKind::AntiAffinity, RuleMembers::Vms(vms)) => Some(RuleDetail::AntiAffinity { vms: vms.clone() }),
        (RuleKind::VmHostAffine, RuleMembers::Groups { vm_group, host_group }) => Some(RuleDetail::VmHost {
            vm_group_name: vm_group.clone(),
            affine_host_group_name: Some(host_group.clone()),
            anti_affine_host_group_name: None,
        }),
        (RuleKind::VmHostAntiAffine, RuleMembers::Groups { vm_group, host_group }) => Some(RuleDetail::VmHost {
            vm_group_name: vm_group.clone(),
            affine_host_group_name: None,
            anti_affine_host_group_name: Some(host_group.clone()),
        }),
        _ => None,
    }
}

fn rule_entry(operation: &ReconcileOperation) -> Result<RuleSpecEntry> {
    let entry = match operation {
        ReconcileOperation::Add(spec) => RuleSpecEntry {
            operation: ArrayUpdateOperation::Add,
            remove_key: None,
            info: Some(RuleInfo {
                key: None,
                name: Some(spec.name.clone()),
                enabled: Some(spec.enabled),
                mandatory: Some(spec.mandatory),
                status: None,
                detail: Some(rule_detail(spec.kind, &spec.members).ok_or_else(|| {
                    Error::InvalidSpec(format!("rule {} has members that do not fit its type", spec.name))
                })?),
            }),
        },
        ReconcileOperation::Modify { key, kind, patch } => RuleSpecEntry {
            operation: ArrayUpdateOperation::Edit,
            remove_key: None,
            info: Some(RuleInfo {
                key: Some(key.0),
                name: None,
                enabled: patch.enabled,
                mandatory: patch.mandatory,
                status: None,
                detail: match &patch.members {
                    Some(members) => Some(rule_detail(*kind, members).ok_or_else(|| {
                        Error::InvalidSpec(format!("rule {} has members that do not fit its type", key))
                    })?),
                    None => None,
                },
            }),
        },
        ReconcileOperation::Remove(key) => RuleSpecEntry {
            operation: ArrayUpdateOperation::Remove,
            remove_key: Some(key.0),
            info: None,
        },
    };
    Ok(entry)
}

fn group_info(group: &ClusterGroup) -> GroupInfo {
    match group.kind {
        GroupKind::Vm => GroupInfo::Vm {
            name: group.name.clone(),
            vms: group.members.clone(),
        },
        GroupKind::Host => GroupInfo::Host {
            name: group.name.clone(),
            hosts: group.members.clone(),
        },
    }
}

fn group_entry(operation: &GroupOperation) -> GroupSpecEntry {
    match operation {
        GroupOperation::Add(group) => GroupSpecEntry {
            operation: ArrayUpdateOperation::Add,
            remove_key: None,
            info: Some(group_info(group)),
        },
        GroupOperation::Modify(group) => GroupSpecEntry {
            operation: ArrayUpdateOperation::Edit,
            remove_key: None,
            info: Some(group_info(group)),
        },
        GroupOperation::Remove(name) => GroupSpecEntry {
            operation: ArrayUpdateOperation::Remove,
            remove_key: Some(name.clone()),
            info: None,
        },
    }
}

/// Render operations and a settings delta into one reconfigure spec. Each
/// operation maps to exactly one entry, in order.
pub fn render_spec(
    rules: &[ReconcileOperation],
    groups: &[GroupOperation],
    settings: &ClusterConfigDelta,
) -> Result<ClusterConfigSpec> {
    let mut spec = ClusterConfigSpec {
        rules_spec: rules.iter().map(rule_entry).collect::<Result<_>>()?,
        group_spec: groups.iter().map(group_entry).collect(),
        ..Default::default()
    };

    if !settings.drs.is_empty() {
        spec.drs_config = Some(DrsConfigInfo {
            enabled: settings.drs.enabled,
            default_vm_behavior: settings.drs.automation_level.map(|l| l.as_str().to_string()),
            vmotion_rate: settings.drs.migration_threshold,
            enable_vm_behavior_overrides: settings.drs.vm_overrides_enabled,
        });
    }
    if !settings.ha.is_empty() {
        spec.das_config = Some(DasConfigInfo {
            enabled: settings.ha.enabled,
            host_monitoring: settings.ha.host_monitoring.map(|on| {
                if on {
                    HOST_MONITORING_ENABLED.to_string()
                } else {
                    HOST_MONITORING_DISABLED.to_string()
                }
            }),
        });
    }
    if !settings.storage_drs.is_empty() {
        let sdrs = &settings.storage_drs;
        spec.storage_drs_config = Some(StorageDrsConfigInfo {
            enabled: sdrs.enabled,
            default_vm_behavior: sdrs.automation_level.map(|l| l.as_str().to_string()),
            space_utilization_threshold: sdrs.space_threshold_percent,
            io_latency_threshold: sdrs.io_latency_threshold_ms,
            io_load_balance_enabled: sdrs.io_load_balance_enabled,
        });
    }
    Ok(spec)
}

fn override_entry(operation: &OverrideOperation) -> DrsVmConfigSpecEntry {
    match operation {
        OverrideOperation::Set(desired) => DrsVmConfigSpecEntry {
            operation: ArrayUpdateOperation::Add,
            remove_key: None,
            info: Some(DrsVmConfigInfo {
                key: desired.vm.clone(),
                enabled: Some(desired.enabled),
                behavior: desired.automation_level.map(|l| l.as_str().to_string()),
            }),
        },
        OverrideOperation::Remove(vm) => DrsVmConfigSpecEntry {
            operation: ArrayUpdateOperation::Remove,
            remove_key: Some(vm.clone()),
            info: None,
        },
    }
}

/// Render override operations into a reconfigure spec that touches nothing
/// else.
pub fn render_override_spec(operations: &[OverrideOperation]) -> ClusterConfigSpec {
    ClusterConfigSpec {
        drs_vm_config_spec: operations.iter().map(override_entry).collect(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::cluster::{DrsAutomationLevel, DrsSettings, HaSettings};
    use crate::vsphere::ObjectKind;

    fn make_cluster() -> ClusterRef {
        ClusterRef {
            reference: ManagedObjectRef::new(ObjectKind::ClusterComputeResource, "domain-c7"),
            name: "prod".to_string(),
            path: "/dc1/host/prod".to_string(),
            datacenter: Some("dc1".to_string()),
        }
    }

    fn make_rule(key: Option<i32>, name: &str, vms: &[&str]) -> RuleSpec {
        RuleSpec {
            key: key.map(RuleKey),
            name: name.to_string(),
            kind: RuleKind::AntiAffinity,
            mandatory: false,
            enabled: true,
            members: RuleMembers::vms(vms.iter().map(|v| ManagedObjectRef::virtual_machine(*v))),
        }
    }

    #[test]
    fn test_empty_observed_yields_only_adds() {
        let desired = vec![
            make_rule(None, "rack-spread", &["vm-1", "vm-2"]),
            make_rule(None, "db-spread", &["vm-3", "vm-4"]),
        ];

        let operations = build_rule_operations(&make_cluster(), &[], &desired).unwrap();

        assert_eq!(operations.len(), 2);
        assert!(operations
            .iter()
            .all(|op| matches!(op, ReconcileOperation::Add(_))));
    }

    #[test]
    fn test_existing_name_is_a_conflict() {
        let observed = vec![make_rule(Some(7), "rack-spread", &["vm-9"])];
        let desired = vec![make_rule(None, "rack-spread", &["vm-1", "vm-2"])];

        let result = build_rule_operations(&make_cluster(), &observed, &desired);

        assert!(matches!(result, Err(Error::NameConflict { ref name, .. }) if name == "rack-spread"));
    }

    #[test]
    fn test_stale_key_with_taken_name_is_a_conflict() {
        let observed = vec![make_rule(Some(8), "rack-spread", &["vm-1"])];
        let desired = vec![make_rule(Some(7), "rack-spread", &["vm-1"])];

        let result = build_rule_operations(&make_cluster(), &observed, &desired);

        assert!(matches!(result, Err(Error::NameConflict { .. })));
    }

    #[test]
    fn test_modify_carries_only_changed_fields() {
        let observed = vec![make_rule(Some(42), "rack-spread", &["vm-1", "vm-2"])];
        let mut wanted = make_rule(Some(42), "rack-spread", &["vm-2", "vm-1"]);
        wanted.enabled = false;

        let operations = build_rule_operations(&make_cluster(), &observed, &[wanted]).unwrap();

        assert_eq!(
            operations,
            vec![ReconcileOperation::Modify {
                key: RuleKey(42),
                kind: RuleKind::AntiAffinity,
                patch: RulePatch {
                    enabled: Some(false),
                    mandatory: None,
                    members: None,
                },
            }]
        );

        let spec = render_spec(&operations, &[], &ClusterConfigDelta::default()).unwrap();
        let info = spec.rules_spec[0].info.as_ref().unwrap();
        assert_eq!(info.key, Some(42));
        assert_eq!(info.enabled, Some(false));
        assert!(info.mandatory.is_none());
        assert!(info.detail.is_none());
        assert!(info.name.is_none());
    }

    #[test]
    fn test_matching_rule_needs_no_operation() {
        let observed = vec![make_rule(Some(0), "rack-spread", &["vm-1", "vm-2"])];
        let desired = vec![make_rule(Some(0), "rack-spread", &["vm-2", "vm-1"])];

        let operations = build_rule_operations(&make_cluster(), &observed, &desired).unwrap();

        assert!(operations.is_empty());
    }

    #[test]
    fn test_unlisted_observed_rules_are_not_removed() {
        let observed = vec![
            make_rule(Some(1), "rack-spread", &["vm-1"]),
            make_rule(Some(2), "someone-else", &["vm-5"]),
        ];
        let desired = vec![make_rule(Some(1), "rack-spread", &["vm-1"])];

        let operations = build_rule_operations(&make_cluster(), &observed, &desired).unwrap();

        assert!(operations.is_empty());
    }

    #[test]
    fn test_rename_and_type_change_are_invalid() {
        let observed = vec![make_rule(Some(1), "rack-spread", &["vm-1"])];

        let renamed = make_rule(Some(1), "spread", &["vm-1"]);
        assert!(matches!(
            build_rule_operations(&make_cluster(), &observed, &[renamed]),
            Err(Error::InvalidSpec(_))
        ));

        let mut retyped = make_rule(Some(1), "rack-spread", &["vm-1"]);
        retyped.kind = RuleKind::Affinity;
        assert!(matches!(
            build_rule_operations(&make_cluster(), &observed, &[retyped]),
            Err(Error::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_duplicate_desired_names_are_invalid() {
        let desired = vec![
            make_rule(None, "rack-spread", &["vm-1"]),
            make_rule(None, "rack-spread", &["vm-2"]),
        ];
        assert!(matches!(
            build_rule_operations(&make_cluster(), &[], &desired),
            Err(Error::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_removal_needs_a_key() {
        assert_eq!(removal(None), None);
        assert_eq!(removal(Some(RuleKey(0))), Some(ReconcileOperation::Remove(RuleKey(0))));
    }

    #[test]
    fn test_render_preserves_operation_order() {
        let operations = vec![
            ReconcileOperation::Remove(RuleKey(3)),
            ReconcileOperation::Add(make_rule(None, "rack-spread", &["vm-1"])),
        ];

        let spec = render_spec(&operations, &[], &ClusterConfigDelta::default()).unwrap();

        assert_eq!(spec.rules_spec.len(), 2);
        assert_eq!(spec.rules_spec[0].operation, ArrayUpdateOperation::Remove);
        assert_eq!(spec.rules_spec[0].remove_key, Some(3));
        assert_eq!(spec.rules_spec[1].operation, ArrayUpdateOperation::Add);
        assert!(spec.drs_config.is_none());
    }

    #[test]
    fn test_config_delta_is_empty_when_desired_is_subset() {
        let observed = ClusterConfigDelta {
            drs: DrsSettings {
                enabled: Some(true),
                automation_level: Some(DrsAutomationLevel::FullyAutomated),
                migration_threshold: Some(3),
                vm_overrides_enabled: Some(true),
            },
            ha: HaSettings {
                enabled: Some(true),
                host_monitoring: Some(true),
            },
            ..Default::default()
        };
        let desired = ClusterConfigDelta {
            drs: DrsSettings {
                enabled: Some(true),
                migration_threshold: Some(3),
                ..Default::default()
            },
            ha: HaSettings {
                enabled: Some(true),
                host_monitoring: None,
            },
            ..Default::default()
        };

        assert!(build_config_delta(&observed, &desired).is_empty());
        assert!(build_config_delta(&observed, &ClusterConfigDelta::default()).is_empty());
    }

    #[test]
    fn test_config_delta_only_carries_changes() {
        let observed = ClusterConfigDelta {
            drs: DrsSettings {
                enabled: Some(true),
                automation_level: Some(DrsAutomationLevel::Manual),
                ..Default::default()
            },
            ..Default::default()
        };
        let desired = ClusterConfigDelta {
            drs: DrsSettings {
                enabled: Some(true),
                automation_level: Some(DrsAutomationLevel::FullyAutomated),
                ..Default::default()
            },
            ..Default::default()
        };

        let delta = build_config_delta(&observed, &desired);
        assert_eq!(delta.drs.enabled, None);
        assert_eq!(delta.drs.automation_level, Some(DrsAutomationLevel::FullyAutomated));

        let spec = render_spec(&[], &[], &delta).unwrap();
        assert_eq!(
            spec.drs_config,
            Some(DrsConfigInfo {
                default_vm_behavior: Some("fullyAutomated".to_string()),
                ..Default::default()
            })
        );
        assert!(spec.das_config.is_none());
    }

    #[test]
    fn test_group_operations() {
        let observed = vec![ClusterGroup {
            name: "web".to_string(),
            kind: GroupKind::Vm,
            members: vec![ManagedObjectRef::virtual_machine("vm-1")],
        }];
        let desired = vec![
            ClusterGroup {
                name: "web".to_string(),
                kind: GroupKind::Vm,
                members: vec![
                    ManagedObjectRef::virtual_machine("vm-1"),
                    ManagedObjectRef::virtual_machine("vm-2"),
                ],
            },
            ClusterGroup {
                name: "rack-a".to_string(),
                kind: GroupKind::Host,
                members: vec![ManagedObjectRef::host("host-1")],
            },
        ];

        let operations = build_group_operations(&observed, &desired).unwrap();

        assert!(matches!(&operations[0], GroupOperation::Modify(g) if g.name == "web"));
        assert!(matches!(&operations[1], GroupOperation::Add(g) if g.name == "rack-a"));

        let retyped = vec![ClusterGroup {
            name: "web".to_string(),
            kind: GroupKind::Host,
            members: vec![],
        }];
        assert!(matches!(
            build_group_operations(&observed, &retyped),
            Err(Error::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_override_operation_only_when_different() {
        let desired = DrsVmOverride {
            vm: ManagedObjectRef::virtual_machine("vm-4"),
            enabled: false,
            automation_level: Some(DrsAutomationLevel::Manual),
        };
        let drifted = DrsVmOverride {
            enabled: true,
            ..desired.clone()
        };

        assert_eq!(build_override_operation(Some(&desired), &desired), None);
        assert_eq!(
            build_override_operation(Some(&drifted), &desired),
            Some(OverrideOperation::Set(desired.clone()))
        );
        assert_eq!(
            build_override_operation(None, &desired),
            Some(OverrideOperation::Set(desired))
        );
    }

    #[test]
    fn test_render_override_spec() {
        let vm = ManagedObjectRef::virtual_machine("vm-4");
        let spec = render_override_spec(&[
            OverrideOperation::Set(DrsVmOverride {
                vm: vm.clone(),
                enabled: true,
                automation_level: Some(DrsAutomationLevel::FullyAutomated),
            }),
            OverrideOperation::Remove(vm.clone()),
        ]);

        assert_eq!(spec.drs_vm_config_spec.len(), 2);
        let set = &spec.drs_vm_config_spec[0];
        assert_eq!(set.operation, ArrayUpdateOperation::Add);
        assert_eq!(set.info.as_ref().unwrap().behavior.as_deref(), Some("fullyAutomated"));
        let remove = &spec.drs_vm_config_spec[1];
        assert_eq!(remove.operation, ArrayUpdateOperation::Remove);
        assert_eq!(remove.remove_key.as_ref(), Some(&vm));
        assert!(spec.rules_spec.is_empty());
        assert!(spec.drs_config.is_none());
    }
}
