// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Wire representation of management-plane objects, cluster configuration
//! and reconfigure specs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Managed object types this operator looks up or references.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Datacenter,
    ClusterComputeResource,
    StoragePod,
    VirtualMachine,
    HostSystem,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Datacenter => "Datacenter",
            ObjectKind::ClusterComputeResource => "ClusterComputeResource",
            ObjectKind::StoragePod => "StoragePod",
            ObjectKind::VirtualMachine => "VirtualMachine",
            ObjectKind::HostSystem => "HostSystem",
        }
    }

    /// Datacenter folder objects of this kind live under.
    pub fn inventory_folder(&self) -> Option<&'static str> {
        match self {
            ObjectKind::Datacenter => None,
            ObjectKind::ClusterComputeResource | ObjectKind::HostSystem => Some("host"),
            ObjectKind::StoragePod => Some("datastore"),
            ObjectKind::VirtualMachine => Some("vm"),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a managed object, e.g. `ClusterComputeResource:domain-c7`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagedObjectRef {
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    pub value: String,
}

impl ManagedObjectRef {
    pub fn new(kind: ObjectKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn virtual_machine(value: impl Into<String>) -> Self {
        Self::new(ObjectKind::VirtualMachine, value)
    }

    pub fn host(value: impl Into<String>) -> Self {
        Self::new(ObjectKind::HostSystem, value)
    }
}

impl fmt::Display for ManagedObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// An inventory entry returned by lookups.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InventoryObject {
    pub reference: ManagedObjectRef,
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
}

/// Path lookup. See [`crate::vsphere::ManagementPlane::find_by_path`] for the
/// matching rules.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PathQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
    pub path: String,
    pub kind: ObjectKind,
}

/// Rule entry as stored in a cluster configuration.
///
/// The same shape is used for edit specs, where every unset field is left
/// unchanged by the management plane.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mandatory: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<RuleDetail>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "ruleType", rename_all = "camelCase")]
pub enum RuleDetail {
    Affinity {
        vms: Vec<ManagedObjectRef>,
    },
    AntiAffinity {
        vms: Vec<ManagedObjectRef>,
    },
    #[serde(rename_all = "camelCase")]
    VmHost {
        vm_group_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        affine_host_group_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        anti_affine_host_group_name: Option<String>,
    },
    /// Rule variants this operator does not manage (dependency rules,
    /// storage anti-affinity rules, ...).
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "groupType", rename_all = "camelCase")]
pub enum GroupInfo {
    Vm {
        name: String,
        #[serde(default)]
        vms: Vec<ManagedObjectRef>,
    },
    Host {
        name: String,
        #[serde(default)]
        hosts: Vec<ManagedObjectRef>,
    },
}

impl GroupInfo {
    pub fn name(&self) -> &str {
        match self {
            GroupInfo::Vm { name, .. } | GroupInfo::Host { name, .. } => name,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DrsConfigInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_vm_behavior: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vmotion_rate: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_vm_behavior_overrides: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DasConfigInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_monitoring: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageDrsConfigInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_vm_behavior: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_utilization_threshold: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io_latency_threshold: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io_load_balance_enabled: Option<bool>,
}

/// Per-VM DRS override, keyed by the virtual machine it applies to.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DrsVmConfigInfo {
    pub key: ManagedObjectRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<String>,
}

/// Current configuration of a cluster.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfigInfo {
    #[serde(default)]
    pub rules: Vec<RuleInfo>,
    #[serde(default)]
    pub groups: Vec<GroupInfo>,
    #[serde(default)]
    pub drs: DrsConfigInfo,
    #[serde(default)]
    pub das: DasConfigInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_drs: Option<StorageDrsConfigInfo>,
    #[serde(default)]
    pub drs_vm_config: Vec<DrsVmConfigInfo>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ArrayUpdateOperation {
    Add,
    Edit,
    Remove,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpecEntry {
    pub operation: ArrayUpdateOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_key: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<RuleInfo>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupSpecEntry {
    pub operation: ArrayUpdateOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<GroupInfo>,
}

/// An `Add` for a VM that already has an override replaces it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DrsVmConfigSpecEntry {
    pub operation: ArrayUpdateOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_key: Option<ManagedObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<DrsVmConfigInfo>,
}

/// Incremental reconfigure spec. Unset sections are left untouched.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfigSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules_spec: Vec<RuleSpecEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_spec: Vec<GroupSpecEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drs_config: Option<DrsConfigInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub das_config: Option<DasConfigInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_drs_config: Option<StorageDrsConfigInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drs_vm_config_spec: Vec<DrsVmConfigSpecEntry>,
}

impl ClusterConfigSpec {
    pub fn is_empty(&self) -> bool {
        self.rules_spec.is_empty()
            && self.group_spec.is_empty()
            && self.drs_config.is_none()
            && self.das_config.is_none()
            && self.storage_drs_config.is_none()
            && self.drs_vm_config_spec.is_empty()
    }
}

/// Opaque handle of an asynchronous management-plane task.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TaskHandle(pub String);

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Error,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl TaskInfo {
    pub fn running() -> Self {
        Self {
            state: TaskState::Running,
            error: None,
            result: None,
        }
    }

    pub fn success() -> Self {
        Self {
            state: TaskState::Success,
            error: None,
            result: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: TaskState::Error,
            error: Some(message.into()),
            result: None,
        }
    }
}
