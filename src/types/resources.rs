// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resources declaring rules, groups, DRS overrides and cluster
//! settings.

use crate::types::cluster::{
    ClusterTarget, ConfigDeclaration, DrsAutomationLevel, DrsSettings, HaSettings, StorageDrsSettings,
};
use crate::types::group::{GroupDeclaration, GroupKind};
use crate::types::phase::{EntityPhase, Ownership};
use crate::types::rule::{RuleDeclaration, RuleKey, RuleKind};
use crate::types::vm_override::{VmOverrideDeclaration, VmOverrideIdentity};
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

fn default_override_level() -> DrsAutomationLevel {
    DrsAutomationLevel::Manual
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[kube(
    group = "clusterkeeper.io",
    version = "v1alpha1",
    kind = "ComputeClusterRule",
    shortname = "ccrule"
)]
#[kube(namespaced)]
#[kube(status = "EntityStatus")]
#[kube(printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#)]
#[kube(printcolumn = r#"{"name":"Key","type":"integer","jsonPath":".status.key"}"#)]
#[serde(rename_all = "camelCase")]
pub struct ComputeClusterRuleSpec {
    /// Datacenter scoping a relative cluster path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
    /// Cluster id (`domain-c7`) or inventory path
    pub cluster: String,
    /// Rule name in the cluster, defaults to the resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub rule_type: RuleKind,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub virtual_machine_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_group_name: Option<String>,
}

impl ComputeClusterRule {
    pub fn rule_name(&self) -> String {
        self.spec.name.clone().unwrap_or_else(|| self.name_any())
    }

    pub fn target(&self, default_datacenter: Option<&str>) -> ClusterTarget {
        ClusterTarget::new(
            self.spec.datacenter.as_deref().or(default_datacenter),
            &self.spec.cluster,
        )
    }

    pub fn declaration(&self, default_datacenter: Option<&str>) -> RuleDeclaration {
        RuleDeclaration {
            target: self.target(default_datacenter),
            name: self.rule_name(),
            kind: self.spec.rule_type,
            mandatory: self.spec.mandatory,
            enabled: self.spec.enabled,
            virtual_machine_ids: self.spec.virtual_machine_ids.clone(),
            vm_group_name: self.spec.vm_group_name.clone(),
            host_group_name: self.spec.host_group_name.clone(),
        }
    }

    /// Key assigned by the management plane, once known
    pub fn key(&self) -> Option<RuleKey> {
        self.status.as_ref().and_then(|s| s.key).map(RuleKey)
    }
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[kube(
    group = "clusterkeeper.io",
    version = "v1alpha1",
    kind = "ComputeClusterGroup",
    shortname = "ccgroup"
)]
#[kube(namespaced)]
#[kube(status = "EntityStatus")]
#[kube(printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#)]
#[serde(rename_all = "camelCase")]
pub struct ComputeClusterGroupSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
    pub cluster: String,
    /// Group name in the cluster, defaults to the resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub group_type: GroupKind,
    /// Managed object ids of the member VMs or hosts
    #[serde(default)]
    pub member_ids: Vec<String>,
}

impl ComputeClusterGroup {
    pub fn group_name(&self) -> String {
        self.spec.name.clone().unwrap_or_else(|| self.name_any())
    }

    pub fn target(&self, default_datacenter: Option<&str>) -> ClusterTarget {
        ClusterTarget::new(
            self.spec.datacenter.as_deref().or(default_datacenter),
            &self.spec.cluster,
        )
    }

    pub fn declaration(&self, default_datacenter: Option<&str>) -> GroupDeclaration {
        GroupDeclaration {
            target: self.target(default_datacenter),
            name: self.group_name(),
            kind: self.spec.group_type,
            member_ids: self.spec.member_ids.clone(),
        }
    }
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[kube(
    group = "clusterkeeper.io",
    version = "v1alpha1",
    kind = "ComputeClusterVmOverride",
    shortname = "ccvmoverride"
)]
#[kube(namespaced)]
#[kube(status = "EntityStatus")]
#[kube(printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#)]
#[kube(printcolumn = r#"{"name":"VM","type":"string","jsonPath":".spec.virtualMachineId"}"#)]
#[serde(rename_all = "camelCase")]
pub struct ComputeClusterVmOverrideSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
    pub cluster: String,
    /// Managed object id of the VM the override applies to
    pub virtual_machine_id: String,
    /// Whether DRS acts on the VM at all
    #[serde(default)]
    pub drs_enabled: bool,
    #[serde(default = "default_override_level")]
    pub automation_level: DrsAutomationLevel,
}

impl ComputeClusterVmOverride {
    pub fn target(&self, default_datacenter: Option<&str>) -> ClusterTarget {
        ClusterTarget::new(
            self.spec.datacenter.as_deref().or(default_datacenter),
            &self.spec.cluster,
        )
    }

    pub fn declaration(&self, default_datacenter: Option<&str>) -> VmOverrideDeclaration {
        VmOverrideDeclaration {
            target: self.target(default_datacenter),
            virtual_machine_id: self.spec.virtual_machine_id.clone(),
            drs_enabled: self.spec.drs_enabled,
            automation_level: self.spec.automation_level,
        }
    }

    pub fn identity(&self, default_datacenter: Option<&str>) -> VmOverrideIdentity {
        VmOverrideIdentity {
            target: self.target(default_datacenter),
            virtual_machine_id: self.spec.virtual_machine_id.clone(),
        }
    }
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[kube(
    group = "clusterkeeper.io",
    version = "v1alpha1",
    kind = "ComputeClusterConfig",
    shortname = "ccconfig"
)]
#[kube(namespaced)]
#[kube(status = "EntityStatus")]
#[kube(printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#)]
#[serde(rename_all = "camelCase")]
pub struct ComputeClusterConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
    pub cluster: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drs: Option<DrsSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ha: Option<HaSettings>,
    /// Datastore cluster id or path that `storageDrs` applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datastore_cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_drs: Option<StorageDrsSettings>,
}

impl ComputeClusterConfig {
    pub fn declaration(&self, default_datacenter: Option<&str>) -> ConfigDeclaration {
        ConfigDeclaration {
            target: ClusterTarget::new(
                self.spec.datacenter.as_deref().or(default_datacenter),
                &self.spec.cluster,
            ),
            drs: self.spec.drs.clone(),
            ha: self.spec.ha.clone(),
            datastore_cluster: self.spec.datastore_cluster.clone(),
            storage_drs: self.spec.storage_drs.clone(),
        }
    }
}

/// Status shared by all clusterkeeper resources.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityStatus {
    /// Rule key assigned by the management plane (rules only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<i32>,
    #[serde(default)]
    pub phase: EntityPhase,
    /// Set once this operator submitted a create for the entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership: Option<Ownership>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl EntityStatus {
    /// Check if the entity is ready based on its status conditions
    pub fn is_ready(&self) -> bool {
        self.conditions.as_ref().is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.condition_type == "Ready" && c.status == "True")
        })
    }

    /// Status for `phase`, with a Ready condition derived from it.
    pub fn with_phase(
        phase: EntityPhase,
        key: Option<RuleKey>,
        message: Option<String>,
        generation: Option<i64>,
    ) -> Self {
        let ready = phase == EntityPhase::Managed;
        Self {
            key: key.map(|k| k.0),
            phase,
            ownership: None,
            conditions: Some(vec![Condition {
                condition_type: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                reason: Some(phase.to_string()),
                message: message.clone(),
            }]),
            message,
            observed_generation: generation,
        }
    }

    pub fn with_ownership(mut self, ownership: Option<Ownership>) -> Self {
        self.ownership = ownership;
        self
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
