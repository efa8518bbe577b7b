// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster addressing and cluster-wide DRS/HA/SDRS settings.

use crate::vsphere::{InventoryObject, ManagedObjectRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unresolved cluster address as declared by the user: an opaque id
/// (`domain-c7`), an absolute path, or a path relative to the datacenter.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
    pub cluster: String,
}

impl ClusterTarget {
    pub fn new(datacenter: Option<&str>, cluster: &str) -> Self {
        Self {
            datacenter: datacenter.map(str::to_string),
            cluster: cluster.to_string(),
        }
    }
}

impl fmt::Display for ClusterTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.datacenter {
            Some(dc) if !self.cluster.starts_with('/') => write!(f, "{}:{}", dc, self.cluster),
            _ => f.write_str(&self.cluster),
        }
    }
}

/// A resolved cluster. Looked up fresh for every operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterRef {
    pub reference: ManagedObjectRef,
    pub name: String,
    pub path: String,
    pub datacenter: Option<String>,
}

impl From<InventoryObject> for ClusterRef {
    fn from(object: InventoryObject) -> Self {
        Self {
            reference: object.reference,
            name: object.name,
            path: object.path,
            datacenter: object.datacenter,
        }
    }
}

impl fmt::Display for ClusterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path, self.reference.value)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum DrsAutomationLevel {
    Manual,
    PartiallyAutomated,
    FullyAutomated,
}

impl DrsAutomationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrsAutomationLevel::Manual => "manual",
            DrsAutomationLevel::PartiallyAutomated => "partiallyAutomated",
            DrsAutomationLevel::FullyAutomated => "fullyAutomated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "manual" => Some(DrsAutomationLevel::Manual),
            "partiallyAutomated" => Some(DrsAutomationLevel::PartiallyAutomated),
            "fullyAutomated" => Some(DrsAutomationLevel::FullyAutomated),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum SdrsAutomationLevel {
    Manual,
    Automated,
}

impl SdrsAutomationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdrsAutomationLevel::Manual => "manual",
            SdrsAutomationLevel::Automated => "automated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "manual" => Some(SdrsAutomationLevel::Manual),
            "automated" => Some(SdrsAutomationLevel::Automated),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DrsSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation_level: Option<DrsAutomationLevel>,
    /// 1 (tolerate most imbalance) to 5 (tolerate least)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_threshold: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_overrides_enabled: Option<bool>,
}

impl DrsSettings {
    pub fn is_empty(&self) -> bool {
        *self == DrsSettings::default()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HaSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_monitoring: Option<bool>,
}

impl HaSettings {
    pub fn is_empty(&self) -> bool {
        *self == HaSettings::default()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageDrsSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation_level: Option<SdrsAutomationLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_threshold_percent: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io_latency_threshold_ms: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io_load_balance_enabled: Option<bool>,
}

impl StorageDrsSettings {
    pub fn is_empty(&self) -> bool {
        *self == StorageDrsSettings::default()
    }
}

/// Sparse cluster settings. `None` means "leave the live value alone",
/// never "reset to default".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterConfigDelta {
    pub drs: DrsSettings,
    pub ha: HaSettings,
    pub storage_drs: StorageDrsSettings,
}

impl ClusterConfigDelta {
    pub fn is_empty(&self) -> bool {
        self.drs.is_empty() && self.ha.is_empty() && self.storage_drs.is_empty()
    }
}

/// Declared cluster settings before validation.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigDeclaration {
    pub target: ClusterTarget,
    pub drs: Option<DrsSettings>,
    pub ha: Option<HaSettings>,
    /// Datastore cluster (id or path, scoped like `target`) that
    /// `storage_drs` applies to
    pub datastore_cluster: Option<String>,
    pub storage_drs: Option<StorageDrsSettings>,
}
