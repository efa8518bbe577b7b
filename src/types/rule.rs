// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster placement rules.

use crate::types::cluster::ClusterTarget;
use crate::vsphere::ManagedObjectRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier the management plane assigns to a rule on creation.
///
/// Small integers (including zero) are valid keys, so an unknown key is
/// always `Option::None`, never a sentinel value.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RuleKey(pub i32);

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    Affinity,
    AntiAffinity,
    VmHostAffine,
    VmHostAntiAffine,
}

impl RuleKind {
    /// Whether this kind refers to VM/host groups instead of individual VMs.
    pub fn uses_groups(&self) -> bool {
        matches!(self, RuleKind::VmHostAffine | RuleKind::VmHostAntiAffine)
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleKind::Affinity => "affinity",
            RuleKind::AntiAffinity => "anti-affinity",
            RuleKind::VmHostAffine => "vm-host-affine",
            RuleKind::VmHostAntiAffine => "vm-host-anti-affine",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleMembers {
    /// Ordered, duplicate-free list of virtual machines.
    Vms(Vec<ManagedObjectRef>),
    Groups { vm_group: String, host_group: String },
}

impl RuleMembers {
    /// Build a VM member list, dropping repeated entries but keeping the
    /// first-seen order.
    pub fn vms(vms: impl IntoIterator<Item = ManagedObjectRef>) -> Self {
        let mut seen = BTreeSet::new();
        RuleMembers::Vms(vms.into_iter().filter(|vm| seen.insert(vm.clone())).collect())
    }

    /// Membership equality, ignoring VM order.
    pub fn same_as(&self, other: &RuleMembers) -> bool {
        match (self, other) {
            (RuleMembers::Vms(a), RuleMembers::Vms(b)) => {
                a.iter().collect::<BTreeSet<_>>() == b.iter().collect::<BTreeSet<_>>()
            }
            _ => self == other,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleSpec {
    pub key: Option<RuleKey>,
    pub name: String,
    pub kind: RuleKind,
    pub mandatory: bool,
    pub enabled: bool,
    pub members: RuleMembers,
}

impl RuleSpec {
    /// Same rule content, ignoring the key.
    pub fn matches(&self, other: &RuleSpec) -> bool {
        self.name == other.name
            && self.kind == other.kind
            && self.mandatory == other.mandatory
            && self.enabled == other.enabled
            && self.members.same_as(&other.members)
    }
}

/// Field-level update of an existing rule. `None` leaves the live value
/// untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RulePatch {
    pub enabled: Option<bool>,
    pub mandatory: Option<bool>,
    pub members: Option<RuleMembers>,
}

impl RulePatch {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.mandatory.is_none() && self.members.is_none()
    }
}

/// Declared rule as supplied by the caller, before validation.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleDeclaration {
    pub target: ClusterTarget,
    pub name: String,
    pub kind: RuleKind,
    pub mandatory: bool,
    pub enabled: bool,
    pub virtual_machine_ids: Vec<String>,
    pub vm_group_name: Option<String>,
    pub host_group_name: Option<String>,
}

/// Durable identity of a managed rule.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleIdentity {
    pub target: ClusterTarget,
    pub name: String,
    pub key: Option<RuleKey>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm(id: &str) -> ManagedObjectRef {
        ManagedObjectRef::virtual_machine(id)
    }

    #[test]
    fn test_rule_kind_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&RuleKind::VmHostAntiAffine).unwrap(),
            "\"vm-host-anti-affine\""
        );
        let kind: RuleKind = serde_json::from_str("\"anti-affinity\"").unwrap();
        assert_eq!(kind, RuleKind::AntiAffinity);
    }

    #[test]
    fn test_vms_drops_duplicates_keeping_order() {
        let members = RuleMembers::vms(vec![vm("vm-2"), vm("vm-1"), vm("vm-2")]);
        assert_eq!(members, RuleMembers::Vms(vec![vm("vm-2"), vm("vm-1")]));
    }

    #[test]
    fn test_same_as_ignores_order() {
        let a = RuleMembers::vms(vec![vm("vm-1"), vm("vm-2")]);
        let b = RuleMembers::vms(vec![vm("vm-2"), vm("vm-1")]);
        let c = RuleMembers::vms(vec![vm("vm-1")]);
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
    }

    #[test]
    fn test_key_zero_is_a_real_key() {
        let spec_key: Option<RuleKey> = Some(RuleKey(0));
        assert!(spec_key.is_some());
        assert_eq!(serde_json::to_string(&RuleKey(0)).unwrap(), "0");
    }
}
