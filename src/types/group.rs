// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! VM and host groups referenced by vm-host rules.

use crate::types::cluster::ClusterTarget;
use crate::vsphere::ManagedObjectRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum GroupKind {
    Vm,
    Host,
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKind::Vm => f.write_str("vm"),
            GroupKind::Host => f.write_str("host"),
        }
    }
}

/// A named group of VMs or hosts. The name is the group's identity within
/// its cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterGroup {
    pub name: String,
    pub kind: GroupKind,
    pub members: Vec<ManagedObjectRef>,
}

impl ClusterGroup {
    pub fn same_members(&self, other: &ClusterGroup) -> bool {
        self.members.iter().collect::<BTreeSet<_>>() == other.members.iter().collect::<BTreeSet<_>>()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupDeclaration {
    pub target: ClusterTarget,
    pub name: String,
    pub kind: GroupKind,
    /// Managed object ids of the member VMs or hosts
    pub member_ids: Vec<String>,
}

/// Durable identity of a managed group.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupIdentity {
    pub target: ClusterTarget,
    pub name: String,
}
