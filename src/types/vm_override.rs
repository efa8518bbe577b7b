// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-VM DRS overrides. An override has no name or key of its own: the VM
//! it applies to identifies it within its cluster.

use crate::types::cluster::{ClusterTarget, DrsAutomationLevel};
use crate::vsphere::ManagedObjectRef;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrsVmOverride {
    pub vm: ManagedObjectRef,
    pub enabled: bool,
    /// `None` when the plane reports a behavior outside [`DrsAutomationLevel`]
    pub automation_level: Option<DrsAutomationLevel>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VmOverrideDeclaration {
    pub target: ClusterTarget,
    pub virtual_machine_id: String,
    pub drs_enabled: bool,
    pub automation_level: DrsAutomationLevel,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VmOverrideIdentity {
    pub target: ClusterTarget,
    pub virtual_machine_id: String,
}
