// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Domain types and custom resources.

pub mod cluster;
pub mod group;
pub mod phase;
pub mod resources;
pub mod rule;
pub mod vm_override;

pub use cluster::{ClusterConfigDelta, ClusterRef, ClusterTarget};
pub use group::{ClusterGroup, GroupKind};
pub use phase::{EntityPhase, Ownership, PhaseEvent};
pub use rule::{RuleKey, RuleKind, RuleMembers, RulePatch, RuleSpec};
pub use vm_override::DrsVmOverride;
