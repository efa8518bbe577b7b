// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle phase of a managed entity, and whether this operator owns it.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub enum EntityPhase {
    #[default]
    Unmanaged,
    Creating,
    Managed,
    Updating,
    Deleting,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseEvent {
    CreateStarted,
    CreateSucceeded,
    UpdateStarted,
    UpdateSucceeded,
    DeleteStarted,
    DeleteSucceeded,
    /// The entity no longer exists on the management plane.
    Gone,
    Failed,
}

/// How far this operator got in creating an entity. Entities without an
/// ownership record were never submitted by this operator and must not be
/// adopted, updated or deleted.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub enum Ownership {
    /// A create reached the management plane but was not confirmed.
    Submitted,
    /// The create was confirmed.
    Owned,
}

impl EntityPhase {
    /// Next phase after `event`, or `None` if the event is not valid in
    /// this phase.
    pub fn on(self, event: PhaseEvent) -> Option<EntityPhase> {
        use EntityPhase::*;
        use PhaseEvent::*;

        match (self, event) {
            (_, Failed) => Some(Error),
            (Deleting, Gone) | (Deleting, DeleteSucceeded) => Some(Unmanaged),
            (_, Gone) => Some(Unmanaged),
            (_, DeleteStarted) => Some(Deleting),
            (Unmanaged | Error, CreateStarted) => Some(Creating),
            (Creating, CreateSucceeded) => Some(Managed),
            (Managed | Error, UpdateStarted) => Some(Updating),
            (Updating | Managed | Error, UpdateSucceeded) => Some(Managed),
            _ => None,
        }
    }
}

impl fmt::Display for EntityPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_lifecycle() {
        let phase = EntityPhase::Unmanaged;
        let phase = phase.on(PhaseEvent::CreateStarted).unwrap();
        assert_eq!(phase, EntityPhase::Creating);
        let phase = phase.on(PhaseEvent::CreateSucceeded).unwrap();
        assert_eq!(phase, EntityPhase::Managed);
        let phase = phase.on(PhaseEvent::UpdateStarted).unwrap();
        assert_eq!(phase, EntityPhase::Updating);
        let phase = phase.on(PhaseEvent::UpdateSucceeded).unwrap();
        assert_eq!(phase, EntityPhase::Managed);
        let phase = phase.on(PhaseEvent::DeleteStarted).unwrap();
        assert_eq!(phase, EntityPhase::Deleting);
        let phase = phase.on(PhaseEvent::DeleteSucceeded).unwrap();
        assert_eq!(phase, EntityPhase::Unmanaged);
    }

    #[test]
    fn test_failures_and_recovery() {
        assert_eq!(
            EntityPhase::Updating.on(PhaseEvent::Failed),
            Some(EntityPhase::Error)
        );
        assert_eq!(
            EntityPhase::Error.on(PhaseEvent::UpdateStarted),
            Some(EntityPhase::Updating)
        );
        assert_eq!(
            EntityPhase::Error.on(PhaseEvent::CreateStarted),
            Some(EntityPhase::Creating)
        );
    }

    #[test]
    fn test_invalid_transitions() {
        assert_eq!(EntityPhase::Managed.on(PhaseEvent::CreateStarted), None);
        assert_eq!(EntityPhase::Unmanaged.on(PhaseEvent::UpdateStarted), None);
        assert_eq!(EntityPhase::Creating.on(PhaseEvent::UpdateSucceeded), None);
    }

    #[test]
    fn test_gone_returns_to_unmanaged() {
        assert_eq!(
            EntityPhase::Managed.on(PhaseEvent::Gone),
            Some(EntityPhase::Unmanaged)
        );
    }
}
