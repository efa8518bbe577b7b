// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes reconcilers that drive the engine from watch events.

pub mod config;
pub mod group;
pub mod rule;
pub mod vm_override;

pub use config::ConfigReconciler;
pub use group::GroupReconciler;
pub use rule::RuleReconciler;
pub use vm_override::VmOverrideReconciler;

use crate::constants::requeue::{DRIFT_SECS, FATAL_SECS, RETRY_SECS};
use crate::error::Error;
use crate::types::phase::{EntityPhase, PhaseEvent};
use kube::runtime::controller::Action;
use std::time::Duration;
use tracing::warn;

/// Requeue after a failed reconcile: soon for failures that may clear up by
/// themselves, late for those that need a change to the resource.
pub fn requeue_after(error: &Error) -> Action {
    if error.is_retryable() {
        Action::requeue(Duration::from_secs(RETRY_SECS))
    } else {
        Action::requeue(Duration::from_secs(FATAL_SECS))
    }
}

/// Requeue of a managed entity, to notice drift.
pub fn requeue_for_drift() -> Action {
    Action::requeue(Duration::from_secs(DRIFT_SECS))
}

/// Phase after `event`. An event that is not valid in `current` leaves the
/// phase alone.
pub fn advance(current: EntityPhase, event: PhaseEvent) -> EntityPhase {
    current.on(event).unwrap_or_else(|| {
        warn!("Ignoring {:?} in phase {}", event, current);
        current
    })
}

/// Phase while a create is in flight. An interrupted create stays in
/// `Creating` rather than passing through `CreateStarted` again.
pub fn creating_phase(current: EntityPhase) -> EntityPhase {
    match current {
        EntityPhase::Creating => current,
        _ => advance(current, PhaseEvent::CreateStarted),
    }
}
