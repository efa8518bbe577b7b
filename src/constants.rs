// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// The operator name used for server-side apply
pub const OPERATOR_NAME: &str = "clusterkeeper";

/// API group of the custom resources served by this operator
pub const API_GROUP: &str = "clusterkeeper.io";

/// Finalizers guarding management-plane objects
pub mod finalizers {
    pub const RULE: &str = "clusterkeeper.io/rule";
    pub const GROUP: &str = "clusterkeeper.io/group";
    pub const VM_OVERRIDE: &str = "clusterkeeper.io/vm-override";
}

/// Requeue intervals for the reconcilers
pub mod requeue {
    /// Periodic re-read of managed entities to detect drift
    pub const DRIFT_SECS: u64 = 300;
    /// Retryable failures (conflicts, timeouts, transport)
    pub const RETRY_SECS: u64 = 30;
    /// Failures that need a change to the declared state
    pub const FATAL_SECS: u64 = 300;
}

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

/// Reconfigure task polling defaults
pub mod task {
    pub const TIMEOUT_SECS: u64 = 300;
    /// Upper bound for any configured or requested task timeout
    pub const MAX_TIMEOUT_SECS: u64 = 86_400;
    pub const POLL_INTERVAL_MS: u64 = 500;
    pub const POLL_MAX_INTERVAL_MS: u64 = 5000;
}

/// HTTP gateway client defaults
pub mod gateway {
    /// Per-request timeout, covering connect, send and body read
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
}
