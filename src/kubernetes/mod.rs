// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for CRD discovery and status updates.

pub mod crd;
pub mod status;

pub use crd::wait_for_crds;
pub use status::{set_status, HasStatus};
