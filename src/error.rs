// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::vsphere::{PlaneError, TaskHandle};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("'{name}' is ambiguous, it matches {}", .matches.join(", "))]
    Ambiguous { name: String, matches: Vec<String> },

    #[error("Invalid spec: {0}")]
    InvalidSpec(String),

    #[error("A {kind} named '{name}' already exists in cluster {cluster}")]
    NameConflict {
        kind: &'static str,
        cluster: String,
        name: String,
    },

    #[error("Reconfigure rejected: {0}")]
    RejectedSpec(String),

    #[error("Task {task} did not complete before the deadline")]
    TimedOut { task: TaskHandle },

    #[error("Task {task} failed: {message}")]
    TaskFailed { task: TaskHandle, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Management plane unavailable: {0}")]
    TransientRpc(String),

    #[error("Cluster has not converged: {0}")]
    NotConverged(String),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Finalizer error: {0}")]
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<Error>>),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound { what: what.into() }
    }

    /// `kind` names the entity, e.g. "rule" or "group".
    pub fn name_conflict(kind: &'static str, cluster: impl Into<String>, name: impl Into<String>) -> Self {
        Error::NameConflict {
            kind,
            cluster: cluster.into(),
            name: name.into(),
        }
    }

    /// Whether re-running the whole read-diff-submit cycle may succeed
    /// without a change to the declared state.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::NotFound { .. }
            | Error::NameConflict { .. }
            | Error::TimedOut { .. }
            | Error::TransientRpc(_)
            | Error::NotConverged(_)
            | Error::Cancelled
            | Error::Kube(_) => true,
            Error::Finalizer(inner) => match inner.as_ref() {
                kube::runtime::finalizer::Error::ApplyFailed(e)
                | kube::runtime::finalizer::Error::CleanupFailed(e) => e.is_retryable(),
                _ => true,
            },
            Error::Ambiguous { .. }
            | Error::InvalidSpec(_)
            | Error::RejectedSpec(_)
            | Error::TaskFailed { .. }
            | Error::Serialization(_) => false,
        }
    }
}

impl From<PlaneError> for Error {
    fn from(err: PlaneError) -> Self {
        match err {
            PlaneError::NotFound(what) => Error::NotFound { what },
            PlaneError::InvalidArgument(msg) => Error::RejectedSpec(msg),
            PlaneError::DuplicateName(name) => {
                Error::name_conflict("object", "(reported by management plane)", name)
            }
            PlaneError::Transport(msg) => Error::TransientRpc(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
