// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Submission and polling of reconfigure tasks.

use crate::constants::task;
use crate::error::{Error, Result};
use crate::types::ClusterRef;
use crate::vsphere::{ClusterConfigSpec, ManagementPlane, PlaneError, TaskHandle, TaskState};
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Outcome of a task that reached `Success`.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskReport {
    pub task: TaskHandle,
    pub result: Option<serde_json::Value>,
    /// Number of status polls it took to observe completion
    pub polls: u32,
}

/// Submits reconfigure specs and polls the resulting task to a terminal
/// state within a deadline. The underlying reconfigure is never retried.
#[derive(Clone, Debug)]
pub struct TaskDriver {
    default_timeout: Duration,
    poll_interval: Duration,
    max_poll_interval: Duration,
}

impl Default for TaskDriver {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(task::TIMEOUT_SECS),
            Duration::from_millis(task::POLL_INTERVAL_MS),
            Duration::from_millis(task::POLL_MAX_INTERVAL_MS),
        )
    }
}

impl TaskDriver {
    pub fn new(default_timeout: Duration, poll_interval: Duration, max_poll_interval: Duration) -> Self {
        Self {
            default_timeout,
            poll_interval,
            max_poll_interval: max_poll_interval.max(poll_interval),
        }
    }

    /// Submit `spec` against `cluster` and wait for the task. A rejected
    /// submission fails immediately without polling. The deadline covers
    /// the submission as well as every status poll.
    #[instrument(skip(self, plane, cluster, spec, cancel), fields(cluster = %cluster))]
    pub async fn submit(
        &self,
        plane: &dyn ManagementPlane,
        cluster: &ClusterRef,
        spec: &ClusterConfigSpec,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<TaskReport> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let deadline = self.deadline(timeout);

        let submitted = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            submitted = timeout_at(deadline, plane.reconfigure(&cluster.reference, spec)) => submitted,
        };
        let Ok(submitted) = submitted else {
            warn!("Reconfigure of {} did not answer before the deadline", cluster);
            return Err(Error::TransientRpc(format!(
                "reconfigure of {} did not answer before the deadline",
                cluster
            )));
        };
        let task = submitted.map_err(|e| match e {
            PlaneError::DuplicateName(name) => Error::name_conflict("object", cluster.path.clone(), name),
            other => Error::from(other),
        })?;
        info!("Submitted reconfigure of {} as {}", cluster, task);

        self.poll_until(plane, &task, deadline, cancel).await
    }

    /// Poll an already submitted task. Used directly to re-poll a task that
    /// timed out earlier.
    pub async fn wait(
        &self,
        plane: &dyn ManagementPlane,
        task: &TaskHandle,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<TaskReport> {
        self.poll_until(plane, task, self.deadline(timeout), cancel).await
    }

    /// Timeouts too large to represent end at the configured ceiling.
    fn deadline(&self, timeout: Option<Duration>) -> Instant {
        let now = Instant::now();
        now.checked_add(timeout.unwrap_or(self.default_timeout))
            .unwrap_or_else(|| now + Duration::from_secs(task::MAX_TIMEOUT_SECS))
    }

    async fn poll_until(
        &self,
        plane: &dyn ManagementPlane,
        task: &TaskHandle,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<TaskReport> {
        let mut interval = self.poll_interval;
        let mut polls = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if Instant::now() >= deadline {
                warn!("Task {} still running after {} polls, giving up", task, polls);
                return Err(Error::TimedOut { task: task.clone() });
            }

            polls += 1;
            let polled = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                polled = timeout_at(deadline, plane.task_info(task)) => polled,
            };
            let Ok(polled) = polled else {
                warn!("Status poll {} of task {} did not answer before the deadline", polls, task);
                return Err(Error::TimedOut { task: task.clone() });
            };
            match polled {
                Ok(info) => match info.state {
                    TaskState::Success => {
                        debug!("Task {} succeeded after {} polls", task, polls);
                        return Ok(TaskReport {
                            task: task.clone(),
                            result: info.result,
                            polls,
                        });
                    }
                    TaskState::Error => {
                        let message = info.error.unwrap_or_else(|| "unknown error".to_string());
                        warn!("Task {} failed: {}", task, message);
                        return Err(Error::TaskFailed {
                            task: task.clone(),
                            message,
                        });
                    }
                    TaskState::Queued | TaskState::Running => {
                        debug!("Task {} is {:?}", task, info.state);
                    }
                },
                Err(PlaneError::NotFound(what)) => {
                    return Err(Error::not_found(format!("task {} ({})", task, what)));
                }
                Err(e) => {
                    warn!("Error polling task {}: {}, retrying", task, e);
                }
            }

            let nap = interval.min(deadline.saturating_duration_since(Instant::now()));
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = sleep(nap) => {}
            }

            // Exponential backoff with max cap
            interval = (interval * 2).min(self.max_poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vsphere::{
        ClusterConfigInfo, InventoryObject, ManagedObjectRef, MockManagementPlane, ObjectKind, PathQuery,
        TaskInfo,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn make_cluster() -> ClusterRef {
        ClusterRef {
            reference: ManagedObjectRef::new(ObjectKind::ClusterComputeResource, "domain-c7"),
            name: "prod".to_string(),
            path: "/dc1/host/prod".to_string(),
            datacenter: Some("dc1".to_string()),
        }
    }

    fn make_driver() -> TaskDriver {
        TaskDriver::new(
            Duration::from_secs(5),
            Duration::from_millis(1),
            Duration::from_millis(4),
        )
    }

    /// A plane whose calls never answer.
    struct UnresponsivePlane {
        accepts_submissions: bool,
    }

    #[async_trait]
    impl ManagementPlane for UnresponsivePlane {
        async fn find_by_id(&self, _: ObjectKind, _: &str) -> std::result::Result<Option<InventoryObject>, PlaneError> {
            std::future::pending().await
        }

        async fn find_by_path(&self, _: &PathQuery) -> std::result::Result<Vec<InventoryObject>, PlaneError> {
            std::future::pending().await
        }

        async fn get_cluster_config(
            &self,
            _: &ManagedObjectRef,
        ) -> std::result::Result<ClusterConfigInfo, PlaneError> {
            std::future::pending().await
        }

        async fn reconfigure(
            &self,
            _: &ManagedObjectRef,
            _: &ClusterConfigSpec,
        ) -> std::result::Result<TaskHandle, PlaneError> {
            if self.accepts_submissions {
                Ok(TaskHandle("task-1".to_string()))
            } else {
                std::future::pending().await
            }
        }

        async fn task_info(&self, _: &TaskHandle) -> std::result::Result<TaskInfo, PlaneError> {
            std::future::pending().await
        }
    }

    fn submitting_plane() -> MockManagementPlane {
        let mut plane = MockManagementPlane::new();
        plane
            .expect_reconfigure()
            .times(1)
            .returning(|_, _| Ok(TaskHandle("task-1".to_string())));
        plane
    }

    #[tokio::test]
    async fn test_polls_until_success() {
        let mut plane = submitting_plane();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        plane.expect_task_info().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(TaskInfo::running())
            } else {
                Ok(TaskInfo::success())
            }
        });

        let report = make_driver()
            .submit(&plane, &make_cluster(), &ClusterConfigSpec::default(), None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.task, TaskHandle("task-1".to_string()));
        assert_eq!(report.polls, 3);
    }

    #[tokio::test]
    async fn test_zero_deadline_times_out_without_polling() {
        let mut plane = submitting_plane();
        plane.expect_task_info().times(0);

        let result = make_driver()
            .submit(
                &plane,
                &make_cluster(),
                &ClusterConfigSpec::default(),
                Some(Duration::ZERO),
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(Error::TimedOut { ref task }) if task.0 == "task-1"));
    }

    #[tokio::test]
    async fn test_rejected_spec_is_not_polled() {
        let mut plane = MockManagementPlane::new();
        plane
            .expect_reconfigure()
            .times(1)
            .returning(|_, _| Err(PlaneError::InvalidArgument("missing rule name".to_string())));
        plane.expect_task_info().times(0);

        let result = make_driver()
            .submit(&plane, &make_cluster(), &ClusterConfigSpec::default(), None, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::RejectedSpec(_))));
    }

    #[tokio::test]
    async fn test_duplicate_name_is_a_conflict() {
        let mut plane = MockManagementPlane::new();
        plane
            .expect_reconfigure()
            .returning(|_, _| Err(PlaneError::DuplicateName("web".to_string())));

        let result = make_driver()
            .submit(&plane, &make_cluster(), &ClusterConfigSpec::default(), None, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::NameConflict { ref cluster, .. }) if cluster == "/dc1/host/prod"));
    }

    #[tokio::test]
    async fn test_task_failure_is_reported() {
        let mut plane = submitting_plane();
        plane
            .expect_task_info()
            .returning(|_| Ok(TaskInfo::failed("host in maintenance mode")));

        let result = make_driver()
            .submit(&plane, &make_cluster(), &ClusterConfigSpec::default(), None, &CancellationToken::new())
            .await;

        match result {
            Err(Error::TaskFailed { task, message }) => {
                assert_eq!(task.0, "task-1");
                assert_eq!(message, "host in maintenance mode");
            }
            other => panic!("expected TaskFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transient_poll_errors_are_tolerated() {
        let mut plane = submitting_plane();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        plane.expect_task_info().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(PlaneError::Transport("connection reset".to_string()))
            } else {
                Ok(TaskInfo::success())
            }
        });

        let report = make_driver()
            .submit(&plane, &make_cluster(), &ClusterConfigSpec::default(), None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.polls, 2);
    }

    #[tokio::test]
    async fn test_deadline_expires_while_running() {
        let mut plane = submitting_plane();
        plane.expect_task_info().returning(|_| Ok(TaskInfo::running()));

        let result = make_driver()
            .submit(
                &plane,
                &make_cluster(),
                &ClusterConfigSpec::default(),
                Some(Duration::from_millis(20)),
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(Error::TimedOut { .. })));
    }

    #[tokio::test]
    async fn test_cancellation_stops_polling() {
        let mut plane = submitting_plane();
        plane.expect_task_info().returning(|_| Ok(TaskInfo::running()));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let driver = TaskDriver::new(
            Duration::from_secs(60),
            Duration::from_millis(10),
            Duration::from_secs(1),
        );

        tokio::spawn(async move {
            sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });
        let started = std::time::Instant::now();
        let result = driver
            .submit(&plane, &make_cluster(), &ClusterConfigSpec::default(), None, &cancel)
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancelled_before_submit() {
        let mut plane = MockManagementPlane::new();
        plane.expect_reconfigure().times(0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = make_driver()
            .submit(&plane, &make_cluster(), &ClusterConfigSpec::default(), None, &cancel)
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_unanswered_status_poll_times_out() {
        let plane = UnresponsivePlane {
            accepts_submissions: true,
        };

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            make_driver().submit(
                &plane,
                &make_cluster(),
                &ClusterConfigSpec::default(),
                Some(Duration::from_millis(50)),
                &CancellationToken::new(),
            ),
        )
        .await
        .expect("driver must honour its own deadline");

        assert!(matches!(result, Err(Error::TimedOut { ref task }) if task.0 == "task-1"));
    }

    #[tokio::test]
    async fn test_unanswered_submission_is_transient() {
        let plane = UnresponsivePlane {
            accepts_submissions: false,
        };

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            make_driver().submit(
                &plane,
                &make_cluster(),
                &ClusterConfigSpec::default(),
                Some(Duration::from_millis(50)),
                &CancellationToken::new(),
            ),
        )
        .await
        .expect("driver must honour its own deadline");

        assert!(matches!(result, Err(Error::TransientRpc(_))));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_unanswered_poll() {
        let plane = UnresponsivePlane {
            accepts_submissions: true,
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            make_driver().submit(&plane, &make_cluster(), &ClusterConfigSpec::default(), None, &cancel),
        )
        .await
        .expect("cancellation must interrupt the poll");

        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_unrepresentable_timeout_does_not_overflow() {
        let mut plane = submitting_plane();
        plane.expect_task_info().returning(|_| Ok(TaskInfo::success()));

        let report = make_driver()
            .submit(
                &plane,
                &make_cluster(),
                &ClusterConfigSpec::default(),
                Some(Duration::MAX),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.polls, 1);
    }
}
