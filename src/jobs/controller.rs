use std::fmt;

use k8s_openapi::api::batch::v1::JobStatus;
use serde::Serialize;

use super::template::{JobSpec, JobTemplateBuilder};
use crate::cluster::{ClusterSession, ControlPlane};
use crate::error::{KubecycleError, ResourceKind, ResourceRef, Result, Verb};

/// Completion state of a submitted job, derived from its status counters.
///
/// Running → Succeeded | Failed. Both terminal states are sticky on the
/// control plane; this type only reflects what the last read saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobState {
    Running,
    Succeeded { succeeded: i32 },
    Failed { failed: i32 },
}

impl JobState {
    /// Failed wins when both counters are nonzero.
    pub fn from_status(status: Option<&JobStatus>) -> Self {
        let succeeded = status.and_then(|s| s.succeeded).unwrap_or(0);
        let failed = status.and_then(|s| s.failed).unwrap_or(0);

        if failed > 0 {
            JobState::Failed { failed }
        } else if succeeded > 0 {
            JobState::Succeeded { succeeded }
        } else {
            JobState::Running
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Running => write!(f, "RUNNING"),
            JobState::Succeeded { .. } => write!(f, "SUCCEEDED"),
            JobState::Failed { .. } => write!(f, "FAILED"),
        }
    }
}

/// Submits jobs and answers single-shot completion queries.
///
/// No call sleeps or retries; waiting is up to the caller.
pub struct JobController<'a, P> {
    session: &'a ClusterSession<P>,
}

impl<'a, P: ControlPlane> JobController<'a, P> {
    pub fn new(session: &'a ClusterSession<P>) -> Self {
        Self { session }
    }

    pub async fn submit(&self, spec: &JobSpec) -> Result<()> {
        self.session
            .control_plane()
            .create_job(spec.namespace(), &spec.to_job())
            .await
            .map_err(|e| {
                KubecycleError::from_kube(
                    e,
                    ResourceRef::new(Verb::Create, ResourceKind::Job, spec.namespace(), spec.name()),
                )
            })?;

        tracing::info!(
            job = %spec.name(),
            namespace = %spec.namespace(),
            environment = %self.session.environment(),
            "Job submitted"
        );
        Ok(())
    }

    /// Projects the named CronJob into a fresh job and submits it, returning
    /// the generated job name.
    pub async fn trigger_from_schedule(&self, cron_job: &str, namespace: &str) -> Result<String> {
        let spec = JobTemplateBuilder::new(self.session)
            .from_schedule(cron_job, namespace)
            .await?;
        self.submit(&spec).await?;
        Ok(spec.name().to_string())
    }

    /// Reads the job once and reports its state.
    pub async fn poll_completion(&self, name: &str, namespace: &str) -> Result<JobState> {
        let job = self
            .session
            .control_plane()
            .get_job(namespace, name)
            .await
            .map_err(|e| {
                KubecycleError::from_kube(
                    e,
                    ResourceRef::new(Verb::Get, ResourceKind::Job, namespace, name),
                )
            })?;

        let state = JobState::from_status(job.status.as_ref());
        tracing::debug!(job = %name, namespace = %namespace, state = %state, "Polled job");
        Ok(state)
    }

    /// `Ok(true)` once succeeded, `Ok(false)` while running, and
    /// [`JobFailed`](KubecycleError::JobFailed) once failed.
    pub async fn is_completed(&self, name: &str, namespace: &str) -> Result<bool> {
        match self.poll_completion(name, namespace).await? {
            JobState::Running => Ok(false),
            JobState::Succeeded { .. } => Ok(true),
            JobState::Failed { failed } => Err(KubecycleError::JobFailed {
                name: name.to_string(),
                namespace: namespace.to_string(),
                failed,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::{FakeControlPlane, sample_cron_job};
    use crate::jobs::template::DirectJob;
    use k8s_openapi::api::batch::v1::Job;

    async fn session(plane: FakeControlPlane) -> ClusterSession<FakeControlPlane> {
        ClusterSession::establish("test", plane).await.unwrap()
    }

    fn spec(name: &str) -> JobSpec {
        DirectJob {
            name: name.into(),
            namespace: "batch".into(),
            image: "busybox:1.36".into(),
            command: vec!["true".into()],
            ..Default::default()
        }
        .build()
    }

    fn status(succeeded: Option<i32>, failed: Option<i32>) -> JobStatus {
        JobStatus {
            succeeded,
            failed,
            ..Default::default()
        }
    }

    #[test]
    fn absent_status_is_running() {
        assert_eq!(JobState::from_status(None), JobState::Running);
        assert_eq!(
            JobState::from_status(Some(&status(Some(0), Some(0)))),
            JobState::Running
        );
    }

    #[test]
    fn succeeded_counter_means_succeeded() {
        assert_eq!(
            JobState::from_status(Some(&status(Some(1), None))),
            JobState::Succeeded { succeeded: 1 }
        );
    }

    #[test]
    fn failed_wins_tie_break() {
        let state = JobState::from_status(Some(&status(Some(1), Some(1))));
        assert_eq!(state, JobState::Failed { failed: 1 });
        assert!(state.is_terminal());
    }

    #[test]
    fn state_display() {
        assert_eq!(JobState::Running.to_string(), "RUNNING");
        assert_eq!(JobState::Succeeded { succeeded: 2 }.to_string(), "SUCCEEDED");
        assert_eq!(JobState::Failed { failed: 1 }.to_string(), "FAILED");
    }

    #[tokio::test]
    async fn submit_then_poll_is_running() {
        let session = session(FakeControlPlane::new()).await;
        let controller = JobController::new(&session);

        controller.submit(&spec("migrate")).await.unwrap();
        let state = controller.poll_completion("migrate", "batch").await.unwrap();
        assert_eq!(state, JobState::Running);
    }

    #[tokio::test]
    async fn repeated_polls_of_unchanged_job_agree() {
        let session = session(FakeControlPlane::new()).await;
        let controller = JobController::new(&session);
        controller.submit(&spec("migrate")).await.unwrap();
        session
            .control_plane()
            .set_job_counters("batch", "migrate", 1, 0);

        let first = controller.poll_completion("migrate", "batch").await.unwrap();
        let second = controller.poll_completion("migrate", "batch").await.unwrap();
        assert_eq!(first, JobState::Succeeded { succeeded: 1 });
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn is_completed_reports_each_state() {
        let session = session(FakeControlPlane::new()).await;
        let controller = JobController::new(&session);
        controller.submit(&spec("etl")).await.unwrap();

        assert!(!controller.is_completed("etl", "batch").await.unwrap());

        session.control_plane().set_job_counters("batch", "etl", 1, 0);
        assert!(controller.is_completed("etl", "batch").await.unwrap());

        session.control_plane().set_job_counters("batch", "etl", 1, 1);
        match controller.is_completed("etl", "batch").await {
            Err(KubecycleError::JobFailed { name, failed, .. }) => {
                assert_eq!(name, "etl");
                assert_eq!(failed, 1);
            }
            other => panic!("expected JobFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_submission_is_rejected() {
        let session = session(FakeControlPlane::new()).await;
        let controller = JobController::new(&session);
        controller.submit(&spec("once")).await.unwrap();

        let err = controller.submit(&spec("once")).await.unwrap_err();
        assert!(matches!(err, KubecycleError::DuplicateJob { .. }));
    }

    #[tokio::test]
    async fn polling_unknown_job_is_not_found() {
        let session = session(FakeControlPlane::new()).await;
        let err = JobController::new(&session)
            .poll_completion("ghost", "batch")
            .await
            .unwrap_err();
        assert!(matches!(err, KubecycleError::NotFound { .. }));
    }

    #[tokio::test]
    async fn preexisting_failed_job_reads_as_failed() {
        let mut job = Job::default();
        job.metadata.name = Some("old".into());
        job.status = Some(status(None, Some(3)));
        let session = session(FakeControlPlane::new().with_job("batch", job)).await;

        let state = JobController::new(&session)
            .poll_completion("old", "batch")
            .await
            .unwrap();
        assert_eq!(state, JobState::Failed { failed: 3 });
    }

    #[tokio::test]
    async fn trigger_from_schedule_submits_projected_job() {
        let plane = FakeControlPlane::new().with_cron_job("batch", sample_cron_job("nightly", "img:7"));
        let session = session(plane).await;

        let name = JobController::new(&session)
            .trigger_from_schedule("nightly", "batch")
            .await
            .unwrap();
        assert!(name.starts_with("nightly-api-trigger-"));
        assert_eq!(name.len(), "nightly-api-trigger-".len() + 14);

        let stored = session.control_plane().job("batch", &name).unwrap();
        let pod = stored.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.containers[0].image.as_deref(), Some("img:7"));
        assert_eq!(pod.restart_policy.as_deref(), Some("OnFailure"));
    }

    #[tokio::test]
    async fn same_second_trigger_collides() {
        use crate::jobs::template::JobTemplateBuilder;
        use chrono::{TimeZone, Utc};

        let plane = FakeControlPlane::new().with_cron_job("batch", sample_cron_job("nightly", "img"));
        let session = session(plane).await;
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 8, 30, 0).unwrap();
        let builder = JobTemplateBuilder::new(&session);
        let controller = JobController::new(&session);

        let first = builder.from_schedule_at("nightly", "batch", at).await.unwrap();
        controller.submit(&first).await.unwrap();
        let second = builder.from_schedule_at("nightly", "batch", at).await.unwrap();
        let err = controller.submit(&second).await.unwrap_err();
        assert!(matches!(err, KubecycleError::DuplicateJob { .. }));
    }
}
