//! Builds one-shot job specifications.
//!
//! A [`JobSpec`] comes either from caller-supplied container details
//! ([`DirectJob`]) or from the pod template of an existing CronJob
//! ([`JobTemplateBuilder::from_schedule`]).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::{CronJob, Job, JobSpec as BatchJobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::cluster::{ClusterSession, ControlPlane};
use crate::error::{KubecycleError, ResourceKind, ResourceRef, Result, Verb};

/// Infix between the CronJob name and the trigger timestamp.
pub const TRIGGER_INFIX: &str = "api-trigger";

const TRIGGER_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// A job ready for submission. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    name: String,
    namespace: String,
    labels: BTreeMap<String, String>,
    template: PodTemplateSpec,
}

impl JobSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn template(&self) -> &PodTemplateSpec {
        &self.template
    }

    /// Renders the control-plane Job object.
    pub fn to_job(&self) -> Job {
        Job {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: (!self.labels.is_empty()).then(|| self.labels.clone()),
                ..Default::default()
            },
            spec: Some(BatchJobSpec {
                template: self.template.clone(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Caller-supplied container details for a job built from scratch.
#[derive(Debug, Clone, Default)]
pub struct DirectJob {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    /// Name of a pre-existing PersistentVolumeClaim, also used as volume name.
    pub volume_name: Option<String>,
    pub mount_path: Option<String>,
}

impl DirectJob {
    /// Builds a single-container job that never restarts its pod.
    ///
    /// The claim is attached only when both `volume_name` and `mount_path`
    /// are set; a lone half is dropped.
    pub fn build(self) -> JobSpec {
        let env: Vec<EnvVar> = self
            .env
            .into_iter()
            .map(|(name, value)| EnvVar {
                name,
                value: Some(value),
                ..Default::default()
            })
            .collect();

        let (volumes, mounts) = match (self.volume_name, self.mount_path) {
            (Some(volume), Some(mount_path)) => (
                vec![Volume {
                    name: volume.clone(),
                    persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                        claim_name: volume.clone(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                vec![VolumeMount {
                    name: volume,
                    mount_path,
                    ..Default::default()
                }],
            ),
            _ => (Vec::new(), Vec::new()),
        };

        let container = Container {
            name: self.name.clone(),
            image: Some(self.image),
            command: (!self.command.is_empty()).then_some(self.command),
            env: (!env.is_empty()).then_some(env),
            volume_mounts: (!mounts.is_empty()).then_some(mounts),
            ..Default::default()
        };

        JobSpec {
            name: self.name,
            namespace: self.namespace,
            labels: self.labels,
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    containers: vec![container],
                    restart_policy: Some("Never".to_string()),
                    volumes: (!volumes.is_empty()).then_some(volumes),
                    ..Default::default()
                }),
            },
        }
    }
}

/// `<cronjob>-api-trigger-<YYYYMMDDHHMMSS>` in UTC.
///
/// Second resolution: two triggers of the same CronJob within one second
/// produce the same name and the second submission is rejected.
pub fn projected_job_name(cron_job: &str, triggered_at: DateTime<Utc>) -> String {
    format!(
        "{cron_job}-{TRIGGER_INFIX}-{}",
        triggered_at.format(TRIGGER_TIMESTAMP_FORMAT)
    )
}

/// Copies the CronJob's pod template verbatim into a new [`JobSpec`].
///
/// The job is named after `name`, the CronJob the caller asked for, not the
/// object's own metadata.
pub fn project(
    name: &str,
    cron_job: &CronJob,
    namespace: &str,
    triggered_at: DateTime<Utc>,
) -> Result<JobSpec> {
    let template = cron_job
        .spec
        .as_ref()
        .and_then(|spec| spec.job_template.spec.as_ref())
        .map(|job_spec| job_spec.template.clone())
        .ok_or_else(|| KubecycleError::MalformedTemplate {
            name: name.to_string(),
            namespace: namespace.to_string(),
        })?;

    Ok(JobSpec {
        name: projected_job_name(name, triggered_at),
        namespace: namespace.to_string(),
        labels: BTreeMap::new(),
        template,
    })
}

/// Reads CronJob templates through a session.
pub struct JobTemplateBuilder<'a, P> {
    session: &'a ClusterSession<P>,
}

impl<'a, P: ControlPlane> JobTemplateBuilder<'a, P> {
    pub fn new(session: &'a ClusterSession<P>) -> Self {
        Self { session }
    }

    pub async fn from_schedule(&self, cron_job: &str, namespace: &str) -> Result<JobSpec> {
        self.from_schedule_at(cron_job, namespace, Utc::now()).await
    }

    pub async fn from_schedule_at(
        &self,
        cron_job: &str,
        namespace: &str,
        triggered_at: DateTime<Utc>,
    ) -> Result<JobSpec> {
        let source = self
            .session
            .control_plane()
            .get_cron_job(namespace, cron_job)
            .await
            .map_err(|e| {
                KubecycleError::from_kube(
                    e,
                    ResourceRef::new(Verb::Get, ResourceKind::CronJob, namespace, cron_job),
                )
            })?;
        tracing::debug!(cronjob = %cron_job, namespace = %namespace, "Read cronjob template");
        project(cron_job, &source, namespace, triggered_at)
    }
}
