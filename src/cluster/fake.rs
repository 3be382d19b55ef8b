//! In-memory [`ControlPlane`] used by unit tests.
//!
//! Stores objects per (namespace, name), bumps `resourceVersion` on every
//! write and rejects stale replaces with 409 the way the API server does.
//! Failures can be injected per operation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, Job, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{ConfigMap, Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::ErrorResponse;

use super::control_plane::ControlPlane;

type Key = (String, String);

#[derive(Default)]
struct Store {
    deployments: BTreeMap<Key, Deployment>,
    cron_jobs: BTreeMap<Key, CronJob>,
    jobs: BTreeMap<Key, Job>,
    config_maps: BTreeMap<Key, ConfigMap>,
    version: u64,
    unreachable: bool,
    fail_replace: HashMap<String, u16>,
    concurrent_writes: HashMap<String, u32>,
    replace_attempts: Vec<String>,
}

impl Store {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

#[derive(Default)]
pub struct FakeControlPlane {
    store: Mutex<Store>,
}

pub fn api_error(code: u16, reason: &str, message: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".into(),
        message: message.into(),
        reason: reason.into(),
        code,
    })
}

fn not_found(kind: &str, name: &str) -> kube::Error {
    api_error(404, "NotFound", &format!("{kind} \"{name}\" not found"))
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// JSON merge of `patch` into `target`; null deletes a key.
fn merge(target: &mut serde_json::Value, patch: &serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(t), serde_json::Value::Object(p)) => {
            for (k, v) in p {
                if v.is_null() {
                    t.remove(k);
                } else {
                    merge(t.entry(k.clone()).or_insert(serde_json::Value::Null), v);
                }
            }
        }
        (t, p) => *t = p.clone(),
    }
}

/// A nightly CronJob whose pod template runs `image` in one container.
pub fn sample_cron_job(name: &str, image: &str) -> CronJob {
    CronJob {
        metadata: ObjectMeta {
            name: Some(name.into()),
            ..Default::default()
        },
        spec: Some(CronJobSpec {
            schedule: "0 3 * * *".into(),
            job_template: JobTemplateSpec {
                metadata: None,
                spec: Some(JobSpec {
                    template: PodTemplateSpec {
                        metadata: Some(ObjectMeta {
                            labels: Some(BTreeMap::from([("app".to_string(), name.to_string())])),
                            ..Default::default()
                        }),
                        spec: Some(PodSpec {
                            containers: vec![Container {
                                name: "main".into(),
                                image: Some(image.into()),
                                ..Default::default()
                            }],
                            restart_policy: Some("OnFailure".into()),
                            ..Default::default()
                        }),
                    },
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deployment(self, namespace: &str, name: &str, replicas: i32) -> Self {
        {
            let mut store = self.store.lock().unwrap();
            let mut dep = Deployment::default();
            dep.metadata.name = Some(name.to_string());
            dep.metadata.namespace = Some(namespace.to_string());
            dep.metadata.resource_version = Some(store.next_version());
            dep.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
            store.deployments.insert(key(namespace, name), dep);
        }
        self
    }

    pub fn with_cron_job(self, namespace: &str, cron_job: CronJob) -> Self {
        {
            let name = cron_job.metadata.name.clone().unwrap_or_default();
            let mut store = self.store.lock().unwrap();
            store.cron_jobs.insert(key(namespace, &name), cron_job);
        }
        self
    }

    pub fn with_job(self, namespace: &str, job: Job) -> Self {
        {
            let name = job.metadata.name.clone().unwrap_or_default();
            let mut store = self.store.lock().unwrap();
            store.jobs.insert(key(namespace, &name), job);
        }
        self
    }

    /// Every call fails with a transport error.
    pub fn unreachable(self) -> Self {
        self.store.lock().unwrap().unreachable = true;
        self
    }

    /// Every replace of deployment `name` fails with the given status code.
    pub fn fail_replace(self, name: &str, code: u16) -> Self {
        self.store
            .lock()
            .unwrap()
            .fail_replace
            .insert(name.to_string(), code);
        self
    }

    /// Simulates an external writer touching deployment `name` right after
    /// each of the next `times` reads.
    pub fn concurrent_writer(self, name: &str, times: u32) -> Self {
        self.store
            .lock()
            .unwrap()
            .concurrent_writes
            .insert(name.to_string(), times);
        self
    }

    pub fn replicas_of(&self, namespace: &str, name: &str) -> Option<i32> {
        let store = self.store.lock().unwrap();
        store
            .deployments
            .get(&key(namespace, name))
            .and_then(|d| d.spec.as_ref())
            .and_then(|s| s.replicas)
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.store
            .lock()
            .unwrap()
            .deployments
            .get(&key(namespace, name))
            .cloned()
    }

    pub fn job(&self, namespace: &str, name: &str) -> Option<Job> {
        self.store
            .lock()
            .unwrap()
            .jobs
            .get(&key(namespace, name))
            .cloned()
    }

    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.store
            .lock()
            .unwrap()
            .config_maps
            .get(&key(namespace, name))
            .cloned()
    }

    /// Sets a job's status counters, as the job controller would.
    pub fn set_job_counters(&self, namespace: &str, name: &str, succeeded: i32, failed: i32) {
        let mut store = self.store.lock().unwrap();
        if let Some(job) = store.jobs.get_mut(&key(namespace, name)) {
            let status = job.status.get_or_insert_with(Default::default);
            status.succeeded = Some(succeeded);
            status.failed = Some(failed);
        }
    }

    /// Names of deployments a replace was attempted on, in call order.
    pub fn replace_attempts(&self) -> Vec<String> {
        self.store.lock().unwrap().replace_attempts.clone()
    }

    fn check_reachable(store: &Store) -> Result<(), kube::Error> {
        if store.unreachable {
            Err(kube::Error::Service("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

impl ControlPlane for FakeControlPlane {
    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, kube::Error> {
        let store = self.store.lock().unwrap();
        Self::check_reachable(&store)?;
        Ok(store
            .deployments
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, d)| d.clone())
            .collect())
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, kube::Error> {
        let mut store = self.store.lock().unwrap();
        Self::check_reachable(&store)?;
        let found = store
            .deployments
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| not_found("deployments.apps", name))?;

        let pending = store.concurrent_writes.get(name).copied().unwrap_or(0);
        if pending > 0 {
            store.concurrent_writes.insert(name.to_string(), pending - 1);
            let version = store.next_version();
            if let Some(stored) = store.deployments.get_mut(&key(namespace, name)) {
                stored.metadata.resource_version = Some(version);
            }
        }
        Ok(found)
    }

    async fn replace_deployment(
        &self,
        namespace: &str,
        name: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, kube::Error> {
        let mut store = self.store.lock().unwrap();
        Self::check_reachable(&store)?;
        store.replace_attempts.push(name.to_string());

        if let Some(code) = store.fail_replace.get(name).copied() {
            return Err(api_error(code, "InternalError", "simulated update failure"));
        }
        let current_version = store
            .deployments
            .get(&key(namespace, name))
            .ok_or_else(|| not_found("deployments.apps", name))?
            .metadata
            .resource_version
            .clone();
        if deployment.metadata.resource_version.is_some()
            && deployment.metadata.resource_version != current_version
        {
            return Err(api_error(
                409,
                "Conflict",
                "the object has been modified; please apply your changes to the latest version and try again",
            ));
        }

        let mut stored = deployment.clone();
        stored.metadata.resource_version = Some(store.next_version());
        store.deployments.insert(key(namespace, name), stored.clone());
        Ok(stored)
    }

    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<Deployment, kube::Error> {
        let mut store = self.store.lock().unwrap();
        Self::check_reachable(&store)?;
        let current = store
            .deployments
            .get(&key(namespace, name))
            .ok_or_else(|| not_found("deployments.apps", name))?;

        let mut value = serde_json::to_value(current).map_err(kube::Error::SerdeError)?;
        merge(&mut value, patch);
        let mut patched: Deployment =
            serde_json::from_value(value).map_err(kube::Error::SerdeError)?;
        patched.metadata.resource_version = Some(store.next_version());
        store.deployments.insert(key(namespace, name), patched.clone());
        Ok(patched)
    }

    async fn get_cron_job(&self, namespace: &str, name: &str) -> Result<CronJob, kube::Error> {
        let store = self.store.lock().unwrap();
        Self::check_reachable(&store)?;
        store
            .cron_jobs
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| not_found("cronjobs.batch", name))
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Job, kube::Error> {
        let store = self.store.lock().unwrap();
        Self::check_reachable(&store)?;
        store
            .jobs
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| not_found("jobs.batch", name))
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job, kube::Error> {
        let mut store = self.store.lock().unwrap();
        Self::check_reachable(&store)?;
        let name = job.metadata.name.clone().unwrap_or_default();
        if store.jobs.contains_key(&key(namespace, &name)) {
            return Err(api_error(
                409,
                "AlreadyExists",
                &format!("jobs.batch \"{name}\" already exists"),
            ));
        }
        let mut stored = job.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.resource_version = Some(store.next_version());
        store.jobs.insert(key(namespace, &name), stored.clone());
        Ok(stored)
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, kube::Error> {
        let mut store = self.store.lock().unwrap();
        Self::check_reachable(&store)?;
        let name = config_map.metadata.name.clone().unwrap_or_default();
        if store.config_maps.contains_key(&key(namespace, &name)) {
            return Err(api_error(
                409,
                "AlreadyExists",
                &format!("configmaps \"{name}\" already exists"),
            ));
        }
        let mut stored = config_map.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.resource_version = Some(store.next_version());
        store.config_maps.insert(key(namespace, &name), stored.clone());
        Ok(stored)
    }
}
