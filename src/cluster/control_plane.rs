//! Capability surface the core needs from the Kubernetes API server.
//!
//! [`ControlPlane`] exposes only the verbs and kinds the lifecycle components
//! use. [`KubeControlPlane`] implements it over a `kube::Client`; tests swap in
//! an in-memory implementation.

use std::future::Future;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::Client;

pub trait ControlPlane: Send + Sync {
    fn list_deployments(
        &self,
        namespace: &str,
    ) -> impl Future<Output = Result<Vec<Deployment>, kube::Error>> + Send;

    fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<Deployment, kube::Error>> + Send;

    /// Full-object write. The object's `resourceVersion`, when set, is
    /// enforced by the server and a stale one is rejected with 409.
    fn replace_deployment(
        &self,
        namespace: &str,
        name: &str,
        deployment: &Deployment,
    ) -> impl Future<Output = Result<Deployment, kube::Error>> + Send;

    /// Strategic-merge patch.
    fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> impl Future<Output = Result<Deployment, kube::Error>> + Send;

    fn get_cron_job(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<CronJob, kube::Error>> + Send;

    fn get_job(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<Job, kube::Error>> + Send;

    fn create_job(
        &self,
        namespace: &str,
        job: &Job,
    ) -> impl Future<Output = Result<Job, kube::Error>> + Send;

    fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> impl Future<Output = Result<ConfigMap, kube::Error>> + Send;
}

/// [`ControlPlane`] backed by a live API server.
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
}

impl KubeControlPlane {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ControlPlane for KubeControlPlane {
    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, kube::Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, kube::Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.get(name).await
    }

    async fn replace_deployment(
        &self,
        namespace: &str,
        name: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, kube::Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.replace(name, &PostParams::default(), deployment).await
    }

    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<Deployment, kube::Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.patch(name, &PatchParams::default(), &Patch::Strategic(patch))
            .await
    }

    async fn get_cron_job(&self, namespace: &str, name: &str) -> Result<CronJob, kube::Error> {
        let api: Api<CronJob> = Api::namespaced(self.client.clone(), namespace);
        api.get(name).await
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Job, kube::Error> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        api.get(name).await
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job, kube::Error> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), job).await
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, kube::Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), config_map).await
    }
}
