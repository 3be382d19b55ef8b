use k8s_openapi::api::apps::v1::Deployment;
use serde::Serialize;

use crate::cluster::{ClusterSession, ControlPlane};
use crate::error::{KubecycleError, ResourceKind, ResourceRef, Result, Verb};

/// Extra read-modify-write rounds after a 409 before giving up.
pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

/// Replica count the platform assumes when a deployment leaves it unset.
const PLATFORM_DEFAULT_REPLICAS: i32 = 1;

/// Outcome of a namespace-wide scale that touched every deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScaleReport {
    pub namespace: String,
    /// Deployment names in the order they were scaled.
    pub scaled: Vec<String>,
}

/// Reads and writes deployment replica counts.
///
/// Writes are read-modify-write with the read's `resourceVersion` carried into
/// the replace, so a concurrent writer causes a conflict rather than being
/// silently overwritten. Conflicts are retried `conflict_retries` times.
pub struct DeploymentScaler<'a, P> {
    session: &'a ClusterSession<P>,
    conflict_retries: u32,
}

impl<'a, P: ControlPlane> DeploymentScaler<'a, P> {
    pub fn new(session: &'a ClusterSession<P>) -> Self {
        Self {
            session,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }

    /// Zero means a single attempt: the first conflict is returned as-is.
    pub fn with_conflict_retries(mut self, conflict_retries: u32) -> Self {
        self.conflict_retries = conflict_retries;
        self
    }

    /// Current desired replica count.
    pub async fn replicas(&self, name: &str, namespace: &str) -> Result<i32> {
        let deployment = self.fetch(name, namespace).await?;
        Ok(deployment
            .spec
            .and_then(|spec| spec.replicas)
            .unwrap_or(PLATFORM_DEFAULT_REPLICAS))
    }

    pub async fn set_replicas(&self, name: &str, namespace: &str, count: i32) -> Result<()> {
        let current = self.fetch(name, namespace).await?;
        self.write_replicas(current, name, namespace, count).await
    }

    pub async fn scale_down(&self, name: &str, namespace: &str) -> Result<()> {
        self.set_replicas(name, namespace, 0).await
    }

    pub async fn scale_up(&self, name: &str, namespace: &str, count: i32) -> Result<()> {
        self.set_replicas(name, namespace, count).await
    }

    /// Scales every deployment in `namespace` to zero, in list order.
    ///
    /// Not atomic. The first failed update stops the run; deployments already
    /// scaled stay at zero and the rest are not attempted. The failure comes
    /// back as [`PartialScale`](KubecycleError::PartialScale) with the count of
    /// deployments already scaled.
    pub async fn scale_namespace_to_zero(&self, namespace: &str) -> Result<ScaleReport> {
        let deployments = self
            .session
            .control_plane()
            .list_deployments(namespace)
            .await
            .map_err(|e| {
                KubecycleError::from_kube(
                    e,
                    ResourceRef::new(Verb::List, ResourceKind::Deployment, namespace, ""),
                )
            })?;

        let mut scaled = Vec::with_capacity(deployments.len());
        for deployment in deployments {
            let name = deployment.metadata.name.clone().unwrap_or_default();
            if let Err(e) = self.write_replicas(deployment, &name, namespace, 0).await {
                tracing::warn!(
                    namespace = %namespace,
                    deployment = %name,
                    scaled = scaled.len(),
                    error = %e,
                    "Namespace scale-down stopped"
                );
                return Err(KubecycleError::PartialScale {
                    namespace: namespace.to_string(),
                    scaled: scaled.len(),
                    source: Box::new(e),
                });
            }
            scaled.push(name);
        }

        tracing::info!(namespace = %namespace, count = scaled.len(), "Scaled namespace to zero");
        Ok(ScaleReport {
            namespace: namespace.to_string(),
            scaled,
        })
    }

    async fn fetch(&self, name: &str, namespace: &str) -> Result<Deployment> {
        self.session
            .control_plane()
            .get_deployment(namespace, name)
            .await
            .map_err(|e| {
                KubecycleError::from_kube(
                    e,
                    ResourceRef::new(Verb::Get, ResourceKind::Deployment, namespace, name),
                )
            })
    }

    async fn write_replicas(
        &self,
        mut current: Deployment,
        name: &str,
        namespace: &str,
        count: i32,
    ) -> Result<()> {
        let mut attempt = 1;
        loop {
            current.spec.get_or_insert_with(Default::default).replicas = Some(count);

            let result = self
                .session
                .control_plane()
                .replace_deployment(namespace, name, &current)
                .await;
            let err = match result {
                Ok(_) => {
                    tracing::info!(
                        deployment = %name,
                        namespace = %namespace,
                        replicas = count,
                        "Deployment scaled"
                    );
                    return Ok(());
                }
                Err(e) => KubecycleError::from_kube(
                    e,
                    ResourceRef::new(Verb::Replace, ResourceKind::Deployment, namespace, name),
                ),
            };

            match err {
                KubecycleError::UpdateConflict { target, message, .. } => {
                    if attempt > self.conflict_retries {
                        return Err(KubecycleError::UpdateConflict {
                            target,
                            attempts: attempt,
                            message,
                        });
                    }
                    tracing::debug!(
                        deployment = %name,
                        namespace = %namespace,
                        attempt,
                        "Deployment changed since read, retrying"
                    );
                    attempt += 1;
                    current = self.fetch(name, namespace).await?;
                }
                other => return Err(other),
            }
        }
    }
}
