use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;

use crate::cluster::{ClusterSession, ControlPlane};
use crate::error::{KubecycleError, ResourceKind, ResourceRef, Result, Verb};

/// Pod-template annotation whose change makes the deployment controller roll
/// out new pods. Same key `kubectl rollout restart` uses.
pub const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";

/// Patch body that stamps `at` on the pod template and nothing else.
pub fn restart_patch(at: DateTime<Utc>) -> serde_json::Value {
    json!({
        "spec": {
            "template": {
                "metadata": {
                    "annotations": {
                        RESTARTED_AT_ANNOTATION: at.to_rfc3339_opts(SecondsFormat::Secs, true)
                    }
                }
            }
        }
    })
}

/// Triggers rolling restarts. Does not wait for or observe the rollout.
pub struct RestartTrigger<'a, P> {
    session: &'a ClusterSession<P>,
}

impl<'a, P: ControlPlane> RestartTrigger<'a, P> {
    pub fn new(session: &'a ClusterSession<P>) -> Self {
        Self { session }
    }

    pub async fn restart(&self, name: &str, namespace: &str) -> Result<()> {
        self.restart_at(name, namespace, Utc::now()).await
    }

    pub async fn restart_at(&self, name: &str, namespace: &str, at: DateTime<Utc>) -> Result<()> {
        self.session
            .control_plane()
            .patch_deployment(namespace, name, &restart_patch(at))
            .await
            .map_err(|e| {
                KubecycleError::from_kube(
                    e,
                    ResourceRef::new(Verb::Patch, ResourceKind::Deployment, namespace, name),
                )
            })?;

        tracing::info!(deployment = %name, namespace = %namespace, "Deployment restart requested");
        Ok(())
    }
}
