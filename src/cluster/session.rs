use std::path::PathBuf;

use kube::config::{KubeConfigOptions, Kubeconfig};

use super::control_plane::{ControlPlane, KubeControlPlane};
use crate::error::{KubecycleError, ResourceKind, ResourceRef, Result, Verb};

/// Namespace every cluster has; listing it is the connectivity probe.
pub const DEFAULT_PROBE_NAMESPACE: &str = "kube-system";

/// Everything [`ClusterSession::connect`] needs, resolved by the caller.
#[derive(Debug, Clone)]
pub struct ClusterSettings {
    /// Label for the target cluster (e.g. "staging"); used in logs and errors.
    pub environment: String,
    /// Path to the kubeconfig file.
    pub kubeconfig: PathBuf,
    /// Kubeconfig context; `None` uses the file's current-context.
    pub context: Option<String>,
    pub probe_namespace: String,
}

impl ClusterSettings {
    pub fn new(environment: impl Into<String>, kubeconfig: impl Into<PathBuf>) -> Self {
        Self {
            environment: environment.into(),
            kubeconfig: kubeconfig.into(),
            context: None,
            probe_namespace: DEFAULT_PROBE_NAMESPACE.to_string(),
        }
    }
}

/// An authenticated, probed connection to one cluster.
///
/// Only obtainable through [`connect`](ClusterSession::connect) or
/// [`establish`](ClusterSession::establish), both of which run the probe
/// first, so holding a session means the control plane answered once.
pub struct ClusterSession<P = KubeControlPlane> {
    environment: String,
    plane: P,
}

impl ClusterSession<KubeControlPlane> {
    /// Builds a client from the kubeconfig in `settings` and probes it.
    ///
    /// A kubeconfig that can't be read or parsed is a
    /// [`Configuration`](KubecycleError::Configuration) error.
    pub async fn connect(settings: &ClusterSettings) -> Result<Self> {
        let kubeconfig = Kubeconfig::read_from(&settings.kubeconfig).map_err(|e| {
            KubecycleError::Configuration(format!(
                "failed to load kubeconfig {}: {e}",
                settings.kubeconfig.display()
            ))
        })?;
        let options = KubeConfigOptions {
            context: settings.context.clone(),
            ..Default::default()
        };
        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .map_err(|e| {
                KubecycleError::Configuration(format!(
                    "invalid kubeconfig {}: {e}",
                    settings.kubeconfig.display()
                ))
            })?;
        let client = kube::Client::try_from(config).map_err(|e| {
            KubecycleError::Configuration(format!(
                "unable to create {} client from config: {e}",
                settings.environment
            ))
        })?;

        Self::establish_in(
            settings.environment.clone(),
            KubeControlPlane::new(client),
            &settings.probe_namespace,
        )
        .await
    }
}

impl<P: ControlPlane> ClusterSession<P> {
    /// Probes `plane` against the default probe namespace.
    pub async fn establish(environment: impl Into<String>, plane: P) -> Result<Self> {
        Self::establish_in(environment.into(), plane, DEFAULT_PROBE_NAMESPACE).await
    }

    async fn establish_in(environment: String, plane: P, probe_namespace: &str) -> Result<Self> {
        if let Err(e) = plane.list_deployments(probe_namespace).await {
            tracing::warn!(
                environment = %environment,
                error = %e,
                "Connectivity probe failed"
            );
            return Err(KubecycleError::Connectivity {
                target: ResourceRef::new(
                    Verb::List,
                    ResourceKind::Deployment,
                    probe_namespace,
                    "",
                ),
                source: e,
            });
        }

        tracing::info!(environment = %environment, "Connected to cluster");
        Ok(Self { environment, plane })
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn control_plane(&self) -> &P {
        &self.plane
    }
}
