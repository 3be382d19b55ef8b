//! Create-only injection of ConfigMaps that workloads read at start time.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::cluster::{ClusterSession, ControlPlane};
use crate::error::{KubecycleError, ResourceKind, ResourceRef, Result, Verb};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigObject {
    pub name: String,
    pub namespace: String,
    pub data: BTreeMap<String, String>,
    /// Ask the control plane to reject any later edit of the data.
    pub immutable: bool,
}

impl ConfigObject {
    pub fn new(name: &str, namespace: &str, data: BTreeMap<String, String>) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            data,
            immutable: false,
        }
    }

    pub fn to_config_map(&self) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            data: Some(self.data.clone()),
            immutable: self.immutable.then_some(true),
            ..Default::default()
        }
    }
}

/// Creates config objects; never updates or deletes them.
pub struct ConfigInjector<'a, P> {
    session: &'a ClusterSession<P>,
}

impl<'a, P: ControlPlane> ConfigInjector<'a, P> {
    pub fn new(session: &'a ClusterSession<P>) -> Self {
        Self { session }
    }

    /// A name already taken in the namespace is
    /// [`AlreadyExists`](KubecycleError::AlreadyExists); the existing object
    /// is left untouched.
    pub async fn create(
        &self,
        name: &str,
        namespace: &str,
        data: BTreeMap<String, String>,
    ) -> Result<()> {
        self.create_object(&ConfigObject::new(name, namespace, data))
            .await
    }

    pub async fn create_object(&self, object: &ConfigObject) -> Result<()> {
        self.session
            .control_plane()
            .create_config_map(&object.namespace, &object.to_config_map())
            .await
            .map_err(|e| {
                KubecycleError::from_kube(
                    e,
                    ResourceRef::new(
                        Verb::Create,
                        ResourceKind::ConfigMap,
                        &object.namespace,
                        &object.name,
                    ),
                )
            })?;

        tracing::info!(
            configmap = %object.name,
            namespace = %object.namespace,
            keys = object.data.len(),
            "Config map created"
        );
        Ok(())
    }
}
