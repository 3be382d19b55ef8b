use std::fmt;

use thiserror::Error;

/// Resource kinds the core touches on the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Job,
    CronJob,
    Deployment,
    ConfigMap,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Job => write!(f, "job"),
            ResourceKind::CronJob => write!(f, "cronjob"),
            ResourceKind::Deployment => write!(f, "deployment"),
            ResourceKind::ConfigMap => write!(f, "configmap"),
        }
    }
}

/// The API verb that was being performed when a call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    List,
    Create,
    Replace,
    Patch,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verb::Get => write!(f, "get"),
            Verb::List => write!(f, "list"),
            Verb::Create => write!(f, "create"),
            Verb::Replace => write!(f, "update"),
            Verb::Patch => write!(f, "patch"),
        }
    }
}

/// Identifies the resource a failed call targeted.
///
/// Namespace-wide calls (list) carry an empty `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub verb: Verb,
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(verb: Verb, kind: ResourceKind, namespace: &str, name: &str) -> Self {
        Self {
            verb,
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{} {}s in namespace {}", self.verb, self.kind, self.namespace)
        } else {
            write!(f, "{} {} {}/{}", self.verb, self.kind, self.namespace, self.name)
        }
    }
}

#[derive(Debug, Error)]
pub enum KubecycleError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cannot reach control plane ({target}): {source}")]
    Connectivity {
        target: ResourceRef,
        #[source]
        source: kube::Error,
    },

    #[error("Not found ({target})")]
    NotFound { target: ResourceRef },

    #[error("Job {namespace}/{name} already exists")]
    DuplicateJob { name: String, namespace: String },

    #[error("Config map {namespace}/{name} already exists")]
    AlreadyExists { name: String, namespace: String },

    #[error("Update conflict after {attempts} attempt(s) ({target}): {message}")]
    UpdateConflict {
        target: ResourceRef,
        attempts: u32,
        message: String,
    },

    #[error("Job {namespace}/{name} failed ({failed} failed pod(s))")]
    JobFailed {
        name: String,
        namespace: String,
        failed: i32,
    },

    #[error("Cronjob {namespace}/{name} has no job template")]
    MalformedTemplate { name: String, namespace: String },

    #[error("Control plane rejected request ({target}), status {code}: {message}")]
    Rejected {
        target: ResourceRef,
        code: u16,
        message: String,
    },

    #[error("Scaled {scaled} deployment(s) in {namespace} before failing: {source}")]
    PartialScale {
        namespace: String,
        scaled: usize,
        #[source]
        source: Box<KubecycleError>,
    },
}

pub type Result<T> = std::result::Result<T, KubecycleError>;

impl KubecycleError {
    /// Maps a raw client error onto the taxonomy, keeping the call context.
    ///
    /// A 409 on create is a name collision; on any other verb it is a
    /// concurrent-modification conflict. Auth failures, throttling (429) and
    /// server-side 5xx are connectivity problems the caller may retry.
    pub fn from_kube(err: kube::Error, target: ResourceRef) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => KubecycleError::NotFound { target },
            kube::Error::Api(resp) if resp.code == 409 && target.verb == Verb::Create => {
                match target.kind {
                    ResourceKind::Job => KubecycleError::DuplicateJob {
                        name: target.name,
                        namespace: target.namespace,
                    },
                    _ => KubecycleError::AlreadyExists {
                        name: target.name,
                        namespace: target.namespace,
                    },
                }
            }
            kube::Error::Api(resp) if resp.code == 409 => KubecycleError::UpdateConflict {
                target,
                attempts: 1,
                message: resp.message,
            },
            kube::Error::Api(resp)
                if matches!(resp.code, 401 | 403 | 429) || resp.code >= 500 =>
            {
                KubecycleError::Connectivity {
                    target,
                    source: kube::Error::Api(resp),
                }
            }
            kube::Error::Api(resp) => KubecycleError::Rejected {
                target,
                code: resp.code,
                message: resp.message,
            },
            other => KubecycleError::Connectivity {
                target,
                source: other,
            },
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            KubecycleError::Connectivity { .. } | KubecycleError::UpdateConflict { .. } => {
                FailureKind::System
            }
            KubecycleError::PartialScale { source, .. } => source.failure_kind(),
            _ => FailureKind::Business,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, KubecycleError::UpdateConflict { .. })
    }
}

/// Classifies a failure for the caller's retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request itself is wrong or the workload failed; retrying won't help.
    Business,
    /// Infrastructure failure (unreachable API server, concurrent writer).
    System,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Business => write!(f, "Business"),
            FailureKind::System => write!(f, "System"),
        }
    }
}
