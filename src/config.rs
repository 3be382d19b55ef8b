//! Configuration loaded from `kubecycle.toml`.
//!
//! [`KubecycleConfig`] holds every tunable. Keys missing from the file fall
//! back to defaults. `KUBECYCLE_ENVIRONMENT` and `KUBECYCLE_KUBECONFIG` take
//! precedence over the file; CLI flags take precedence over both.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cluster::{ClusterSettings, DEFAULT_PROBE_NAMESPACE};
use crate::deployments::DEFAULT_CONFLICT_RETRIES;

pub const CONFIG_FILE: &str = "kubecycle.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct KubecycleConfig {
    /// Label for the target cluster, carried into logs and errors.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Kubeconfig path. Defaults to `<home>/.kube/config`.
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context. Defaults to the file's current-context.
    #[serde(default)]
    pub context: Option<String>,

    /// Namespace used when a command doesn't name one.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_probe_namespace")]
    pub probe_namespace: String,

    /// Extra attempts after a write conflict on a replica update.
    #[serde(default = "default_conflict_retries")]
    pub conflict_retries: u32,

    /// First delay between completion polls in `job wait`.
    #[serde(default = "default_poll_initial_delay_ms")]
    pub poll_initial_delay_ms: u64,

    /// Upper bound for the exponential poll delay.
    #[serde(default = "default_poll_max_delay_ms")]
    pub poll_max_delay_ms: u64,

    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,
}

fn default_environment() -> String {
    "default".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_probe_namespace() -> String {
    DEFAULT_PROBE_NAMESPACE.to_string()
}

fn default_conflict_retries() -> u32 {
    DEFAULT_CONFLICT_RETRIES
}

fn default_poll_initial_delay_ms() -> u64 {
    1000
}

fn default_poll_max_delay_ms() -> u64 {
    30_000
}

fn default_poll_max_attempts() -> u32 {
    120
}

impl Default for KubecycleConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            kubeconfig: None,
            context: None,
            namespace: default_namespace(),
            probe_namespace: default_probe_namespace(),
            conflict_retries: default_conflict_retries(),
            poll_initial_delay_ms: default_poll_initial_delay_ms(),
            poll_max_delay_ms: default_poll_max_delay_ms(),
            poll_max_attempts: default_poll_max_attempts(),
        }
    }
}

impl KubecycleConfig {
    /// Loads `kubecycle.toml` from the current directory, or defaults if it
    /// doesn't exist, then applies environment overrides.
    pub fn load() -> Result<Self> {
        let path = Path::new(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads an explicitly named file; a missing file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str::<KubecycleConfig>(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Applies `KUBECYCLE_*` overrides using `lookup` to read variables.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(env) = lookup("KUBECYCLE_ENVIRONMENT")
            && !env.is_empty()
        {
            self.environment = env;
        }
        if let Some(path) = lookup("KUBECYCLE_KUBECONFIG")
            && !path.is_empty()
        {
            self.kubeconfig = Some(PathBuf::from(path));
        }
    }

    /// The configured kubeconfig, else `<home>/.kube/config`.
    pub fn resolve_kubeconfig(&self, home: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = &self.kubeconfig {
            return Ok(path.clone());
        }
        let home = home.context(
            "no kubeconfig configured and home directory is unknown; set `kubeconfig` in kubecycle.toml",
        )?;
        Ok(default_kubeconfig_path(home))
    }

    /// Settings for [`ClusterSession::connect`](crate::cluster::ClusterSession::connect).
    pub fn cluster_settings(&self) -> Result<ClusterSettings> {
        let kubeconfig = self.resolve_kubeconfig(home_dir().as_deref())?;
        Ok(ClusterSettings {
            environment: self.environment.clone(),
            kubeconfig,
            context: self.context.clone(),
            probe_namespace: self.probe_namespace.clone(),
        })
    }
}

pub fn default_kubeconfig_path(home: &Path) -> PathBuf {
    home.join(".kube").join("config")
}

/// Home directory from `USERPROFILE` on Windows and `HOME` elsewhere.
pub fn home_dir() -> Option<PathBuf> {
    let var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
