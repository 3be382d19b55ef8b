//! kubecycle: lifecycle operations for Kubernetes workloads.
//!
//! A [`ClusterSession`](cluster::ClusterSession) is opened once per cluster
//! and verified with a connectivity probe. Components borrow it:
//!
//! - [`jobs::JobController`] submits jobs and reads their completion state.
//! - [`jobs::JobTemplateBuilder`] projects a CronJob's pod template into a job.
//! - [`deployments::DeploymentScaler`] reads and writes replica counts.
//! - [`deployments::RestartTrigger`] starts a rolling restart.
//! - [`config_objects::ConfigInjector`] creates ConfigMaps.

pub mod cli;
pub mod cluster;
pub mod commands;
pub mod config;
pub mod config_objects;
pub mod deployments;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod ui;

pub use error::{FailureKind, KubecycleError, Result};
