//! Maps CLI subcommands onto the lifecycle components.
//!
//! The [`Runner`] owns everything that belongs to the caller rather than the
//! core: default namespace, the completion wait loop and its backoff.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::time::sleep;

use crate::cli::{Command, ConfigCommand, DeployCommand, JobCommand, RunArgs};
use crate::cluster::{ClusterSession, ControlPlane};
use crate::config::KubecycleConfig;
use crate::config_objects::{ConfigInjector, ConfigObject};
use crate::deployments::{DeploymentScaler, RestartTrigger, ScaleReport};
use crate::error::KubecycleError;
use crate::jobs::{DirectJob, JobController, JobState};

/// Delay schedule for repeated completion polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBackoff {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl PollBackoff {
    pub fn from_config(config: &KubecycleConfig) -> Self {
        Self {
            initial_delay_ms: config.poll_initial_delay_ms,
            max_delay_ms: config.poll_max_delay_ms,
            max_attempts: config.poll_max_attempts,
        }
    }

    /// initial_delay_ms * 2^(attempt - 1), capped at max_delay_ms.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(
            self.initial_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }
}

/// What a command did, for the UI to render.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Probed { environment: String },
    JobSubmitted { name: String, namespace: String },
    Job { name: String, namespace: String, state: JobState },
    Replicas { name: String, namespace: String, replicas: i32 },
    Scaled { name: String, namespace: String, replicas: i32 },
    NamespaceScaled(ScaleReport),
    Restarted { name: String, namespace: String },
    ConfigCreated { name: String, namespace: String, keys: usize },
}

/// Polls `name` until it leaves Running, sleeping per `backoff` between polls.
///
/// `on_poll` sees every observed state with its 1-based attempt number. A
/// failed job ends the wait with [`KubecycleError::JobFailed`]. The job is
/// polled at least once, even with `max_attempts = 0`.
pub async fn wait_for_completion<P: ControlPlane>(
    controller: &JobController<'_, P>,
    name: &str,
    namespace: &str,
    backoff: PollBackoff,
    mut on_poll: impl FnMut(u32, JobState),
) -> Result<JobState> {
    let max_attempts = backoff.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        let state = controller.poll_completion(name, namespace).await?;
        on_poll(attempt, state);
        match state {
            JobState::Running => {
                if attempt < max_attempts {
                    sleep(backoff.delay_for_attempt(attempt)).await;
                }
            }
            JobState::Succeeded { .. } => return Ok(state),
            JobState::Failed { failed } => {
                return Err(KubecycleError::JobFailed {
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                    failed,
                }
                .into());
            }
        }
    }
    bail!("job {namespace}/{name} still running after {max_attempts} polls")
}

/// Spinner label for commands that wait on a job, `None` for the rest.
///
/// A triggered job's name is only known once it is created, so the label
/// names the CronJob it comes from.
pub fn wait_label(command: &Command) -> Option<String> {
    match command {
        Command::Job(JobCommand::Run(args)) if args.wait => {
            Some(format!("waiting for job {}", args.name))
        }
        Command::Job(JobCommand::Trigger {
            cronjob,
            wait: true,
        }) => Some(format!("waiting for job triggered from cronjob {cronjob}")),
        Command::Job(JobCommand::Wait { name }) => Some(format!("waiting for job {name}")),
        _ => None,
    }
}

/// Reads `KEY=VALUE` lines; blank lines and `#` comments are skipped.
pub fn parse_entries(contents: &str) -> Result<BTreeMap<String, String>> {
    let mut entries = BTreeMap::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .with_context(|| format!("line {}: expected KEY=VALUE", index + 1))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("line {}: empty key", index + 1);
        }
        entries.insert(key.to_string(), value.trim().to_string());
    }
    Ok(entries)
}

pub struct Runner<'a, P> {
    session: &'a ClusterSession<P>,
    namespace: String,
    conflict_retries: u32,
    backoff: PollBackoff,
}

impl<'a, P: ControlPlane> Runner<'a, P> {
    pub fn new(session: &'a ClusterSession<P>, config: &KubecycleConfig) -> Self {
        Self {
            session,
            namespace: config.namespace.clone(),
            conflict_retries: config.conflict_retries,
            backoff: PollBackoff::from_config(config),
        }
    }

    /// Runs one command. `on_poll` is forwarded to any completion wait.
    pub async fn run(
        &self,
        command: Command,
        on_poll: impl FnMut(u32, JobState),
    ) -> Result<Outcome> {
        match command {
            Command::Probe => Ok(Outcome::Probed {
                environment: self.session.environment().to_string(),
            }),
            Command::Job(job) => self.run_job(job, on_poll).await,
            Command::Deploy(deploy) => self.run_deploy(deploy).await,
            Command::Config(config) => self.run_config(config).await,
        }
    }

    async fn run_job(&self, command: JobCommand, on_poll: impl FnMut(u32, JobState)) -> Result<Outcome> {
        let controller = JobController::new(self.session);
        let ns = self.namespace.as_str();

        let (name, wait) = match command {
            JobCommand::Run(args) => {
                let wait = args.wait;
                let spec = self.direct_job(args).build();
                controller.submit(&spec).await?;
                (spec.name().to_string(), wait)
            }
            JobCommand::Trigger { cronjob, wait } => {
                (controller.trigger_from_schedule(&cronjob, ns).await?, wait)
            }
            JobCommand::Status { name } => {
                let state = controller.poll_completion(&name, ns).await?;
                return Ok(self.job_outcome(name, state));
            }
            JobCommand::Wait { name } => (name, true),
        };

        if !wait {
            return Ok(Outcome::JobSubmitted {
                name,
                namespace: ns.to_string(),
            });
        }
        let state = wait_for_completion(&controller, &name, ns, self.backoff, on_poll).await?;
        Ok(self.job_outcome(name, state))
    }

    fn direct_job(&self, args: RunArgs) -> DirectJob {
        DirectJob {
            name: args.name,
            namespace: self.namespace.clone(),
            image: args.image,
            command: args.command,
            env: args.env.into_iter().collect(),
            labels: args.labels.into_iter().collect(),
            volume_name: args.volume,
            mount_path: args.mount_path,
        }
    }

    fn job_outcome(&self, name: String, state: JobState) -> Outcome {
        Outcome::Job {
            name,
            namespace: self.namespace.clone(),
            state,
        }
    }

    async fn run_deploy(&self, command: DeployCommand) -> Result<Outcome> {
        let scaler = DeploymentScaler::new(self.session).with_conflict_retries(self.conflict_retries);
        let namespace = self.namespace.clone();

        match command {
            DeployCommand::Replicas { name } => {
                let replicas = scaler.replicas(&name, &namespace).await?;
                Ok(Outcome::Replicas {
                    name,
                    namespace,
                    replicas,
                })
            }
            DeployCommand::Scale { name, replicas } | DeployCommand::Up { name, replicas } => {
                scaler.set_replicas(&name, &namespace, replicas).await?;
                Ok(Outcome::Scaled {
                    name,
                    namespace,
                    replicas,
                })
            }
            DeployCommand::Down { name } => {
                scaler.scale_down(&name, &namespace).await?;
                Ok(Outcome::Scaled {
                    name,
                    namespace,
                    replicas: 0,
                })
            }
            DeployCommand::DownAll => {
                let report = scaler.scale_namespace_to_zero(&namespace).await?;
                Ok(Outcome::NamespaceScaled(report))
            }
            DeployCommand::Restart { name } => {
                RestartTrigger::new(self.session)
                    .restart(&name, &namespace)
                    .await?;
                Ok(Outcome::Restarted { name, namespace })
            }
        }
    }

    async fn run_config(&self, command: ConfigCommand) -> Result<Outcome> {
        let ConfigCommand::Create {
            name,
            entries,
            from_file,
            immutable,
        } = command;

        let mut data = match from_file {
            Some(path) => read_entries_file(&path)?,
            None => BTreeMap::new(),
        };
        data.extend(entries);

        let object = ConfigObject {
            name,
            namespace: self.namespace.clone(),
            data,
            immutable,
        };
        ConfigInjector::new(self.session).create_object(&object).await?;
        Ok(Outcome::ConfigCreated {
            keys: object.data.len(),
            name: object.name,
            namespace: object.namespace,
        })
    }
}

fn read_entries_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_entries(&contents).with_context(|| format!("invalid entries in {}", path.display()))
}
