//! Command line interface built on clap.
//!
//! [`Cli`] carries the global connection flags; [`Command`] groups the
//! operations by resource (job, deploy, config) plus a bare `probe`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// kubecycle: create, observe, scale and restart Kubernetes workloads.
#[derive(Debug, Parser)]
#[command(name = "kubecycle", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file to load instead of ./kubecycle.toml.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Environment label for the target cluster.
    #[arg(long = "env", global = true)]
    pub environment: Option<String>,

    /// Kubeconfig path.
    #[arg(long, global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context.
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Namespace to operate in.
    #[arg(long, short, global = true)]
    pub namespace: Option<String>,

    /// Print debug logs.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Checks that the cluster is reachable with the configured credentials.
    Probe,

    /// Batch jobs.
    #[command(subcommand)]
    Job(JobCommand),

    /// Deployments.
    #[command(subcommand)]
    Deploy(DeployCommand),

    /// Config maps.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum JobCommand {
    /// Submits a job built from an image and command.
    Run(RunArgs),

    /// Creates a job from a cronjob's pod template.
    Trigger {
        /// Name of the cronjob to copy.
        cronjob: String,

        /// Wait for the created job to finish.
        #[arg(long)]
        wait: bool,
    },

    /// Reports whether a job is running, succeeded or failed.
    Status { name: String },

    /// Polls a job until it succeeds or fails.
    Wait { name: String },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Job name; also used as the container name.
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub image: String,

    /// Environment variable, repeatable.
    #[arg(long = "env-var", short = 'e', value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub env: Vec<(String, String)>,

    /// Job label, repeatable.
    #[arg(long = "label", short = 'l', value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub labels: Vec<(String, String)>,

    /// PersistentVolumeClaim to mount; needs --mount-path.
    #[arg(long)]
    pub volume: Option<String>,

    #[arg(long)]
    pub mount_path: Option<String>,

    /// Wait for the job to finish.
    #[arg(long)]
    pub wait: bool,

    /// Container command, after `--`.
    #[arg(last = true)]
    pub command: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum DeployCommand {
    /// Prints the desired replica count.
    Replicas { name: String },

    /// Sets the desired replica count.
    Scale {
        name: String,
        #[arg(value_parser = clap::value_parser!(i32).range(0..))]
        replicas: i32,
    },

    /// Scales a deployment to zero.
    Down { name: String },

    /// Scales a deployment to the given count.
    Up {
        name: String,
        #[arg(value_parser = clap::value_parser!(i32).range(1..))]
        replicas: i32,
    },

    /// Scales every deployment in the namespace to zero.
    DownAll,

    /// Triggers a rolling restart.
    Restart { name: String },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Creates a config map; fails if the name is taken.
    Create {
        name: String,

        /// Data entry, repeatable.
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        entries: Vec<(String, String)>,

        /// File of KEY=VALUE lines.
        #[arg(long)]
        from_file: Option<PathBuf>,

        /// Mark the config map immutable.
        #[arg(long)]
        immutable: bool,
    },
}

/// Parses `KEY=VALUE`; the value may itself contain `=`.
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{s}`"));
    }
    Ok((key.to_string(), value.to_string()))
}
