//! Terminal output: a spinner while waiting on a job, colored results.
//!
//! Spinners come from `indicatif`; colors from `console`.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::commands::Outcome;
use crate::error::{FailureKind, KubecycleError};
use crate::jobs::JobState;

/// Spinner shown while `job wait` (or `--wait`) polls a job.
pub struct JobProgress {
    pb: ProgressBar,
}

impl JobProgress {
    pub fn start(label: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(label.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    /// Updates the spinner after each poll.
    pub fn polled(&self, attempt: u32, state: JobState) {
        self.pb.set_message(format!("poll {attempt}: {state}"));
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

/// Prints the result of a successful command.
pub fn print_outcome(outcome: &Outcome) {
    let green = Style::new().green().bold();
    let check = green.apply_to("✓");
    match outcome {
        Outcome::Probed { environment } => {
            println!("  {check} Cluster {environment} is reachable");
        }
        Outcome::JobSubmitted { name, namespace } => {
            println!("  {check} Job {namespace}/{name} submitted");
        }
        Outcome::Job {
            name,
            namespace,
            state,
        } => print_job_state(name, namespace, *state),
        Outcome::Replicas {
            name,
            namespace,
            replicas,
        } => {
            println!("{namespace}/{name}: {replicas} replicas");
        }
        Outcome::Scaled {
            name,
            namespace,
            replicas,
        } => {
            println!("  {check} Deployment {namespace}/{name} scaled to {replicas}");
        }
        Outcome::NamespaceScaled(report) => {
            println!(
                "  {check} Scaled {} deployments in {} to zero",
                report.scaled.len(),
                report.namespace
            );
            for name in &report.scaled {
                println!("    - {name}");
            }
        }
        Outcome::Restarted { name, namespace } => {
            println!("  {check} Rollout restart triggered for {namespace}/{name}");
        }
        Outcome::ConfigCreated {
            name,
            namespace,
            keys,
        } => {
            println!("  {check} Config map {namespace}/{name} created with {keys} keys");
        }
    }
}

fn print_job_state(name: &str, namespace: &str, state: JobState) {
    let style = match state {
        JobState::Running => Style::new().yellow(),
        JobState::Succeeded { .. } => Style::new().green().bold(),
        JobState::Failed { .. } => Style::new().red().bold(),
    };
    let detail = match state {
        JobState::Running => String::new(),
        JobState::Succeeded { succeeded } => format!(" ({succeeded} succeeded)"),
        JobState::Failed { failed } => format!(" ({failed} failed)"),
    };
    println!("{namespace}/{name}: {}{detail}", style.apply_to(state));
}

/// Prints a failed command to stderr, labelled with its failure kind.
pub fn print_error(err: &anyhow::Error) {
    let red = Style::new().red().bold();
    let label = match err.downcast_ref::<KubecycleError>().map(|e| e.failure_kind()) {
        Some(FailureKind::System) => "system error",
        Some(FailureKind::Business) => "error",
        None => "error",
    };
    eprintln!("  {} {label}: {err:#}", red.apply_to("✗"));
}
