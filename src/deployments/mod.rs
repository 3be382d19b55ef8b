mod restart;
mod scaler;

pub use restart::{RESTARTED_AT_ANNOTATION, RestartTrigger, restart_patch};
pub use scaler::{DEFAULT_CONFLICT_RETRIES, DeploymentScaler, ScaleReport};
