mod controller;
mod template;

pub use controller::{JobController, JobState};
pub use template::{
    DirectJob, JobSpec, JobTemplateBuilder, TRIGGER_INFIX, project, projected_job_name,
};
