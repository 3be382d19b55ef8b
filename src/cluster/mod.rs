mod control_plane;
#[cfg(test)]
pub(crate) mod fake;
mod session;

pub use control_plane::{ControlPlane, KubeControlPlane};
pub use session::{ClusterSession, ClusterSettings, DEFAULT_PROBE_NAMESPACE};
