pub mod cluster;
pub mod configuration;
pub mod lifecycle;
pub mod manifest;
pub mod wait;

pub use crate::cluster::model::{ClusterError, ClusterObject, ControlPlane, PodView};
pub use crate::lifecycle::{Lifecycle, LifecycleError, SharedControlPlane};
pub use crate::wait::{RetryConfig, WaitConfig};
