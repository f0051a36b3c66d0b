// Allow unused assignments for diagnostic fields - they're used by the thiserror/miette macros
#![allow(unused_assignments)]

pub mod error;
pub mod kube_client;
pub mod metrics;
pub mod mock;
pub mod traits;

pub use error::{ClientError, Result};
pub use kube_client::KubeClient;
pub use metrics::{MetricSpec, MetricsPoller, MetricsSource, Sample};
pub use mock::MockClient;
pub use traits::{OrchestratorClient, PodEvent};
