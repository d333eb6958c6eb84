pub mod client;
pub mod cluster;
pub mod error;
pub mod mock;
pub mod resource;
pub mod services;

pub use client::KubernetesClient;
pub use cluster::{ClusterClient, Credential};
pub use error::KubeError;
pub use mock::MockClient;
pub use services::ServiceDetails;
