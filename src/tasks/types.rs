//! Shared types for the saga controller

use crate::tasks::config::ControllerConfig;
use kube::Client;
use std::sync::Arc;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Object has no name in its metadata")]
    MissingObjectKey,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Shared state passed to every reconcile invocation
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,

    /// Namespace the controller operates in
    pub namespace: String,

    /// Controller configuration
    pub config: Arc<ControllerConfig>,
}
