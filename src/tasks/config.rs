//! Saga Controller Configuration
//!
//! Configuration for the SagaFinder controller: the fixed pod template the
//! managed deployment runs, and the requeue delays the controller uses.

use serde::{Deserialize, Serialize};

/// Main controller configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Managed workload configuration
    #[serde(default)]
    pub workload: WorkloadConfig,

    /// Requeue configuration
    #[serde(default)]
    pub requeue: RequeueConfig,
}

/// Pod template settings for the managed deployment
///
/// These are operator-level constants, not part of the `SagaFinder` spec;
/// only the replica count is user-declared.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkloadConfig {
    /// Container image to run
    #[serde(default = "default_image")]
    pub image: String,

    /// Container port to expose
    #[serde(default = "default_container_port", rename = "containerPort")]
    pub container_port: i32,

    /// Container name
    #[serde(default = "default_container_name", rename = "containerName")]
    pub container_name: String,
}

/// Requeue delays
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequeueConfig {
    /// Seconds to wait before re-verifying convergence after a replica update
    #[serde(default = "default_drift_recheck", rename = "driftRecheckSeconds")]
    pub drift_recheck_seconds: u64,

    /// Seconds to wait before redelivering a key whose reconcile failed
    #[serde(default = "default_error_backoff", rename = "errorBackoffSeconds")]
    pub error_backoff_seconds: u64,
}

fn default_image() -> String {
    "nginx:latest".to_string()
}

fn default_container_port() -> i32 {
    80
}

fn default_container_name() -> String {
    "sagafinder".to_string()
}

fn default_drift_recheck() -> u64 {
    5
}

fn default_error_backoff() -> u64 {
    10
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        WorkloadConfig {
            image: default_image(),
            container_port: default_container_port(),
            container_name: default_container_name(),
        }
    }
}

impl Default for RequeueConfig {
    fn default() -> Self {
        RequeueConfig {
            drift_recheck_seconds: default_drift_recheck(),
            error_backoff_seconds: default_error_backoff(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from a mounted file path
    pub fn from_mounted_file(config_path: &str) -> Result<Self, anyhow::Error> {
        let config_str = std::fs::read_to_string(config_path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {config_path}: {e}"))?;

        let config: ControllerConfig = serde_yaml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config YAML: {e}"))?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.workload.image.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "workload.image must not be empty; the managed deployment cannot run without an image"
            ));
        }

        if !(1..=65535).contains(&self.workload.container_port) {
            return Err(anyhow::anyhow!(
                "workload.containerPort must be in 1..=65535, got {}",
                self.workload.container_port
            ));
        }

        if self.workload.container_name.trim().is_empty() {
            return Err(anyhow::anyhow!("workload.containerName must not be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml = r#"
workload:
  image: "nginx:1.27"
  containerPort: 8080
  containerName: "web"

requeue:
  driftRecheckSeconds: 2
  errorBackoffSeconds: 30
"#;

        let config: ControllerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.workload.image, "nginx:1.27");
        assert_eq!(config.workload.container_port, 8080);
        assert_eq!(config.workload.container_name, "web");
        assert_eq!(config.requeue.drift_recheck_seconds, 2);
        assert_eq!(config.requeue.error_backoff_seconds, 30);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ControllerConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.workload.image, "nginx:latest");
        assert_eq!(config.workload.container_port, 80);
        assert_eq!(config.workload.container_name, "sagafinder");
        assert_eq!(config.requeue.drift_recheck_seconds, 5);
        assert_eq!(config.requeue.error_backoff_seconds, 10);
    }

    #[test]
    fn test_partial_config_fills_missing_fields() {
        let yaml = r#"
workload:
  image: "httpd:2.4"
"#;

        let config: ControllerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.workload.image, "httpd:2.4");
        assert_eq!(config.workload.container_port, 80);
        assert_eq!(config.requeue.error_backoff_seconds, 10);
    }

    #[test]
    fn validate_rejects_empty_image() {
        let mut config = ControllerConfig::default();
        config.workload.image = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_port() {
        let mut config = ControllerConfig::default();
        config.workload.container_port = 0;
        assert!(config.validate().is_err());

        config.workload.container_port = 70000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(ControllerConfig::default().validate().is_ok());
    }
}
