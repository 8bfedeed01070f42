use crate::crds::SagaFinder;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::ListParams;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn, Instrument};

pub mod config;
pub mod saga;
pub mod types;

// Re-export commonly used items
pub use config::ControllerConfig;
pub use saga::reconcile_saga;
pub use types::{Error, Result};

use types::Context;

/// Main entry point for the saga controller
#[instrument(skip(client), fields(namespace = %namespace))]
pub async fn run_task_controller(client: Client, namespace: String) -> Result<()> {
    info!("Starting SagaFinder controller in namespace: {}", namespace);

    debug!("Loading controller configuration from mounted file...");

    let config = match ControllerConfig::from_mounted_file(&config_path()) {
        Ok(cfg) => {
            debug!("Successfully loaded controller configuration");

            if let Err(validation_error) = cfg.validate() {
                error!("Configuration validation failed: {}", validation_error);
                return Err(Error::ConfigError(validation_error.to_string()));
            }
            debug!("Configuration validation passed");
            cfg
        }
        Err(e) => {
            warn!("Failed to load configuration, using defaults: {}", e);
            let default_config = ControllerConfig::default();

            if let Err(validation_error) = default_config.validate() {
                error!("Default configuration is invalid: {}", validation_error);
                return Err(Error::ConfigError(validation_error.to_string()));
            }
            default_config
        }
    };

    // Create shared context
    let context = Arc::new(Context {
        client: client.clone(),
        namespace: namespace.clone(),
        config: Arc::new(config),
    });

    // Startup visibility: list existing SagaFinders so we can see what the
    // controller should observe
    let saga_api: Api<SagaFinder> = Api::namespaced(client.clone(), &namespace);
    match saga_api.list(&ListParams::default()).await {
        Ok(list) => {
            info!(
                "Controller startup: found {} SagaFinder(s) in namespace {}",
                list.items.len(),
                namespace
            );
            for saga in list.items {
                info!(
                    "Existing SagaFinder: name={}, size={}",
                    saga.name_any(),
                    saga.spec.size
                );
            }
        }
        Err(e) => {
            error!("Failed to list SagaFinders at startup: {}", e);
        }
    }

    info!("Starting SagaFinder controller loop...");

    let deployments_api: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
    let watcher_config = Config::default().any_semantic();

    // Watch SagaFinders and the deployments they own, so changes to either
    // re-trigger reconciliation for the owning key. The runtime coalesces
    // duplicate deliveries and serializes in-flight work per key.
    Controller::new(saga_api, watcher_config.clone())
        .owns(deployments_api, watcher_config)
        .run(reconcile_saga, error_policy, context)
        .for_each(|reconciliation_result| {
            let saga_span = tracing::info_span!("saga_reconciliation_result");
            async move {
                match reconciliation_result {
                    Ok(saga_resource) => {
                        info!(resource = ?saga_resource, "SagaFinder reconciliation successful");
                    }
                    Err(reconciliation_err) => {
                        error!(error = ?reconciliation_err, "SagaFinder reconciliation error");
                    }
                }
            }
            .instrument(saga_span)
        })
        .await;

    info!("SagaFinder controller shutting down");
    Ok(())
}

fn config_path() -> String {
    std::env::var("CONTROLLER_CONFIG_PATH").unwrap_or_else(|_| "/config/config.yaml".to_string())
}

/// Error policy for the SagaFinder controller - backoff and retry
///
/// Retry scheduling lives here, not in the reconciler: every failed
/// invocation is redelivered after the configured backoff and re-reads
/// current state from scratch.
#[instrument(skip(ctx), fields(saga_name = %saga.name_any(), namespace = %ctx.namespace))]
fn error_policy(saga: Arc<SagaFinder>, err: &Error, ctx: Arc<Context>) -> Action {
    warn!(
        error = ?err,
        saga_name = %saga.name_any(),
        "SagaFinder reconciliation failed - requeueing with backoff"
    );
    Action::requeue(Duration::from_secs(ctx.config.requeue.error_backoff_seconds))
}
