use super::resources::build_deployment;
use super::store::{KubeSagaStore, SagaStore};
use crate::crds::SagaFinder;
use crate::tasks::config::ControllerConfig;
use crate::tasks::types::{Context, Error, Result};
use k8s_openapi::api::apps::v1::DeploymentSpec;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

#[instrument(skip(ctx), fields(saga_name = %saga.name_any(), namespace = %ctx.namespace))]
pub async fn reconcile_saga(saga: Arc<SagaFinder>, ctx: Arc<Context>) -> Result<Action> {
    let name = saga.metadata.name.as_deref().ok_or(Error::MissingObjectKey)?;

    debug!("Reconciling SagaFinder: {}", name);

    let store = KubeSagaStore::new(ctx.client.clone(), &ctx.namespace);
    reconcile_with_store(name, &store, &ctx.config).await
}

/// One level-triggered convergence pass for a `SagaFinder` key
///
/// Recomputes the full delta between observed and desired state on every
/// invocation, so duplicate, reordered, or coalesced notifications are
/// harmless: re-running against a converged pair is a no-op. One attempt per
/// invocation; failed store calls surface to the queue's error policy, which
/// owns retry scheduling.
pub async fn reconcile_with_store(
    name: &str,
    store: &dyn SagaStore,
    config: &ControllerConfig,
) -> Result<Action> {
    let Some(saga) = store.get_saga(name).await? else {
        // Deleted between enqueue and processing. The owned deployment is
        // garbage-collected through its owner reference, so there is
        // nothing left to do for this key.
        info!("SagaFinder {} no longer exists, ignoring", name);
        return Ok(Action::await_change());
    };

    let Some(found) = store.get_deployment(name).await? else {
        info!("Creating deployment for SagaFinder {}", name);
        let deployment = build_deployment(&saga, config);
        store.create_deployment(&deployment).await?;
        // The watch on the newly created deployment delivers the
        // verification pass.
        return Ok(Action::await_change());
    };

    let size = saga.spec.size;
    let observed = found.spec.as_ref().and_then(|spec| spec.replicas);
    if observed == Some(size) {
        debug!("Deployment {} already at {} replicas", name, size);
        return Ok(Action::await_change());
    }

    info!(
        "Scaling deployment {} from {:?} to {} replicas",
        name, observed, size
    );

    let mut desired = found;
    desired
        .spec
        .get_or_insert_with(DeploymentSpec::default)
        .replicas = Some(size);
    store.update_deployment(&desired).await?;

    // The update can race other writers; take another look shortly.
    Ok(Action::requeue(Duration::from_secs(
        config.requeue.drift_recheck_seconds,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::SagaFinderSpec;
    use async_trait::async_trait;
    use k8s_openapi::api::apps::v1::Deployment;
    use kube::core::ErrorResponse;
    use std::sync::Mutex;

    /// In-memory stand-in for the cluster, recording every store call
    #[derive(Default)]
    struct FakeStore {
        saga: Mutex<Option<SagaFinder>>,
        deployment: Mutex<Option<Deployment>>,
        ops: Mutex<Vec<String>>,
        fail_create_code: Option<u16>,
        fail_update_code: Option<u16>,
    }

    impl FakeStore {
        fn with_saga(name: &str, size: i32) -> Self {
            let store = FakeStore::default();
            *store.saga.lock().unwrap() = Some(saga(name, size));
            store
        }

        fn ops(&self) -> Vec<String> {
            self.ops.lock().unwrap().clone()
        }

        fn writes(&self) -> Vec<String> {
            self.ops()
                .into_iter()
                .filter(|op| op == "create" || op == "update")
                .collect()
        }

        fn stored_replicas(&self) -> Option<i32> {
            self.deployment
                .lock()
                .unwrap()
                .as_ref()
                .and_then(|dep| dep.spec.as_ref())
                .and_then(|spec| spec.replicas)
        }
    }

    fn saga(name: &str, size: i32) -> SagaFinder {
        let mut saga = SagaFinder::new(name, SagaFinderSpec { size });
        saga.metadata.namespace = Some("default".to_string());
        saga.metadata.uid = Some("test-uid".to_string());
        saga
    }

    fn api_error(code: u16, reason: &str) -> Error {
        Error::KubeError(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} injected by test"),
            reason: reason.to_string(),
            code,
        }))
    }

    #[async_trait]
    impl SagaStore for FakeStore {
        async fn get_saga(&self, _name: &str) -> Result<Option<SagaFinder>> {
            self.ops.lock().unwrap().push("get_saga".to_string());
            Ok(self.saga.lock().unwrap().clone())
        }

        async fn get_deployment(&self, _name: &str) -> Result<Option<Deployment>> {
            self.ops.lock().unwrap().push("get_deployment".to_string());
            Ok(self.deployment.lock().unwrap().clone())
        }

        async fn create_deployment(&self, deployment: &Deployment) -> Result<()> {
            self.ops.lock().unwrap().push("create".to_string());
            if let Some(code) = self.fail_create_code {
                return Err(api_error(code, "InternalError"));
            }
            *self.deployment.lock().unwrap() = Some(deployment.clone());
            Ok(())
        }

        async fn update_deployment(&self, deployment: &Deployment) -> Result<()> {
            self.ops.lock().unwrap().push("update".to_string());
            if let Some(code) = self.fail_update_code {
                return Err(api_error(code, "Conflict"));
            }
            *self.deployment.lock().unwrap() = Some(deployment.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn creates_deployment_when_absent() {
        let store = FakeStore::with_saga("saga1", 3);
        let config = ControllerConfig::default();

        let action = reconcile_with_store("saga1", &store, &config)
            .await
            .unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(store.writes(), vec!["create"]);
        assert_eq!(store.stored_replicas(), Some(3));

        let dep = store.deployment.lock().unwrap().clone().unwrap();
        assert_eq!(dep.metadata.name.as_deref(), Some("saga1"));
        let owner = &dep.metadata.owner_references.as_ref().unwrap()[0];
        assert_eq!(owner.name, "saga1");
        assert_eq!(owner.controller, Some(true));
    }

    #[tokio::test]
    async fn second_pass_after_create_is_a_no_op() {
        let store = FakeStore::with_saga("saga1", 3);
        let config = ControllerConfig::default();

        reconcile_with_store("saga1", &store, &config)
            .await
            .unwrap();
        let action = reconcile_with_store("saga1", &store, &config)
            .await
            .unwrap();

        assert_eq!(action, Action::await_change());
        // Only the first pass wrote anything.
        assert_eq!(store.writes(), vec!["create"]);
        assert_eq!(store.stored_replicas(), Some(3));
    }

    #[tokio::test]
    async fn done_without_further_reads_when_saga_deleted() {
        let store = FakeStore::default();
        let config = ControllerConfig::default();

        let action = reconcile_with_store("saga1", &store, &config)
            .await
            .unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(store.ops(), vec!["get_saga"]);
    }

    #[tokio::test]
    async fn corrects_replica_drift_and_requeues() {
        let store = FakeStore::with_saga("saga1", 5);
        let config = ControllerConfig::default();

        let mut dep = build_deployment(&saga("saga1", 5), &config);
        dep.spec.as_mut().unwrap().replicas = Some(3);
        *store.deployment.lock().unwrap() = Some(dep);

        let action = reconcile_with_store("saga1", &store, &config)
            .await
            .unwrap();

        assert_eq!(
            action,
            Action::requeue(Duration::from_secs(config.requeue.drift_recheck_seconds))
        );
        assert_eq!(store.writes(), vec!["update"]);
        assert_eq!(store.stored_replicas(), Some(5));
    }

    #[tokio::test]
    async fn converged_pair_is_stable() {
        let store = FakeStore::with_saga("saga1", 4);
        let config = ControllerConfig::default();

        let dep = build_deployment(&saga("saga1", 4), &config);
        *store.deployment.lock().unwrap() = Some(dep);

        let action = reconcile_with_store("saga1", &store, &config)
            .await
            .unwrap();

        assert_eq!(action, Action::await_change());
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn repeated_converged_passes_stay_done() {
        let store = FakeStore::with_saga("saga1", 2);
        let config = ControllerConfig::default();

        let dep = build_deployment(&saga("saga1", 2), &config);
        *store.deployment.lock().unwrap() = Some(dep);

        for _ in 0..3 {
            let action = reconcile_with_store("saga1", &store, &config)
                .await
                .unwrap();
            assert_eq!(action, Action::await_change());
        }

        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn create_failure_surfaces_as_error() {
        let mut store = FakeStore::with_saga("saga1", 3);
        store.fail_create_code = Some(503);
        let config = ControllerConfig::default();

        let result = reconcile_with_store("saga1", &store, &config).await;

        assert!(matches!(result, Err(Error::KubeError(_))));
        assert!(store.deployment.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_update_conflict_surfaces_as_error() {
        let mut store = FakeStore::with_saga("saga1", 5);
        store.fail_update_code = Some(409);
        let config = ControllerConfig::default();

        let mut dep = build_deployment(&saga("saga1", 5), &config);
        dep.spec.as_mut().unwrap().replicas = Some(3);
        *store.deployment.lock().unwrap() = Some(dep);

        let result = reconcile_with_store("saga1", &store, &config).await;

        assert!(matches!(result, Err(Error::KubeError(_))));
        // The stored object keeps its pre-update replica count.
        assert_eq!(store.stored_replicas(), Some(3));
    }

    #[tokio::test]
    async fn scale_to_zero_is_propagated() {
        let store = FakeStore::with_saga("saga1", 0);
        let config = ControllerConfig::default();

        let dep = build_deployment(&saga("saga1", 3), &config);
        *store.deployment.lock().unwrap() = Some(dep);

        reconcile_with_store("saga1", &store, &config)
            .await
            .unwrap();

        assert_eq!(store.stored_replicas(), Some(0));
    }
}
