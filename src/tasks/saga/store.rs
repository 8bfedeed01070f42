//! Typed object access for the saga reconciler

use crate::crds::SagaFinder;
use crate::tasks::types::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, PostParams};
use kube::Client;

/// Store operations the reconciler needs
///
/// The reconciler is written against this trait rather than `kube::Api`
/// directly so unit tests can substitute an in-memory store for a live
/// cluster. `Ok(None)` models not-found; every other failure is `Err`.
#[async_trait]
pub trait SagaStore: Send + Sync {
    async fn get_saga(&self, name: &str) -> Result<Option<SagaFinder>>;

    async fn get_deployment(&self, name: &str) -> Result<Option<Deployment>>;

    async fn create_deployment(&self, deployment: &Deployment) -> Result<()>;

    /// Replace the deployment, carrying its resourceVersion so a stale
    /// write is rejected by the API server rather than silently applied.
    async fn update_deployment(&self, deployment: &Deployment) -> Result<()>;
}

/// Production store backed by namespaced API handles
pub struct KubeSagaStore {
    sagas: Api<SagaFinder>,
    deployments: Api<Deployment>,
}

impl KubeSagaStore {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            sagas: Api::namespaced(client.clone(), namespace),
            deployments: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl SagaStore for KubeSagaStore {
    async fn get_saga(&self, name: &str) -> Result<Option<SagaFinder>> {
        match self.sagas.get(name).await {
            Ok(saga) => Ok(Some(saga)),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_deployment(&self, name: &str) -> Result<Option<Deployment>> {
        match self.deployments.get(name).await {
            Ok(deployment) => Ok(Some(deployment)),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<()> {
        self.deployments
            .create(&PostParams::default(), deployment)
            .await?;
        Ok(())
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<()> {
        let name = deployment
            .metadata
            .name
            .as_deref()
            .ok_or(Error::MissingObjectKey)?;

        self.deployments
            .replace(name, &PostParams::default(), deployment)
            .await?;
        Ok(())
    }
}
