//! Deployment construction for `SagaFinder` resources

use crate::crds::SagaFinder;
use crate::tasks::config::ControllerConfig;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use kube::ResourceExt;
use std::collections::BTreeMap;

/// Selector and pod template labels for a `SagaFinder`'s deployment
///
/// Deployment selectors are immutable after creation, so this must stay
/// stable across rebuilds for the same name.
pub fn labels_for_saga(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), "sagaFinder".to_string()),
        ("sagaFinder_cr".to_string(), name.to_string()),
    ])
}

/// Owner reference linking the deployment back to its `SagaFinder`
///
/// Set once at construction; the update path never touches it. Deleting the
/// `SagaFinder` cascades to the deployment through this reference.
fn owner_reference(saga: &SagaFinder) -> OwnerReference {
    OwnerReference {
        api_version: "event-finder.example.org/v1beta1".to_string(),
        kind: "SagaFinder".to_string(),
        name: saga.name_any(),
        uid: saga.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Build the deployment a `SagaFinder` declares
///
/// Pure and deterministic: replica count comes from the spec, the pod
/// template from operator configuration, and no I/O happens here. Callers
/// persist the result.
pub fn build_deployment(saga: &SagaFinder, config: &ControllerConfig) -> Deployment {
    let labels = labels_for_saga(&saga.name_any());

    Deployment {
        metadata: ObjectMeta {
            name: Some(saga.name_any()),
            namespace: saga.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(saga)]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(saga.spec.size),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: config.workload.container_name.clone(),
                        image: Some(config.workload.image.clone()),
                        ports: Some(vec![ContainerPort {
                            container_port: config.workload.container_port,
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
