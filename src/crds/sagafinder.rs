//! `SagaFinder` Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `SagaFinder` CRD declaring how many replicas its deployment should run
///
/// The controller owns a deployment with the same namespace/name and keeps
/// its replica count converged to `size`. The deployment carries an owner
/// reference back to the `SagaFinder`, so deleting the resource cascades.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "event-finder.example.org",
    version = "v1beta1",
    kind = "SagaFinder"
)]
#[kube(namespaced)]
#[kube(printcolumn = r#"{"name":"Size","type":"integer","jsonPath":".spec.size"}"#)]
#[kube(printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#)]
pub struct SagaFinderSpec {
    /// Desired number of deployment replicas
    pub size: i32,
}
