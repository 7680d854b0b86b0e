//! Application Custom Resource Definition
//!
//! An Application groups the components of one deployed app. The controller
//! only reads it; the HPAs it derives carry an owner reference back to it.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{CustomResource, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Component;
use crate::Error;

/// Specification for an Application
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "project.cattle.io",
    version = "v3",
    kind = "Application",
    plural = "applications",
    namespaced,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    /// Components making up the application
    #[serde(default)]
    pub components: Vec<Component>,
}

impl Application {
    /// Owner reference pointing at this Application.
    ///
    /// Requires the object to have been read from the API server (uid set).
    pub fn owner_reference(&self) -> Result<OwnerReference, Error> {
        self.controller_owner_ref(&()).ok_or_else(|| {
            Error::internal_with_context(
                "owner_reference",
                format!("application {} has no uid", self.name_any()),
            )
        })
    }

    /// Components that request autoscaling
    pub fn autoscaled_components(&self) -> impl Iterator<Item = &Component> {
        self.spec
            .components
            .iter()
            .filter(|c| c.opt_traits.autoscaling.is_requested())
    }
}
