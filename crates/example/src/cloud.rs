//! An in-memory stand-in for a cloud provider.
//!
//! [`InMemoryCloud`] implements [`Provisioner`] by recording resources in a
//! local inventory. Per-type quotas let the demo show what a provider failure
//! does to a run.

use core::time::Duration;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::BoxFuture;
use hashbrown::HashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use stratum_graph::engine::{ProvisionError, ProvisionRequest, ProvisionResponse, Provisioner};

/// A resource the cloud created.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudResource {
    /// Provider-assigned ID.
    pub id: String,
    /// The resource's URN.
    pub urn: String,
    /// The resource type tag.
    pub type_tag: String,
    /// Inputs the resource was created with.
    pub inputs: Map<String, Value>,
}

/// In-memory provisioner.
#[derive(Debug, Default)]
pub struct InMemoryCloud {
    inventory: Mutex<Vec<CloudResource>>,
    quotas: HashMap<String, usize>,
    latency: Option<Duration>,
    next_id: AtomicU64,
}

impl InMemoryCloud {
    /// Creates an empty cloud with no quotas.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits how many resources of `type_tag` can exist.
    #[must_use]
    pub fn with_quota(mut self, type_tag: impl Into<String>, limit: usize) -> Self {
        self.quotas.insert(type_tag.into(), limit);
        self
    }

    /// Delays every provisioning call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Resources created so far, in creation order.
    #[must_use]
    pub fn inventory(&self) -> Vec<CloudResource> {
        self.inventory.lock().clone()
    }

    fn create(&self, request: ProvisionRequest) -> Result<ProvisionResponse, ProvisionError> {
        let mut inventory = self.inventory.lock();

        if let Some(&limit) = self.quotas.get(&request.type_tag) {
            let existing = inventory
                .iter()
                .filter(|r| r.type_tag == request.type_tag)
                .count();
            if existing >= limit {
                return Err(ProvisionError::new("quota exceeded"));
            }
        }

        let serial = self.next_id.fetch_add(1, Ordering::Relaxed);
        let kind = short_type(&request.type_tag);
        let id = format!("{kind}-{serial:04}");
        let crn = format!("crn:v1:stratum:{kind}:{id}");
        inventory.push(CloudResource {
            id: id.clone(),
            urn: request.urn.to_string(),
            type_tag: request.type_tag,
            inputs: request.inputs,
        });

        Ok(ProvisionResponse::new(id)
            .with_output("crn", crn)
            .with_output("state", "ACTIVE"))
    }
}

impl Provisioner for InMemoryCloud {
    fn provision(
        &self,
        request: ProvisionRequest,
    ) -> BoxFuture<'_, Result<ProvisionResponse, ProvisionError>> {
        Box::pin(async move {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            let urn = request.urn.clone();
            let result = self.create(request);
            match &result {
                Ok(response) => tracing::debug!(%urn, id = %response.id, "cloud created resource"),
                Err(err) => tracing::debug!(%urn, %err, "cloud rejected resource"),
            }
            result
        })
    }
}

/// `ibmcloud:index/resourceGroup:ResourceGroup` becomes `resourcegroup`.
fn short_type(type_tag: &str) -> String {
    type_tag
        .rsplit(':')
        .next()
        .unwrap_or(type_tag)
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_graph::config::RunConfig;
    use stratum_graph::resource::Urn;

    fn request(type_tag: &str, name: &str) -> ProvisionRequest {
        ProvisionRequest {
            urn: Urn::new(&RunConfig::new("test"), type_tag, name),
            name: name.to_string(),
            type_tag: type_tag.to_string(),
            inputs: Map::new(),
        }
    }

    #[tokio::test]
    async fn assigns_sequential_ids() {
        let cloud = InMemoryCloud::new();
        let first = cloud.provision(request("cloud:Group", "a")).await.unwrap();
        let second = cloud.provision(request("cloud:Group", "b")).await.unwrap();

        assert_eq!(first.id, Value::from("group-0000"));
        assert_eq!(second.id, Value::from("group-0001"));
        assert_eq!(cloud.inventory().len(), 2);
    }

    #[tokio::test]
    async fn enforces_quota() {
        let cloud = InMemoryCloud::new().with_quota("cloud:Group", 1);
        cloud.provision(request("cloud:Group", "a")).await.unwrap();
        let err = cloud.provision(request("cloud:Group", "b")).await.unwrap_err();

        assert_eq!(err.message(), "quota exceeded");
        assert_eq!(cloud.inventory().len(), 1);
    }
}
