//! Gateway backed by a Kubernetes API server

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DynamicObject, PostParams};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use forklift_common::crd::ResourceKind;
use forklift_common::kube_utils::object_ref;
use forklift_common::{Error, Result, FIELD_MANAGER};

use super::{poll_until, ClusterGateway, Predicate, DEFAULT_POLL_INTERVAL};
use crate::builder::WorkflowObject;

/// Real gateway using DynamicObject for the Forklift kinds
pub struct KubeGateway {
    client: Client,
    poll_interval: Duration,
}

impl KubeGateway {
    /// Create a gateway polling at the default interval
    pub fn new(client: Client) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the status poll interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn api(&self, kind: ResourceKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource())
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn create(&self, obj: &WorkflowObject) -> Result<WorkflowObject> {
        let kind = obj.kind();
        let dynamic = obj.to_dynamic()?;
        let created = self
            .api(kind, obj.namespace())
            .create(&Self::post_params(), &dynamic)
            .await
            .map_err(|e| Error::from_kube(obj.object_ref(), e))?;
        info!(kind = %kind, name = %obj.name(), namespace = %obj.namespace(), "Created object");
        WorkflowObject::from_dynamic(kind, created)
    }

    async fn get(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: &str,
    ) -> Result<WorkflowObject> {
        let obj = self
            .api(kind, namespace)
            .get(name)
            .await
            .map_err(|e| Error::from_kube(object_ref(kind.as_str(), namespace, name), e))?;
        WorkflowObject::from_dynamic(kind, obj)
    }

    async fn wait_for_condition(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: &str,
        predicate: Predicate,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<WorkflowObject> {
        let object = object_ref(kind.as_str(), namespace, name);
        poll_until(
            &object,
            self.poll_interval,
            timeout,
            &cancel,
            &predicate,
            || self.get(kind, name, namespace),
        )
        .await
    }

    async fn ensure_secret(&self, secret: &Secret) -> Result<()> {
        let name = secret.metadata.name.as_deref().unwrap_or_default();
        let namespace = secret.metadata.namespace.as_deref().unwrap_or_default();
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);

        match api.create(&Self::post_params(), secret).await {
            Ok(_) => {
                info!(name = %name, namespace = %namespace, "Created credential secret");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                debug!(name = %name, namespace = %namespace, "Credential secret exists, leaving it untouched");
                Ok(())
            }
            Err(e) => Err(Error::from_kube(object_ref("Secret", namespace, name), e)),
        }
    }
}
