//! `ObjectStore` backed by the Kubernetes API.

use super::{ObjectStore, StoreError};
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::PostParams;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::marker::PhantomData;

#[derive(Clone)]
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> std::fmt::Debug for KubeStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl<K> KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }

    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Map a `kube::Error` from a call on `namespace/name` into a `StoreError`
fn map_kube_error<K>(error: kube::Error, namespace: &str, name: &str) -> StoreError
where
    K: Resource<DynamicType = ()>,
{
    let kind = K::kind(&()).to_string();
    match error {
        kube::Error::Api(response) if response.code == 404 => StoreError::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(response)
            if response.code == 409 && response.reason == "AlreadyExists" =>
        {
            StoreError::AlreadyExists {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            }
        }
        kube::Error::Api(response) if response.code == 409 => StoreError::Conflict {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        other => StoreError::Transport(other.to_string()),
    }
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        self.api(namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_kube_error::<K>(e, namespace, name))
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        let name = object.name_any();
        self.api(namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|e| map_kube_error::<K>(e, namespace, &name))
    }

    async fn update(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        let name = object.name_any();
        self.api(namespace)
            .replace(&name, &PostParams::default(), object)
            .await
            .map_err(|e| map_kube_error::<K>(e, namespace, &name))
    }
}
