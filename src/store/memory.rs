//! In-process `ObjectStore`.
//!
//! Behaves like the API server for the calls the controller makes: every
//! write bumps a store-wide resource version, `create` refuses taken names and
//! `update` refuses stale resource versions. Failures can be injected per
//! operation, and every call yields to the scheduler once so that concurrent
//! callers interleave between their read and their write.

use super::{ObjectStore, StoreError};
use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Store call that a failure can be injected into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    Create,
    Update,
}

#[derive(Debug)]
struct State<K> {
    objects: BTreeMap<(String, String), K>,
    resource_version: u64,
    creates: usize,
    updates: usize,
    failures: VecDeque<(Operation, String)>,
}

#[derive(Debug)]
pub struct MemoryStore<K> {
    state: Mutex<State<K>>,
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                objects: BTreeMap::new(),
                resource_version: 0,
                creates: 0,
                updates: 0,
                failures: VecDeque::new(),
            }),
        }
    }
}

impl<K> MemoryStore<K>
where
    K: Resource + Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `object` as-is, bypassing existence checks and write counters
    ///
    /// Used to seed pre-existing cluster state.
    pub fn insert(&self, namespace: &str, mut object: K) -> K {
        let mut state = self.lock();
        state.resource_version += 1;
        object.meta_mut().namespace = Some(namespace.to_string());
        object.meta_mut().resource_version = Some(state.resource_version.to_string());
        state
            .objects
            .insert((namespace.to_string(), object.name_any()), object.clone());
        object
    }

    /// Delete an object behind the controller's back
    pub fn remove(&self, namespace: &str, name: &str) -> Option<K> {
        self.lock()
            .objects
            .remove(&(namespace.to_string(), name.to_string()))
    }

    /// Current copy of an object without going through the async interface
    #[must_use]
    pub fn peek(&self, namespace: &str, name: &str) -> Option<K> {
        self.lock()
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().objects.is_empty()
    }

    /// Number of successful `create` calls
    #[must_use]
    pub fn creates(&self) -> usize {
        self.lock().creates
    }

    /// Number of successful `update` calls
    #[must_use]
    pub fn updates(&self) -> usize {
        self.lock().updates
    }

    /// Make the next call of `operation` fail with a transport error
    pub fn fail_next(&self, operation: Operation, message: impl Into<String>) {
        self.lock().failures.push_back((operation, message.into()));
    }

    fn take_failure(state: &mut State<K>, operation: Operation) -> Option<StoreError> {
        let index = state.failures.iter().position(|(op, _)| *op == operation)?;
        state
            .failures
            .remove(index)
            .map(|(_, message)| StoreError::Transport(message))
    }
}

fn kind_of<K: Resource>() -> String
where
    K::DynamicType: Default,
{
    K::kind(&K::DynamicType::default()).to_string()
}

#[async_trait]
impl<K> ObjectStore<K> for MemoryStore<K>
where
    K: Resource + Clone + Send + Sync + 'static,
    K::DynamicType: Default,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        if let Some(error) = Self::take_failure(&mut state, Operation::Get) {
            return Err(error);
        }
        Ok(state
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        if let Some(error) = Self::take_failure(&mut state, Operation::Create) {
            return Err(error);
        }

        let key = (namespace.to_string(), object.name_any());
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: kind_of::<K>(),
                namespace: key.0,
                name: key.1,
            });
        }

        state.resource_version += 1;
        state.creates += 1;
        let mut stored = object.clone();
        stored.meta_mut().namespace = Some(namespace.to_string());
        stored.meta_mut().resource_version = Some(state.resource_version.to_string());
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        if let Some(error) = Self::take_failure(&mut state, Operation::Update) {
            return Err(error);
        }

        let key = (namespace.to_string(), object.name_any());
        let Some(current) = state.objects.get(&key) else {
            return Err(StoreError::NotFound {
                kind: kind_of::<K>(),
                namespace: key.0,
                name: key.1,
            });
        };

        if let Some(expected) = object.resource_version() {
            if current.resource_version().as_deref() != Some(expected.as_str()) {
                return Err(StoreError::Conflict {
                    kind: kind_of::<K>(),
                    namespace: key.0,
                    name: key.1,
                });
            }
        }

        state.resource_version += 1;
        state.updates += 1;
        let mut stored = object.clone();
        stored.meta_mut().namespace = Some(namespace.to_string());
        stored.meta_mut().resource_version = Some(state.resource_version.to_string());
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }
}
