//! # Event Filter
//!
//! Decides which watch notifications start a reconciliation.
//!
//! The watch stream does not say whether an applied object is new or merely
//! changed, so the filter remembers a fingerprint per object key:
//!
//! - an object seen for the first time always triggers,
//! - an object seen before triggers only when its fingerprint changed,
//! - deletes forget the key, and trigger only for kinds that are put back
//!   when removed (the managed secret),
//! - a relist (watch restart) forgets keys that were not listed again.
//!
//! Secrets use a constant fingerprint, so only their creation triggers and
//! the controller's own writes do not loop back. ServiceAccounts fingerprint
//! their generation and pull secret names, so metadata-only updates are
//! ignored.

use crate::controller::reconciler::ObjectKey;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use std::collections::{HashMap, HashSet};

/// Part of an object whose change warrants a reconciliation
pub trait Fingerprint {
    type Print: PartialEq + Clone + Send + Sync;

    /// Whether deleting the object calls for a reconciliation
    const RECREATE_ON_DELETE: bool = false;

    fn fingerprint(&self) -> Self::Print;
}

impl Fingerprint for Secret {
    type Print = ();

    const RECREATE_ON_DELETE: bool = true;

    fn fingerprint(&self) -> Self::Print {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccountPrint {
    generation: Option<i64>,
    pull_secrets: Vec<String>,
}

impl Fingerprint for ServiceAccount {
    type Print = ServiceAccountPrint;

    fn fingerprint(&self) -> Self::Print {
        ServiceAccountPrint {
            generation: self.metadata.generation,
            pull_secrets: self
                .image_pull_secrets
                .iter()
                .flatten()
                .map(|reference| reference.name.clone())
                .collect(),
        }
    }
}

#[derive(Debug)]
pub struct EventFilter<P> {
    seen: HashMap<ObjectKey, P>,
    relisted: Option<HashSet<ObjectKey>>,
}

impl<P> Default for EventFilter<P> {
    fn default() -> Self {
        Self {
            seen: HashMap::new(),
            relisted: None,
        }
    }
}

impl<P> EventFilter<P>
where
    P: PartialEq + Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an added or modified object; true when it should be reconciled
    pub fn on_apply(&mut self, key: ObjectKey, print: P) -> bool {
        if let Some(relisted) = self.relisted.as_mut() {
            relisted.insert(key.clone());
        }
        match self.seen.insert(key, print.clone()) {
            None => true,
            Some(previous) => previous != print,
        }
    }

    /// Record a deleted object
    pub fn on_delete(&mut self, key: &ObjectKey) {
        self.seen.remove(key);
        if let Some(relisted) = self.relisted.as_mut() {
            relisted.remove(key);
        }
    }

    /// A relist started; objects listed until [`end_relist`](Self::end_relist) are kept
    pub fn begin_relist(&mut self) {
        self.relisted = Some(HashSet::new());
    }

    /// The relist completed; forget every object it did not mention
    ///
    /// Returns the forgotten keys.
    pub fn end_relist(&mut self) -> Vec<ObjectKey> {
        let Some(relisted) = self.relisted.take() else {
            return Vec::new();
        };
        let mut forgotten: Vec<ObjectKey> = self
            .seen
            .keys()
            .filter(|key| !relisted.contains(*key))
            .cloned()
            .collect();
        for key in &forgotten {
            self.seen.remove(key);
        }
        forgotten.sort();
        forgotten
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::LocalObjectReference;
    use kube::api::ObjectMeta;

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new("team-a", name)
    }

    fn service_account(pull_secrets: &[&str], annotation: Option<&str>) -> ServiceAccount {
        ServiceAccount {
            metadata: ObjectMeta {
                name: Some("builder".to_string()),
                annotations: annotation.map(|value| {
                    std::iter::once(("note".to_string(), value.to_string())).collect()
                }),
                ..Default::default()
            },
            image_pull_secrets: Some(
                pull_secrets
                    .iter()
                    .map(|name| LocalObjectReference {
                        name: (*name).to_string(),
                    })
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_secrets_trigger_only_on_first_sighting() {
        let mut filter = EventFilter::new();
        let secret = Secret::default();

        assert!(filter.on_apply(key("registry-secret"), secret.fingerprint()));
        assert!(
            !filter.on_apply(key("registry-secret"), secret.fingerprint()),
            "Updates, including our own writes, are ignored"
        );

        filter.on_delete(&key("registry-secret"));
        assert!(
            filter.on_apply(key("registry-secret"), secret.fingerprint()),
            "Recreation counts as a new object"
        );
    }

    #[test]
    fn test_service_account_metadata_updates_are_ignored() {
        let mut filter = EventFilter::new();

        assert!(filter.on_apply(key("builder"), service_account(&["a"], None).fingerprint()));
        assert!(!filter.on_apply(
            key("builder"),
            service_account(&["a"], Some("touched")).fingerprint()
        ));
        assert!(filter.on_apply(
            key("builder"),
            service_account(&[], Some("touched")).fingerprint()
        ));
    }

    #[test]
    fn test_relist_forgets_objects_deleted_while_disconnected() {
        let mut filter = EventFilter::new();
        filter.on_apply(key("kept"), ());
        filter.on_apply(key("gone"), ());

        filter.begin_relist();
        assert!(!filter.on_apply(key("kept"), ()), "Known objects stay quiet on relist");
        assert!(filter.on_apply(key("new"), ()), "Objects created while disconnected trigger");
        let forgotten = filter.end_relist();

        assert_eq!(forgotten, vec![key("gone")]);
        assert_eq!(filter.len(), 2);
        assert!(filter.on_apply(key("gone"), ()), "A forgotten object is new again");
    }
}
