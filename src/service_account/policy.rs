//! # Pull Secret Policy
//!
//! Decides whether a ServiceAccount references the managed pull secret and
//! produces the additive change when it does not. Existing references are
//! never removed or reordered.

use crate::constants::REGISTRY_SECRET_NAME;
use json_patch::{AddOperation, PatchOperation};
use jsonptr::PointerBuf;
use k8s_openapi::api::core::v1::{LocalObjectReference, ServiceAccount};

fn registry_secret_reference() -> LocalObjectReference {
    LocalObjectReference {
        name: REGISTRY_SECRET_NAME.to_string(),
    }
}

/// True unless some `imagePullSecrets` entry is named exactly like the managed secret
#[must_use]
pub fn needs_patch(service_account: &ServiceAccount) -> bool {
    !service_account
        .image_pull_secrets
        .iter()
        .flatten()
        .any(|reference| reference.name == REGISTRY_SECRET_NAME)
}

/// Copy of `service_account` with the managed secret appended to its pull secrets
///
/// Returns an unchanged copy when the reference is already present.
#[must_use]
pub fn apply_patch(service_account: &ServiceAccount) -> ServiceAccount {
    let mut patched = service_account.clone();
    if needs_patch(service_account) {
        patched
            .image_pull_secrets
            .get_or_insert_with(Vec::new)
            .push(registry_secret_reference());
    }
    patched
}

/// JSON patch equivalent of [`apply_patch`], for admission responses
///
/// Empty when no patch is needed.
#[must_use]
pub fn patch_operations(service_account: &ServiceAccount) -> Vec<PatchOperation> {
    if !needs_patch(service_account) {
        return Vec::new();
    }

    let reference = serde_json::json!({ "name": REGISTRY_SECRET_NAME });
    let operation = match &service_account.image_pull_secrets {
        None => AddOperation {
            path: PointerBuf::from_tokens(["imagePullSecrets"]),
            value: serde_json::Value::Array(vec![reference]),
        },
        Some(existing) => AddOperation {
            path: PointerBuf::from_tokens(["imagePullSecrets".to_string(), existing.len().to_string()]),
            value: reference,
        },
    };

    vec![PatchOperation::Add(operation)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    fn service_account(pull_secrets: Option<&[&str]>) -> ServiceAccount {
        ServiceAccount {
            metadata: ObjectMeta {
                name: Some("default".to_string()),
                namespace: Some("team-a".to_string()),
                ..Default::default()
            },
            image_pull_secrets: pull_secrets.map(|names| {
                names
                    .iter()
                    .map(|name| LocalObjectReference {
                        name: (*name).to_string(),
                    })
                    .collect()
            }),
            ..Default::default()
        }
    }

    fn names(service_account: &ServiceAccount) -> Vec<String> {
        service_account
            .image_pull_secrets
            .iter()
            .flatten()
            .map(|reference| reference.name.clone())
            .collect()
    }

    #[test]
    fn test_needs_patch_only_when_reference_missing() {
        assert!(needs_patch(&service_account(None)));
        assert!(needs_patch(&service_account(Some(&[]))));
        assert!(needs_patch(&service_account(Some(&["other"]))));
        assert!(needs_patch(&service_account(Some(&["registry-secret-old"]))));
        assert!(!needs_patch(&service_account(Some(&["registry-secret"]))));
        assert!(!needs_patch(&service_account(Some(&["a", "registry-secret", "b"]))));
    }

    #[test]
    fn test_apply_patch_appends_after_existing_references() {
        let patched = apply_patch(&service_account(Some(&["b", "a"])));
        assert_eq!(names(&patched), ["b", "a", "registry-secret"]);
        assert!(!needs_patch(&patched));
    }

    #[test]
    fn test_apply_patch_is_a_no_op_when_present() {
        let original = service_account(Some(&["registry-secret", "other"]));
        assert_eq!(apply_patch(&original), original);
    }

    #[test]
    fn test_patch_operations_create_list_when_absent() {
        let operations = patch_operations(&service_account(None));
        let rendered = serde_json::to_value(&operations).unwrap();
        assert_eq!(
            rendered,
            serde_json::json!([
                {"op": "add", "path": "/imagePullSecrets", "value": [{"name": "registry-secret"}]}
            ])
        );
    }

    #[test]
    fn test_patch_operations_append_at_list_end() {
        let operations = patch_operations(&service_account(Some(&["one", "two"])));
        let rendered = serde_json::to_value(&operations).unwrap();
        assert_eq!(
            rendered,
            serde_json::json!([
                {"op": "add", "path": "/imagePullSecrets/2", "value": {"name": "registry-secret"}}
            ])
        );
    }

    #[test]
    fn test_patch_operations_empty_when_present() {
        assert!(patch_operations(&service_account(Some(&["registry-secret"]))).is_empty());
    }
}
