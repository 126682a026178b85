//! ServiceAccount Mutation Webhook
//!
//! Handles AdmissionReview requests for ServiceAccounts, making sure the
//! namespace has the registry secret and that the ServiceAccount references
//! it before it is persisted.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, Json};
use k8s_openapi::api::core::v1::ServiceAccount;
use kube::{
    api::DynamicObject,
    core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview},
};
use tracing::{debug, error, warn};

use super::WebhookState;
use crate::controller::reconciler::AdmissionDecision;

/// HTTP status reported inside the review when the registry secret could not
/// be ensured
pub const FAILED_DEPENDENCY: u16 = 424;

/// HTTP status reported inside the review for undecodable requests
pub const BAD_REQUEST: u16 = 400;

/// Handle mutating admission review for ServiceAccounts
///
/// The review is always answered; only malformed requests are rejected.
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    body: Bytes,
) -> Json<AdmissionReview<DynamicObject>> {
    let review: AdmissionReview<DynamicObject> = match serde_json::from_slice(&body) {
        Ok(review) => review,
        Err(e) => {
            warn!(error = %e, "Failed to decode admission review");
            return Json(invalid(format!("invalid admission review: {e}")).into_review());
        }
    };

    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Admission review carries no request");
            return Json(invalid(e.to_string()).into_review());
        }
    };

    Json(mutate_service_account(&state, &request).await.into_review())
}

async fn mutate_service_account(
    state: &WebhookState,
    request: &AdmissionRequest<DynamicObject>,
) -> AdmissionResponse {
    let Some(object) = &request.object else {
        debug!(uid = %request.uid, "No object in admission request");
        return reject(request, "admission request has no object".to_string());
    };

    let service_account: ServiceAccount =
        match serde_json::to_value(object).and_then(serde_json::from_value) {
            Ok(service_account) => service_account,
            Err(e) => {
                warn!(uid = %request.uid, error = %e, "Admitted object is not a ServiceAccount");
                return reject(request, format!("object is not a ServiceAccount: {e}"));
            }
        };

    let Some(namespace) = request
        .namespace
        .clone()
        .or_else(|| service_account.metadata.namespace.clone())
    else {
        return reject(request, "admission request has no namespace".to_string());
    };

    let decision = state.reconciler.admit(&namespace, &service_account).await;
    into_response(request, decision)
}

/// Translate an admission decision into the response for `request`
#[must_use]
pub fn into_response<K>(request: &AdmissionRequest<K>, decision: AdmissionDecision) -> AdmissionResponse
where
    K: kube::Resource,
{
    match decision {
        AdmissionDecision::Unchanged => AdmissionResponse::from(request),
        AdmissionDecision::Patch(operations) => with_patch(request, operations),
        AdmissionDecision::DependencyFailed { error, patch } => {
            let message = format!("registry secret could not be ensured: {error}");
            let mut response = if patch.is_empty() {
                AdmissionResponse::from(request)
            } else {
                with_patch(request, patch)
            };
            response.result.code = FAILED_DEPENDENCY;
            response.result.message.clone_from(&message);
            response.warnings = Some(vec![message]);
            response
        }
    }
}

fn with_patch<K>(
    request: &AdmissionRequest<K>,
    operations: Vec<json_patch::PatchOperation>,
) -> AdmissionResponse
where
    K: kube::Resource,
{
    match AdmissionResponse::from(request).with_patch(json_patch::Patch(operations)) {
        Ok(response) => response,
        Err(e) => {
            error!(uid = %request.uid, error = %e, "Failed to serialize patch");
            AdmissionResponse::from(request)
        }
    }
}

fn reject<K>(request: &AdmissionRequest<K>, message: String) -> AdmissionResponse
where
    K: kube::Resource,
{
    let mut response = AdmissionResponse::from(request).deny(message);
    response.result.code = BAD_REQUEST;
    response
}

fn invalid(message: String) -> AdmissionResponse {
    let mut response = AdmissionResponse::invalid(message);
    response.result.code = BAD_REQUEST;
    response
}
