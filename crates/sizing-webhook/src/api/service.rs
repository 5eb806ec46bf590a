use serde_json::Value;
use tracing::{Span, debug, error, warn};
use workload_mutator::{
    admission_request::AdmissionRequest,
    admission_response::AdmissionResponse,
    errors::{DecodeError, PatchError},
    mutation::Mutator,
    patch,
    workload::Resource,
};

use crate::api::admission_review::{AdmissionReviewRequest, AdmissionReviewResponse};
use crate::metrics::{MetricsRecorder, Outcome};

/// Status code reported inside of the admission response when the review
/// cannot be decoded.
const MALFORMED_REQUEST_CODE: u16 = 400;

/// The answer to an admission review, along with what is needed to meter it.
pub(crate) struct Review {
    pub(crate) response: AdmissionReviewResponse,
    pub(crate) outcome: Outcome,
    pub(crate) kind: String,
}

/// Run the admission pipeline over the raw body of a review.
///
/// Every failure happening past the HTTP layer is turned into a well formed
/// admission response: malformed reviews are denied, everything else is
/// allowed, with a patch when the object has been mutated.
pub(crate) fn review(mutator: &dyn Mutator, metrics: &dyn MetricsRecorder, body: &[u8]) -> Review {
    let (api_version, request) = match decode_envelope(body) {
        Ok(decoded) => decoded,
        Err(err) => {
            let (api_version, uid, kind) = recover_identity(body);
            warn!(error = %err, "cannot decode admission review");
            return finish(
                metrics,
                api_version,
                kind,
                reject(uid, &err),
                Outcome::Rejected,
            );
        }
    };
    populate_span_with_admission_request_data(&request);

    let kind = request.kind.kind.clone();
    let uid = request.uid.clone();

    let Some(object) = request.object else {
        debug!("admission request without object, nothing to mutate");
        return finish(
            metrics,
            api_version,
            kind,
            AdmissionResponse::allow(uid),
            Outcome::Unchanged,
        );
    };

    let resource = match Resource::from_raw(&request.kind, object.0) {
        Ok(resource) => resource,
        Err(err) => {
            warn!(error = %err, "cannot decode admitted object");
            return finish(
                metrics,
                api_version,
                kind,
                reject(uid, &err),
                Outcome::Rejected,
            );
        }
    };
    metrics.add_admission_review(Outcome::Decoded, &kind);

    if let Err(err) = resource.dispatch() {
        debug!(error = %err, "letting the object through");
        return finish(
            metrics,
            api_version,
            kind,
            AdmissionResponse::allow(uid),
            Outcome::Unsupported,
        );
    }

    // mutators work on a copy: the original is needed to compute the patch,
    // and is what gets admitted if a mutator fails halfway
    let mut mutated = resource.clone();
    let (response, outcome) = match mutator.mutate(&mut mutated) {
        Ok(true) => patched_response(uid.clone(), &resource, &mutated).unwrap_or_else(|err| {
            error!(error = %err, "cannot compute patch, admitting the object unchanged");
            (AdmissionResponse::allow(uid), Outcome::Unchanged)
        }),
        Ok(false) => (AdmissionResponse::allow(uid), Outcome::Unchanged),
        Err(err) => {
            let failed_mutator = err.mutator().unwrap_or(mutator.name());
            error!(
                mutator = failed_mutator,
                error = %err,
                "mutation failed, admitting the object unchanged"
            );
            metrics.add_mutation_error(failed_mutator, &kind);
            (AdmissionResponse::allow(uid), Outcome::Unchanged)
        }
    };

    finish(metrics, api_version, kind, response, outcome)
}

fn decode_envelope(body: &[u8]) -> Result<(Option<String>, AdmissionRequest), DecodeError> {
    let admission_review: AdmissionReviewRequest =
        serde_json::from_slice(body).map_err(DecodeError::Envelope)?;
    let request = admission_review
        .request
        .ok_or(DecodeError::MissingRequest)?;

    Ok((admission_review.api_version, request))
}

/// Salvage apiVersion, UID and kind from a review that cannot be decoded,
/// so that the rejection can still be correlated by the API server.
fn recover_identity(body: &[u8]) -> (Option<String>, String, String) {
    let Ok(document) = serde_json::from_slice::<Value>(body) else {
        return (None, String::new(), String::new());
    };
    let field = |pointer: &str| {
        document
            .pointer(pointer)
            .and_then(Value::as_str)
            .map(str::to_owned)
    };

    (
        field("/apiVersion"),
        field("/request/uid").unwrap_or_default(),
        field("/request/kind/kind").unwrap_or_default(),
    )
}

fn reject(uid: String, err: &DecodeError) -> AdmissionResponse {
    AdmissionResponse::reject(uid, err.to_string(), MALFORMED_REQUEST_CODE)
}

fn patched_response(
    uid: String,
    original: &Resource,
    mutated: &Resource,
) -> Result<(AdmissionResponse, Outcome), PatchError> {
    match patch::resource_patch(original, mutated)? {
        Some(patch) => Ok((
            AdmissionResponse::allow(uid).with_patch(&patch)?,
            Outcome::Mutated,
        )),
        None => Ok((AdmissionResponse::allow(uid), Outcome::Unchanged)),
    }
}

fn finish(
    metrics: &dyn MetricsRecorder,
    api_version: Option<String>,
    kind: String,
    response: AdmissionResponse,
    outcome: Outcome,
) -> Review {
    metrics.add_admission_review(outcome, &kind);
    populate_span_with_admission_response(&response, outcome);

    Review {
        response: AdmissionReviewResponse::new(response).with_api_version(api_version),
        outcome,
        kind,
    }
}

fn populate_span_with_admission_request_data(adm_req: &AdmissionRequest) {
    let span = Span::current();
    span.record("request_uid", adm_req.uid.as_str());
    span.record("kind", adm_req.kind.kind.as_str());
    span.record("kind_group", adm_req.kind.group.as_str());
    span.record("kind_version", adm_req.kind.version.as_str());
    span.record("name", adm_req.name.as_deref().unwrap_or_default());
    span.record("namespace", adm_req.namespace.as_deref().unwrap_or_default());
    span.record("operation", adm_req.operation.as_deref().unwrap_or_default());
}

fn populate_span_with_admission_response(response: &AdmissionResponse, outcome: Outcome) {
    let span = Span::current();
    span.record("allowed", response.allowed);
    span.record("mutated", response.patch.is_some());
    span.record("outcome", outcome.as_str());
    if let Some(status) = &response.status {
        if let Some(code) = &status.code {
            span.record("response_code", code);
        }
        if let Some(message) = &status.message {
            span.record("response_message", message.as_str());
        }
    }
}
