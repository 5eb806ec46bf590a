use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

use crate::errors::PatchError;

/// This models the admission/v1/AdmissionResponse object of Kubernetes
/// See https://pkg.go.dev/k8s.io/kubernetes/pkg/apis/admission#AdmissionResponse
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    /// UID is an identifier for the individual request/response.
    /// This must be copied over from the corresponding AdmissionRequest.
    pub uid: String,

    /// Allowed indicates whether or not the admission request was permitted.
    pub allowed: bool,

    /// The type of Patch. Currently we only allow "JSONPatch".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<PatchType>,

    /// The patch body, base64 encoded. Only "JSONPatch" (RFC 6902) is produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,

    /// Status contains extra details into why an admission request was denied.
    /// This field IS NOT consulted in any way if "Allowed" is "true".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionResponseStatus>,
}

/// PatchType is the type of patch being used to represent the mutated object
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub enum PatchType {
    #[serde(rename = "JSONPatch")]
    #[default]
    JSONPatch,
}

/// Values that Status.Status of an AdmissionResponse can have
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub enum AdmissionResponseStatusValue {
    Success,
    Failure,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct AdmissionResponseStatus {
    /// Status of the operation.
    /// One of: "Success" or "Failure".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionResponseStatusValue>,

    /// A human-readable description of the status of this operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Suggested HTTP return code for this status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl AdmissionResponse {
    /// Admit the request without touching the object.
    pub fn allow(uid: String) -> AdmissionResponse {
        AdmissionResponse {
            uid,
            allowed: true,
            ..Default::default()
        }
    }

    pub fn reject(uid: String, message: String, code: u16) -> AdmissionResponse {
        AdmissionResponse {
            uid,
            allowed: false,
            status: Some(AdmissionResponseStatus {
                status: Some(AdmissionResponseStatusValue::Failure),
                message: Some(message),
                code: Some(code),
            }),
            ..Default::default()
        }
    }

    /// Attach a JSON Patch to the response. An empty patch leaves the
    /// response untouched: no `patch` nor `patchType` gets serialized.
    pub fn with_patch(mut self, patch: &json_patch::Patch) -> Result<Self, PatchError> {
        if patch.0.is_empty() {
            return Ok(self);
        }

        let encoded = serde_json::to_vec(patch)
            .map(|raw| general_purpose::STANDARD.encode(raw))
            .map_err(PatchError::Serialize)?;
        self.patch = Some(encoded);
        self.patch_type = Some(PatchType::JSONPatch);

        Ok(self)
    }

    /// Decode the base64 patch attached to the response, if any.
    pub fn decoded_patch(&self) -> Option<json_patch::Patch> {
        let raw = general_purpose::STANDARD.decode(self.patch.as_ref()?).ok()?;
        serde_json::from_slice(&raw).ok()
    }
}
