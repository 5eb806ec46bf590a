use workload_mutator::admission_request::AdmissionRequest;
use workload_mutator::admission_response::AdmissionResponse;

pub const DEFAULT_API_VERSION: &str = "admission.k8s.io/v1";

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    pub response: AdmissionResponse,
}

impl AdmissionReviewResponse {
    pub fn new(response: AdmissionResponse) -> Self {
        AdmissionReviewResponse {
            api_version: Some(String::from(DEFAULT_API_VERSION)),
            kind: Some(String::from("AdmissionReview")),
            response,
        }
    }

    /// Answer using the API version of the review that was received.
    pub fn with_api_version(mut self, api_version: Option<String>) -> Self {
        if let Some(api_version) = api_version.filter(|v| !v.is_empty()) {
            self.api_version = Some(api_version);
        }
        self
    }
}
