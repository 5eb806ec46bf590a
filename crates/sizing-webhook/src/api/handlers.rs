use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json,
    body::Bytes,
    extract::{self, rejection::BytesRejection},
    http::{StatusCode, header},
    response::IntoResponse,
};
use prometheus::Registry;
use tokio::task;
use tracing::{Span, debug, error};

use crate::api::{
    admission_review::AdmissionReviewResponse, api_error::ApiError, service,
    state::ApiServerState,
};
use crate::metrics;

#[tracing::instrument(
    name = "mutation",
    fields(
        request_uid=tracing::field::Empty,
        host=crate::config::HOSTNAME.as_str(),
        name=tracing::field::Empty,
        namespace=tracing::field::Empty,
        operation=tracing::field::Empty,
        kind_group=tracing::field::Empty,
        kind_version=tracing::field::Empty,
        kind=tracing::field::Empty,
        allowed=tracing::field::Empty,
        mutated=tracing::field::Empty,
        outcome=tracing::field::Empty,
        response_code=tracing::field::Empty,
        response_message=tracing::field::Empty,
    ),
    skip_all)]
/// Run the mutation policies over the object of an admission review.
pub(crate) async fn mutate_handler(
    extract::State(state): extract::State<Arc<ApiServerState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<AdmissionReviewResponse>, (StatusCode, ApiError)> {
    let body = body.map_err(|rejection| {
        let error = ApiError::from(rejection);
        (error.status, error)
    })?;

    let start = Instant::now();
    let span = Span::current();
    let review_state = state.clone();
    let review = task::spawn_blocking(move || {
        let _enter = span.enter();
        service::review(&review_state.mutator, review_state.metrics.as_ref(), &body)
    })
    .await
    .map_err(|e| {
        error!("admission review task failed: {e}");
        internal_server_error()
    })?;
    state
        .metrics
        .record_admission_review_latency(review.outcome, &review.kind, start.elapsed());

    debug!(response = ?review.response.response, "admission review handled");

    Ok(Json(review.response))
}

pub(crate) async fn readiness_handler() -> StatusCode {
    StatusCode::OK
}

pub(crate) async fn metrics_handler(
    extract::State(registry): extract::State<Registry>,
) -> Result<impl IntoResponse, (StatusCode, ApiError)> {
    let (content_type, body) = metrics::render(&registry).map_err(|e| {
        error!("cannot render metrics: {e}");
        internal_server_error()
    })?;

    Ok(([(header::CONTENT_TYPE, content_type)], body))
}

fn internal_server_error() -> (StatusCode, ApiError) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Something went wrong".to_owned(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MockMetricsRecorder, Outcome};
    use axum::{Router, body::Body, extract::DefaultBodyLimit, http::Request, routing::post};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use workload_mutator::mutation::MutatorChain;

    fn app(metrics: MockMetricsRecorder) -> Router {
        let state = Arc::new(ApiServerState {
            mutator: MutatorChain::default(),
            metrics: Arc::new(metrics),
        });

        Router::new()
            .route("/mutate", post(mutate_handler))
            .with_state(state)
    }

    #[tokio::test]
    async fn latency_is_recorded_with_the_final_outcome() {
        let mut metrics = MockMetricsRecorder::new();
        metrics.expect_add_admission_review().return_const(());
        metrics
            .expect_record_admission_review_latency()
            .withf(|outcome, kind, _| *outcome == Outcome::Rejected && kind.is_empty())
            .times(1)
            .return_const(());

        let request = Request::builder()
            .method("POST")
            .uri("/mutate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("not json"))
            .unwrap();
        let response = app(metrics).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let review: AdmissionReviewResponse =
            serde_json::from_slice(&response.into_body().collect().await.unwrap().to_bytes())
                .unwrap();
        assert!(!review.response.allowed);
    }

    #[tokio::test]
    async fn unreadable_body_is_answered_with_an_api_error() {
        let request = Request::builder()
            .method("POST")
            .uri("/mutate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("x".repeat(64)))
            .unwrap();
        let response = app(MockMetricsRecorder::new())
            .layer(DefaultBodyLimit::max(16))
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body: serde_json::Value =
            serde_json::from_slice(&response.into_body().collect().await.unwrap().to_bytes())
                .unwrap();
        assert_eq!(body["status"], serde_json::json!(413));
        assert!(!body["message"].as_str().unwrap_or_default().is_empty());
        assert!(body.get("response").is_none());
    }
}
