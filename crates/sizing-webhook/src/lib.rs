extern crate k8s_openapi;

pub mod api;
pub(crate) mod certs;
pub mod cli;
pub mod config;
pub mod metrics;
pub mod tracing;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use ::tracing::{error, info, warn};
use anyhow::{Context, Result};
use api::{
    handlers::{metrics_handler, mutate_handler, readiness_handler},
    state::ApiServerState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    routing::{get, post},
};
use axum_server::{Handle, tls_rustls::RustlsConfig};
use config::Config;
use metrics::{OtelRecorder, setup_metrics};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use workload_mutator::mutation::{GuaranteedMemory, LabelMarker, Mutator, MutatorChain, Noop};

/// Time given to in-flight requests to complete once a termination signal
/// has been received.
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest admission review accepted by the webhook. UPDATE reviews carry
/// both `object` and `oldObject`, each of them up to the etcd object size.
const MAX_ADMISSION_REVIEW_SIZE: usize = 16 * 1024 * 1024;

pub struct SizingWebhook {
    router: Router,
    metrics_router: Router,
    webhook_addr: SocketAddr,
    metrics_addr: SocketAddr,
    tls_config: Option<RustlsConfig>,
    meter_provider: SdkMeterProvider,
}

impl SizingWebhook {
    pub async fn new_from_config(config: Config) -> Result<Self> {
        let (meter_provider, registry) = setup_metrics()?;
        let state = Arc::new(ApiServerState {
            mutator: build_mutator_chain(&config),
            metrics: Arc::new(OtelRecorder::new(&meter_provider)),
        });

        let tls_config = match &config.tls_config {
            Some(tls_config) => Some(
                certs::create_tls_config(tls_config)
                    .await
                    .context("cannot load TLS certificate")?,
            ),
            None => {
                warn!("no TLS certificate provided, the webhook is served over plain HTTP");
                None
            }
        };

        let router = webhook_router(state, config.request_timeout);

        let metrics_router = Router::new()
            .route(&config.metrics_path, get(metrics_handler))
            .with_state(registry)
            .route("/healthz", get(readiness_handler));

        Ok(Self {
            router,
            metrics_router,
            webhook_addr: config.webhook_addr,
            metrics_addr: config.metrics_addr,
            tls_config,
            meter_provider,
        })
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn metrics_router(&self) -> Router {
        self.metrics_router.clone()
    }

    /// Serve the webhook and the metrics endpoints until a termination
    /// signal is received.
    pub async fn run(self) -> Result<()> {
        let SizingWebhook {
            router,
            metrics_router,
            webhook_addr,
            metrics_addr,
            tls_config,
            meter_provider,
        } = self;

        let webhook_handle = Handle::new();
        let metrics_handle = Handle::new();
        tokio::spawn(shutdown_signal(vec![
            webhook_handle.clone(),
            metrics_handle.clone(),
        ]));

        let webhook_server = async {
            info!(address = %webhook_addr, tls = tls_config.is_some(), "webhook server started");
            let served = match tls_config {
                Some(tls_config) => {
                    axum_server::bind_rustls(webhook_addr, tls_config)
                        .handle(webhook_handle)
                        .serve(router.into_make_service())
                        .await
                }
                None => {
                    axum_server::bind(webhook_addr)
                        .handle(webhook_handle)
                        .serve(router.into_make_service())
                        .await
                }
            };
            served.with_context(|| format!("webhook server on {webhook_addr} failed"))
        };

        let metrics_server = async {
            info!(address = %metrics_addr, "metrics server started");
            axum_server::bind(metrics_addr)
                .handle(metrics_handle)
                .serve(metrics_router.into_make_service())
                .await
                .with_context(|| format!("metrics server on {metrics_addr} failed"))
        };

        tokio::try_join!(webhook_server, metrics_server)?;

        if let Err(e) = meter_provider.shutdown() {
            error!("cannot shut down the meter provider: {e}");
        }
        info!("servers stopped");

        Ok(())
    }
}

fn webhook_router(state: Arc<ApiServerState>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/mutate", post(mutate_handler))
        .with_state(state)
        .route("/readiness", get(readiness_handler))
        .layer(DefaultBodyLimit::max(MAX_ADMISSION_REVIEW_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Assemble the mutation policies enabled by the configuration. The label
/// marker always runs before the memory fixer.
pub fn build_mutator_chain(config: &Config) -> MutatorChain {
    let mut chain = MutatorChain::default();

    let marker = LabelMarker::from_labels(config.label_marks.clone());
    if marker.name() == Noop.name() {
        warn!("no label marks configured, label marker disabled");
    } else {
        info!(labels = ?config.label_marks, "label marker enabled");
        chain.push(marker);
    }

    if config.enable_guaranteed_memory {
        info!("guaranteed memory enabled");
        chain.push(Box::new(GuaranteedMemory));
    } else {
        warn!("guaranteed memory disabled");
    }

    chain
}

async fn shutdown_signal(handles: Vec<Handle>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("cannot listen for SIGINT: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("termination signal received, draining connections");
    for handle in handles {
        handle.graceful_shutdown(Some(GRACEFUL_SHUTDOWN_TIMEOUT));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MockMetricsRecorder;
    use axum::{
        body::Body,
        http::{Request, header},
    };
    use http_body_util::BodyExt;
    use std::collections::BTreeMap;
    use tower::ServiceExt;
    use workload_mutator::{errors::MutationError, workload::Resource};

    struct Sluggish;

    impl Mutator for Sluggish {
        fn name(&self) -> &'static str {
            "sluggish"
        }

        fn mutate(&self, _resource: &mut Resource) -> Result<bool, MutationError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(false)
        }
    }

    #[test]
    fn chain_follows_the_configuration() {
        let mut config = Config::default();
        assert!(build_mutator_chain(&config).is_empty());

        config.enable_guaranteed_memory = true;
        assert_eq!(build_mutator_chain(&config).names(), vec!["guaranteed-memory"]);

        config.label_marks = BTreeMap::from([(String::from("team"), String::from("x"))]);
        assert_eq!(
            build_mutator_chain(&config).names(),
            vec!["label-marker", "guaranteed-memory"]
        );

        config.enable_guaranteed_memory = false;
        assert_eq!(build_mutator_chain(&config).names(), vec!["label-marker"]);
    }

    #[tokio::test]
    async fn exceeded_deadline_has_no_admission_response() {
        let mut metrics = MockMetricsRecorder::new();
        metrics.expect_add_admission_review().return_const(());
        metrics.expect_add_mutation_error().return_const(());
        metrics
            .expect_record_admission_review_latency()
            .return_const(());
        let state = Arc::new(ApiServerState {
            mutator: MutatorChain::new(vec![Box::new(Sluggish)]),
            metrics: Arc::new(metrics),
        });
        let router = webhook_router(state, Duration::from_millis(50));

        let request = Request::builder()
            .method("POST")
            .uri("/mutate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                include_str!("../tests/data/pod_with_unbalanced_memory.json"),
            ))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }
}
