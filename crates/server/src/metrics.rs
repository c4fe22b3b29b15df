//! Prometheus metrics for the Nimbus server.
//!
//! Exposes listing volume, browse latency, folder-size timeouts and API
//! errors.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no keys, prefixes or user identities, only aggregate counts.
//! Restrict the endpoint to scraper IPs at the infrastructure level, or turn
//! it off with `server.metrics_enabled = false`.

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use nimbus_storage::{
    ContinuationToken, ListingPage, ListingRequest, ObjectStore, StorageError, StorageResult,
};
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{Arc, LazyLock, Once};
use std::time::Duration;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Storage listing metrics
pub static STORAGE_LISTING_PAGES_FETCHED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "nimbus_storage_listing_pages_fetched_total",
            "Total number of listing pages fetched from storage backend",
        ),
        &["backend"],
    )
    .expect("metric creation failed")
});

pub static STORAGE_OBJECTS_LISTED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "nimbus_storage_objects_listed_total",
            "Total number of objects returned by listing pages",
        ),
        &["backend"],
    )
    .expect("metric creation failed")
});

pub static STORAGE_LISTING_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "nimbus_storage_listing_errors_total",
            "Total number of failed listing page requests",
        ),
        &["backend", "kind"],
    )
    .expect("metric creation failed")
});

// Browse metrics
pub static BROWSE_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "nimbus_browse_duration_seconds",
            "Time taken by a browse operation, by operation",
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["operation"],
    )
    .expect("metric creation failed")
});

pub static FOLDER_SIZE_TIMEOUTS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "nimbus_folder_size_timeouts_total",
        "Total number of folder-size computations abandoned at the deadline",
    )
    .expect("metric creation failed")
});

pub static PRESIGNED_URLS_ISSUED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "nimbus_presigned_urls_issued_total",
            "Total number of presigned URLs handed out, by direction",
        ),
        &["direction"],
    )
    .expect("metric creation failed")
});

// Error metrics
pub static HTTP_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("nimbus_http_errors_total", "Total API errors by error code"),
        &["code"],
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// This function is idempotent - subsequent calls after the first are no-ops.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(STORAGE_LISTING_PAGES_FETCHED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(STORAGE_OBJECTS_LISTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(STORAGE_LISTING_ERRORS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BROWSE_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(FOLDER_SIZE_TIMEOUTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PRESIGNED_URLS_ISSUED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(HTTP_ERRORS.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Helper to record API errors by code.
pub fn record_http_error(code: &str) {
    HTTP_ERRORS.with_label_values(&[code]).inc();
}

fn listing_error_kind(err: &StorageError) -> &'static str {
    match err {
        StorageError::NotFound(_) => "not_found",
        StorageError::InvalidContinuationToken(_) => "invalid_token",
        StorageError::InvalidKey(_) => "invalid_key",
        StorageError::Config(_) => "config",
        StorageError::Io(_) | StorageError::S3(_) => "upstream",
        StorageError::Unsupported { .. } => "unsupported",
    }
}

/// Object store decorator that counts listing traffic.
///
/// Wraps the configured backend once at startup so every browse operation
/// is metered without the storage crate knowing about Prometheus.
pub struct MeteredStore {
    inner: Arc<dyn ObjectStore>,
}

impl MeteredStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ObjectStore for MeteredStore {
    async fn list_page(
        &self,
        request: &ListingRequest,
        token: Option<ContinuationToken>,
    ) -> StorageResult<ListingPage> {
        let backend = self.inner.backend_name();
        match self.inner.list_page(request, token).await {
            Ok(page) => {
                STORAGE_LISTING_PAGES_FETCHED
                    .with_label_values(&[backend])
                    .inc();
                STORAGE_OBJECTS_LISTED
                    .with_label_values(&[backend])
                    .inc_by(page.objects.len() as u64);
                Ok(page)
            }
            Err(e) => {
                STORAGE_LISTING_ERRORS
                    .with_label_values(&[backend, listing_error_kind(&e)])
                    .inc();
                Err(e)
            }
        }
    }

    async fn presign_download(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let url = self.inner.presign_download(key, expires_in).await?;
        PRESIGNED_URLS_ISSUED.with_label_values(&["download"]).inc();
        Ok(url)
    }

    async fn presign_upload(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let url = self.inner.presign_upload(key, expires_in).await?;
        PRESIGNED_URLS_ISSUED.with_label_values(&["upload"]).inc();
        Ok(url)
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    async fn ping(&self) -> StorageResult<()> {
        self.inner.ping().await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.inner.health_check().await
    }
}
