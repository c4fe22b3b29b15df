//! Server test utilities.

use super::fixtures::{TEST_TOKEN, session_for, test_claims};
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use nimbus_core::config::{AppConfig, StorageConfig};
use nimbus_server::{AppState, create_router};
use nimbus_storage::{FilesystemBackend, ObjectStore};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    storage_path: PathBuf,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server over an empty filesystem bucket.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let storage_path = temp_dir.path().join("storage");
        std::fs::create_dir_all(&storage_path).expect("Failed to create storage directory");

        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        Self::build(temp_dir, storage_path, storage, modifier)
    }

    /// Create a test server over an arbitrary backend.
    pub async fn with_storage<F>(storage: Arc<dyn ObjectStore>, modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let storage_path = temp_dir.path().to_path_buf();
        Self::build(temp_dir, storage_path, storage, modifier)
    }

    fn build<F>(
        temp_dir: TempDir,
        storage_path: PathBuf,
        storage: Arc<dyn ObjectStore>,
        modifier: F,
    ) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem {
            path: storage_path.clone(),
        };
        config
            .auth
            .sessions
            .push(session_for(TEST_TOKEN, test_claims()));

        modifier(&mut config);

        nimbus_server::metrics::register_metrics();
        let state = AppState::new(config, storage);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            storage_path,
            _temp_dir: temp_dir,
        }
    }

    /// Root directory of the filesystem bucket.
    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// Send a request and decode the JSON body (Null when the body is empty).
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    /// GET a path with the test session token.
    pub async fn get_authed(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {TEST_TOKEN}"))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// GET a path without credentials.
    pub async fn get_anonymous(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }
}
