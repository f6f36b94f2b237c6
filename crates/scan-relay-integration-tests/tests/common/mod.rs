//! Common utilities for end-to-end tests
//!
//! This module provides:
//! - A running service (HTTP server, worker pool and pipeline) bound to a
//!   local port, with its mapping file and directories in a temp dir
//! - A mock application registry served by wiremock
//! - Recording doubles for the clone and analyzer stages

#![allow(dead_code)]

use async_trait::async_trait;
use scan_relay_api::{serve, AppState, ServiceConfig};
use scan_relay_core::signature::compute_signature;
use scan_relay_core::{
    AnalysisPipeline, Analyzer, CsvMappingSource, HttpApplicationRegistry, InvocationError,
    InvocationReport, MappingResolver, RegistryConfig, RepositorySynchronizer, StatsSnapshot,
    SyncError, TaskQueue, VersionControl, WorkerConfig, WorkerPool, SIGNATURE_HEADER,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SECRET: &str = "integration-secret";
pub const COMPANY_ID: &str = "1234";
pub const AUTH_TOKEN: &str = "registry-token";

pub const MAPPING_CSV: &str = "\
application_name,group_id,repository_url,external_app_id
app1,G1,https://example.com/org/repo,42
app1,G1,https://example.com/org/repo-ui,42
app2,G2,https://example.com/org/other,7
";

// ============================================================================
// Mock registry
// ============================================================================

/// Start a registry answering with the given application IDs.
pub async fn registry_listing(ids: &[i64]) -> MockServer {
    let server = MockServer::start().await;
    let body: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| serde_json::json!({ "id": id, "name": format!("app-{id}") }))
        .collect();

    Mock::given(method("GET"))
        .and(path(format!("/domains/{COMPANY_ID}/applications")))
        .and(header("Authorization", format!("Bearer {AUTH_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    server
}

// ============================================================================
// Stage doubles
// ============================================================================

/// Clone double that materializes a small working copy.
#[derive(Default)]
pub struct RecordingVcs {
    clones: Mutex<Vec<(String, PathBuf)>>,
}

impl RecordingVcs {
    pub fn clones(&self) -> Vec<(String, PathBuf)> {
        self.clones.lock().unwrap().clone()
    }
}

#[async_trait]
impl VersionControl for RecordingVcs {
    async fn clone_repository(&self, url: &str, destination: &Path) -> Result<(), SyncError> {
        std::fs::create_dir_all(destination.join(".git")).unwrap();
        std::fs::write(destination.join("README.md"), url).unwrap();
        self.clones
            .lock()
            .unwrap()
            .push((url.to_string(), destination.to_path_buf()));
        Ok(())
    }
}

/// Analyzer double recording the source directory and application ID.
#[derive(Default)]
pub struct RecordingAnalyzer {
    invocations: Mutex<Vec<(PathBuf, i64)>>,
}

impl RecordingAnalyzer {
    pub fn invocations(&self) -> Vec<(PathBuf, i64)> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl Analyzer for RecordingAnalyzer {
    async fn invoke(
        &self,
        source_dir: &Path,
        application_id: i64,
    ) -> Result<InvocationReport, InvocationError> {
        self.invocations
            .lock()
            .unwrap()
            .push((source_dir.to_path_buf(), application_id));
        Ok(InvocationReport {
            exit_code: 0,
            stdout: "analysis uploaded".to_string(),
            stderr: String::new(),
            elapsed: Duration::from_millis(1),
        })
    }
}

// ============================================================================
// Running service
// ============================================================================

/// Service under test, stopped when dropped
pub struct TestService {
    pub base_url: String,
    pub base_target_dir: PathBuf,
    pub mapping_file: PathBuf,
    pub queue: TaskQueue,
    client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
    pool: Option<WorkerPool>,
    _dir: TempDir,
}

impl TestService {
    /// Start the full stack against `registry` with the given mapping table.
    pub async fn start(
        registry: &MockServer,
        mapping_csv: &str,
        vcs: Arc<dyn VersionControl>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mapping_file = dir.path().join("mapping.csv");
        std::fs::write(&mapping_file, mapping_csv).unwrap();

        let mut config = ServiceConfig::default();
        config.webhooks.secret = SECRET.to_string();
        config.gate.lock_file = dir.path().join("webhook.lock");
        config.mapping.file_path = mapping_file.clone();
        config.repositories.base_target_dir = dir.path().join("repos");
        config.registry = RegistryConfig {
            base_url: registry.uri(),
            company_id: COMPANY_ID.to_string(),
            auth_token: AUTH_TOKEN.to_string(),
            timeout_seconds: 5,
        };

        let registry_client = HttpApplicationRegistry::new(&config.registry).unwrap();
        let pipeline = AnalysisPipeline::new(
            MappingResolver::new(
                Arc::new(CsvMappingSource::new(mapping_file.clone())),
                Arc::new(registry_client),
            ),
            RepositorySynchronizer::new(vcs),
            analyzer,
        );

        let (queue, pool) = WorkerPool::start(
            &WorkerConfig {
                count: 2,
                shutdown_timeout_seconds: 5,
            },
            Arc::new(pipeline),
        );

        let base_target_dir = config.repositories.base_target_dir.clone();
        let state = AppState::new(config, queue.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let (shutdown, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            serve(listener, state, async move {
                let _ = stopped.await;
            })
            .await
            .unwrap();
        });

        Self {
            base_url,
            base_target_dir,
            mapping_file,
            queue,
            client: reqwest::Client::new(),
            shutdown: Some(shutdown),
            server: Some(server),
            pool: Some(pool),
            _dir: dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a signed push event for `clone_url`.
    pub async fn post_push(&self, clone_url: &str) -> reqwest::Response {
        let body = push_payload(clone_url);
        self.post_raw(&body, Some(compute_signature(SECRET.as_bytes(), body.as_bytes())))
            .await
    }

    pub async fn post_raw(&self, body: &str, signature: Option<String>) -> reqwest::Response {
        let mut request = self
            .client
            .post(self.url("/webhook"))
            .header("content-type", "application/json")
            .body(body.to_string());
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        request.send().await.unwrap()
    }

    /// Wait until `count` tasks have finished, successfully or not.
    pub async fn wait_for_processed(&self, count: u64) -> StatsSnapshot {
        for _ in 0..500 {
            let stats = self.queue.stats();
            if stats.processed >= count {
                return stats;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {count} processed tasks, stats: {:?}",
            self.queue.stats()
        );
    }

    /// Stop the server and drain the workers.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(server) = self.server.take() {
            server.await.unwrap();
        }
        if let Some(pool) = self.pool.take() {
            pool.shutdown(Duration::from_millis(100)).await;
        }
    }
}

impl Drop for TestService {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}

pub fn push_payload(clone_url: &str) -> String {
    serde_json::json!({
        "ref": "refs/heads/main",
        "repository": {
            "name": "repo",
            "clone_url": clone_url
        },
        "commits": [
            { "id": "0d1a26e67d8f5eaf1f6ba5c57fc3c7d91ac0fd1c", "message": "Update README" }
        ]
    })
    .to_string()
}

/// Relative paths of every file below `root`, sorted.
pub fn tree(root: &Path) -> Vec<String> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                out.push(
                    path.strip_prefix(root)
                        .unwrap()
                        .to_string_lossy()
                        .replace('\\', "/"),
                );
            }
        }
    }

    let mut out = Vec::new();
    if root.exists() {
        walk(root, root, &mut out);
    }
    out.sort();
    out
}
