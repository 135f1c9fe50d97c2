//! Shared helpers for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::{Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use usdz2glb::{
    ConversionService, ConverterConfig, InMemoryObjectStore, ObjectStore, ToolCommand, ToolExit,
    ToolInvoker,
};

// ── Scripted tools ───────────────────────────────────────────────────────────

/// Stands in for `usdcat` and `usd2gltf`.
///
/// Each program exits with a scripted code (0 unless told otherwise). On
/// success it writes a small file at its last argument, which is where both
/// real tools put their output. A program can also be scripted to panic,
/// standing in for a bug anywhere inside the pipeline.
#[derive(Default)]
pub struct ScriptedTools {
    codes: HashMap<String, i32>,
    panics: Option<String>,
    calls: Mutex<Vec<ToolCommand>>,
}

impl ScriptedTools {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(program: &str, code: i32) -> Arc<Self> {
        Arc::new(Self {
            codes: HashMap::from([(program.to_string(), code)]),
            ..Self::default()
        })
    }

    pub fn panicking(program: &str) -> Arc<Self> {
        Arc::new(Self {
            panics: Some(program.to_string()),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<ToolCommand> {
        self.calls.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.program).collect()
    }
}

#[async_trait]
impl ToolInvoker for ScriptedTools {
    async fn invoke(&self, command: &ToolCommand) -> std::io::Result<ToolExit> {
        self.calls.lock().unwrap().push(command.clone());
        if self.panics.as_deref() == Some(command.program.as_str()) {
            panic!("{} blew up", command.program);
        }
        let code = self.codes.get(&command.program).copied().unwrap_or(0);
        if code != 0 {
            return Ok(ToolExit::failure(code, format!("{} exited with {code}", command.program)));
        }
        // Yield like a real child process would, so concurrent requests interleave.
        tokio::task::yield_now().await;
        if let Some(out) = command.args.last() {
            std::fs::write(out, format!("glTF from {}", command.program))?;
        }
        Ok(ToolExit::success())
    }
}

// ── Service fixtures ─────────────────────────────────────────────────────────

pub struct Fixture {
    pub service: ConversionService,
    pub store: Arc<InMemoryObjectStore>,
    pub tools: Arc<ScriptedTools>,
    pub workspace_root: tempfile::TempDir,
}

impl Fixture {
    pub fn new(tools: Arc<ScriptedTools>) -> Self {
        Self::with_store(tools, Arc::new(InMemoryObjectStore::new()))
    }

    pub fn with_store(tools: Arc<ScriptedTools>, store: Arc<InMemoryObjectStore>) -> Self {
        let workspace_root = tempfile::tempdir().unwrap();
        let config = ConverterConfig::builder()
            .workspace_root(workspace_root.path())
            .upload_bucket("uploads")
            .download_timeout_secs(10)
            .build()
            .unwrap();
        Self::build(config, tools, store, workspace_root)
    }

    pub fn build(
        config: ConverterConfig,
        tools: Arc<ScriptedTools>,
        store: Arc<InMemoryObjectStore>,
        workspace_root: tempfile::TempDir,
    ) -> Self {
        init_tracing();
        let service =
            ConversionService::new(config, store.clone() as Arc<dyn ObjectStore>, tools.clone())
                .unwrap();
        Self {
            service,
            store,
            tools,
            workspace_root,
        }
    }

    /// Entries left under the workspace root. Zero once every request ended.
    pub fn leftover_workspaces(&self) -> usize {
        count_entries(self.workspace_root.path())
    }
}

/// Route library logs to the test harness; `RUST_LOG=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

// ── Remote source server ─────────────────────────────────────────────────────

/// A local HTTP server that plays the part of the remote asset host.
pub struct SourceServer {
    pub addr: SocketAddr,
    pub queries: Arc<Mutex<Vec<Option<String>>>>,
}

impl SourceServer {
    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}/{}", self.addr, path_and_query.trim_start_matches('/'))
    }
}

type Files = Arc<HashMap<String, Bytes>>;

/// Serve `files` by name from `GET /<name>`; anything else is a 404.
/// `.glb` files are sent as `model/gltf-binary`, everything else as
/// `application/octet-stream`.
pub async fn source_server(files: &[(&str, &'static [u8])]) -> SourceServer {
    let files: Files = Arc::new(
        files
            .iter()
            .map(|(name, body)| (name.to_string(), Bytes::from_static(*body)))
            .collect(),
    );
    let queries = Arc::new(Mutex::new(Vec::new()));
    let seen = queries.clone();

    let app = Router::new()
        .route(
            "/:name",
            get(
                move |State(files): State<Files>,
                      UrlPath(name): UrlPath<String>,
                      uri: axum::http::Uri| {
                    seen.lock().unwrap().push(uri.query().map(str::to_string));
                    async move {
                        let content_type = if name.ends_with(".glb") {
                            "model/gltf-binary"
                        } else {
                            "application/octet-stream"
                        };
                        match files.get(&name) {
                            Some(body) => Ok(([(header::CONTENT_TYPE, content_type)], body.clone())),
                            None => Err(StatusCode::NOT_FOUND),
                        }
                    }
                },
            ),
        )
        .with_state(files);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    SourceServer { addr, queries }
}
