//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::routing::get;
use sample_site::http::{routes, with_middleware, AppState, HttpServer};
use sample_site::observability::{Encoding, Logger, Sink};
use sample_site::Shutdown;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing_subscriber::filter::LevelFilter;

/// In-memory log destination. Clones share the buffer.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    pub fn sink(&self, encoding: Encoding, level: LevelFilter) -> Sink {
        let logs = self.clone();
        Sink::writer(move || logs.clone(), encoding, level)
    }

    /// A logger writing JSON at `level` into this buffer.
    pub fn logger(&self, level: LevelFilter) -> Logger {
        Logger::from_sinks([self.sink(Encoding::Json, level)])
    }

    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    /// Every line parsed as a JSON object.
    pub fn records(&self) -> Vec<Value> {
        self.contents()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    /// Records emitted by the request log middleware.
    pub fn request_records(&self) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|r| r.get("status").is_some())
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records()
            .iter()
            .map(|r| r["msg"].as_str().unwrap().to_string())
            .collect()
    }
}

/// Responds `done` after 300ms.
pub async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_millis(300)).await;
    "done"
}

/// Serve the site plus `/slow` on an ephemeral local port until `shutdown`
/// fires. Logs go to `logs` at info level.
pub async fn spawn_site(
    logs: &CapturedLogs,
    shutdown: &Shutdown,
) -> (SocketAddr, JoinHandle<io::Result<()>>) {
    let logger = logs.logger(LevelFilter::INFO);
    let state = AppState::new(logger.clone());
    let router = with_middleware(routes().route("/slow", get(slow)), state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let receiver = shutdown.subscribe();
    let server = HttpServer::with_router(router, logger);
    (addr, tokio::spawn(server.run(listener, receiver)))
}
