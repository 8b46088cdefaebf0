//! SIGTERM delivered to the test process drives the graceful drain.
//!
//! Kept in its own test binary: the signal goes to the whole process.

#![cfg(unix)]

use std::process::Command;
use std::time::Duration;

use sample_site::lifecycle::spawn_signal_listener;
use sample_site::Shutdown;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::filter::LevelFilter;

mod common;
use common::{spawn_site, CapturedLogs};

#[tokio::test]
async fn test_sigterm_triggers_shutdown_and_drains() {
    // Installed before the listener task runs, so an early signal never
    // hits the default handler and kills the test process.
    let _guard = signal(SignalKind::terminate()).unwrap();

    let logs = CapturedLogs::default();
    let shutdown = Shutdown::new();
    let mut observer = shutdown.subscribe();
    let (addr, server) = spawn_site(&logs, &shutdown).await;
    let listener = spawn_signal_listener(shutdown.clone(), logs.logger(LevelFilter::INFO));

    let request = tokio::spawn(async move {
        reqwest::get(format!("http://{addr}/slow")).await.unwrap()
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    tokio::time::timeout(Duration::from_secs(5), observer.recv())
        .await
        .expect("shutdown not triggered")
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), listener)
        .await
        .unwrap()
        .unwrap();

    let response = request.await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "done");

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();

    let records = logs.records();
    let received = records
        .iter()
        .find(|r| r["msg"] == "Termination signal received")
        .unwrap();
    assert_eq!(received["signal"], "SIGTERM");
    assert_eq!(logs.request_records()[0]["path"], "/slow");
}
