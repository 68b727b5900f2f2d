use super::support::{Behaviour, Harness};
use devloop_runner::error::Error;
use devloop_runner::{LifecycleEvent, NotifyWatchSource};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_missing_artifact_fails_before_server_starts() {
    let harness = Harness::without_artifact();
    let runner = harness.runner(Behaviour::default());
    let journal = runner.journal();

    let result = runner.run(std::future::pending::<()>()).await;

    match result {
        Err(Error::MissingArtifact(path)) => assert_eq!(path, harness.artifact),
        other => panic!("expected MissingArtifact, got {other:?}"),
    }
    assert_eq!(harness.log.count("start"), 0);
    assert!(!harness.port_bound.load(Ordering::SeqCst));
    assert_eq!(journal.count(LifecycleEvent::ServerStarted), 0);
    assert_eq!(harness.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_startup_subscribes_installs_then_starts() -> devloop_runner::Result<()> {
    let harness = Harness::new();
    let runner = harness.runner(Behaviour::default());
    let journal = runner.journal();

    let running = harness.spawn(runner);
    harness.wait_for_entry("start", 1).await;

    assert_eq!(
        harness.log.entries(),
        vec!["subscribe", "install port_bound=false", "installed", "start"]
    );
    assert!(harness.port_bound.load(Ordering::SeqCst));
    assert_eq!(
        journal.kinds(),
        vec![LifecycleEvent::Installed, LifecycleEvent::ServerStarted]
    );

    running.shutdown().await
}

#[tokio::test]
async fn test_missing_artifact_directory_still_reports_missing_artifact() {
    let harness = Harness::in_missing_dir();
    let watch = NotifyWatchSource::new(Duration::from_millis(50), Duration::from_millis(10));
    let runner = harness.runner_with_watch(Behaviour::default(), watch);

    let result = runner.run(std::future::pending::<()>()).await;

    match result {
        Err(Error::MissingArtifact(path)) => assert_eq!(path, harness.artifact),
        other => panic!("expected MissingArtifact, got {other:?}"),
    }
    assert_eq!(harness.log.count("start"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_startup_install_returns_promptly() -> devloop_runner::Result<()> {
    let harness = Harness::new();
    let runner = harness.runner(Behaviour {
        install_delay: Duration::from_secs(60),
        ..Behaviour::default()
    });
    let journal = runner.journal();
    let running = harness.spawn(runner);
    harness.wait_for_entry("install port_bound=false", 1).await;

    let requested = Instant::now();
    running.shutdown().await?;

    assert!(requested.elapsed() < Duration::from_secs(1));
    assert_eq!(
        harness.log.entries(),
        vec!["subscribe", "install port_bound=false", "close"]
    );
    assert_eq!(harness.closes.load(Ordering::SeqCst), 1);
    assert_eq!(journal.count(LifecycleEvent::ServerStarted), 0);
    Ok(())
}
