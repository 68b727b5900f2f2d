use super::support::{wait_until, Behaviour, Harness};
use devloop_runner::{LifecycleEvent, Result};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time;

#[tokio::test(start_paused = true)]
async fn test_burst_coalesces_into_one_cycle_with_last_reason() -> Result<()> {
    let harness = Harness::new();
    let runner = harness.runner(Behaviour::default());
    let journal = runner.journal();
    let running = harness.spawn(runner);
    harness.wait_for_entry("start", 1).await;

    harness.emit(harness.change()).await;
    time::sleep(Duration::from_millis(100)).await;
    harness.emit(harness.change()).await;
    time::sleep(Duration::from_millis(100)).await;
    harness.emit(harness.add()).await;

    // Still inside the window measured from the last event.
    time::sleep(Duration::from_millis(300)).await;
    assert_eq!(journal.count(LifecycleEvent::CycleStarted), 0);

    time::sleep(Duration::from_millis(700)).await;
    assert_eq!(journal.count(LifecycleEvent::CycleStarted), 1);
    assert_eq!(journal.count(LifecycleEvent::CycleCompleted), 1);

    let started = journal
        .events(None)?
        .into_iter()
        .find(|r| r.event == LifecycleEvent::CycleStarted)
        .expect("cycle started");
    assert_eq!(started.reason.as_deref(), Some("artifact:add"));

    assert_eq!(
        harness.log.entries(),
        vec![
            "subscribe",
            "install port_bound=false",
            "installed",
            "start",
            "stop",
            "stopped",
            "install port_bound=false",
            "installed",
            "start",
        ]
    );
    assert!(harness.port_bound.load(Ordering::SeqCst));

    running.shutdown().await
}

#[tokio::test(start_paused = true)]
async fn test_trigger_during_in_flight_cycle_is_dropped() -> Result<()> {
    let harness = Harness::new();
    let runner = harness.runner(Behaviour {
        install_delay: Duration::from_secs(2),
        ..Behaviour::default()
    });
    let journal = runner.journal();
    let running = harness.spawn(runner);
    harness.wait_for_entry("start", 1).await;

    harness.emit(harness.change()).await;
    harness.wait_for_entry("stopped", 1).await;

    // Fires 350ms later, while the cycle is still installing.
    harness.emit(harness.change()).await;
    let dropped = journal.clone();
    wait_until("dropped trigger", || {
        dropped.count(LifecycleEvent::CycleDropped) == 1
    })
    .await;

    let completed = journal.clone();
    wait_until("cycle completion", || {
        completed.count(LifecycleEvent::CycleCompleted) == 1
    })
    .await;
    time::sleep(Duration::from_secs(5)).await;

    assert_eq!(journal.count(LifecycleEvent::CycleStarted), 1);
    assert_eq!(journal.count(LifecycleEvent::CycleDropped), 1);
    assert_eq!(harness.log.count("start"), 2);
    assert_eq!(harness.max_active_installs.load(Ordering::SeqCst), 1);

    running.shutdown().await
}

#[tokio::test(start_paused = true)]
async fn test_failed_cycle_leaves_server_stopped_and_loop_alive() -> Result<()> {
    let harness = Harness::new();
    let runner = harness.runner(Behaviour::default());
    let journal = runner.journal();
    let running = harness.spawn(runner);
    harness.wait_for_entry("start", 1).await;

    harness.remove_artifact();
    harness.emit(harness.change()).await;
    let failed = journal.clone();
    wait_until("cycle failure", || {
        failed.count(LifecycleEvent::CycleFailed) == 1
    })
    .await;

    let failure = journal
        .events(None)?
        .into_iter()
        .find(|r| r.event == LifecycleEvent::CycleFailed)
        .expect("cycle failed");
    assert!(failure
        .details
        .as_deref()
        .is_some_and(|d| d.contains("Artifact not found")));
    assert_eq!(harness.log.entries().last().map(String::as_str), Some("stopped"));
    assert!(!harness.port_bound.load(Ordering::SeqCst));

    // No retry until the next real event.
    time::sleep(Duration::from_secs(5)).await;
    assert_eq!(journal.count(LifecycleEvent::CycleStarted), 1);

    harness.write_artifact();
    harness.emit(harness.add()).await;
    let completed = journal.clone();
    wait_until("second cycle", || {
        completed.count(LifecycleEvent::CycleCompleted) == 1
    })
    .await;

    assert_eq!(harness.log.entries().last().map(String::as_str), Some("start"));
    assert!(harness.port_bound.load(Ordering::SeqCst));

    running.shutdown().await
}
