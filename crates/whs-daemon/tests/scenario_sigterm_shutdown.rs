//! SIGTERM must resolve the shutdown future the server drains on, same as
//! Ctrl-C: service managers stop daemons with SIGTERM, not SIGINT.

#![cfg(unix)]

use std::time::Duration;

use whs_daemon::scheduler::shutdown_signal;

#[tokio::test]
async fn scenario_sigterm_resolves_shutdown_future() {
    let waiter = tokio::spawn(shutdown_signal());

    // Let the handler install before the signal is raised; an unhandled
    // SIGTERM would kill the test process outright.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let pid = std::process::id().to_string();
    let status = std::process::Command::new("kill")
        .args(["-TERM", &pid])
        .status()
        .expect("failed to spawn kill");
    assert!(status.success());

    tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("shutdown future did not resolve on SIGTERM")
        .expect("shutdown task panicked");
}
