//! Scenario 5: Signal-driven shutdown
//!
//! Two Interrupt signals delivered back to back start exactly one shutdown
//! sequence, which force-kills every running child and records exit code 1.

#![cfg(unix)]

use e2e_tests::assertions::{assert_killed, ensure};
use e2e_tests::{fast_supervisor, run_scenario, sh_spec, sleep_spec};
use procsup_signal::SignalKind;
use procsup_supervisor::ProcessState;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_double_interrupt_runs_one_shutdown() {
    run_scenario("Double interrupt", || async {
        let supervisor = fast_supervisor();
        let relay = supervisor.signal_relay().spawn(Arc::new(supervisor.clone()));
        let sender = relay.sender();

        println!("Step 1: Starting two long-running children...");
        let first = supervisor
            .start(sleep_spec(5))
            .map_err(|e| format!("start: {}", e))?;
        let second = supervisor
            .start(sleep_spec(5))
            .map_err(|e| format!("start: {}", e))?;
        println!("✓ pids {} and {}\n", first.pid(), second.pid());

        println!("Step 2: Delivering Interrupt twice...");
        ensure(sender.deliver(SignalKind::Interrupt), "first signal queued")?;
        ensure(sender.deliver(SignalKind::Interrupt), "second signal queued")?;

        tokio::time::timeout(Duration::from_secs(5), supervisor.wait_for_shutdown())
            .await
            .map_err(|_| "shutdown did not finish in time".to_string())?;
        // Let the dispatcher process the second signal too.
        tokio::time::sleep(Duration::from_millis(100)).await;
        println!("✓ Shutdown finished\n");

        println!("Step 3: Checking the outcome...");
        let stats = supervisor.stats();
        ensure(
            stats.shutdown_sequences == 1,
            format!("expected one shutdown sequence, got {}", stats.shutdown_sequences),
        )?;
        ensure(
            stats.kill_invocations == 2,
            format!("expected one kill per child, got {}", stats.kill_invocations),
        )?;
        ensure(supervisor.shutdown_exit_code() == Some(1), "interrupt maps to exit code 1")?;
        assert_killed(&first)?;
        assert_killed(&second)?;
        println!("✓ One shutdown, both children killed, exit code 1");

        relay.abort();
        Ok::<(), String>(())
    })
    .await;
}

#[tokio::test]
async fn test_hangup_stops_gracefully() {
    run_scenario("Hangup graceful stop", || async {
        let supervisor = fast_supervisor();
        let relay = supervisor.signal_relay().spawn(Arc::new(supervisor.clone()));

        println!("Step 1: Starting a child that exits cleanly on SIGTERM...");
        let handle = supervisor
            .start(sh_spec("trap 'echo bye; exit 0' TERM; while :; do sleep 0.1; done"))
            .map_err(|e| format!("start: {}", e))?;
        tokio::time::sleep(Duration::from_millis(200)).await;

        println!("Step 2: Delivering Hangup...");
        relay.sender().deliver(SignalKind::Hangup);
        tokio::time::timeout(Duration::from_secs(5), supervisor.wait_for_shutdown())
            .await
            .map_err(|_| "shutdown did not finish in time".to_string())?;

        let result = supervisor
            .wait(&handle, Some(Duration::from_secs(5)))
            .await
            .map_err(|e| format!("wait: {}", e))?;
        ensure(
            result.state == ProcessState::Exited && result.code == 0,
            format!("child should exit on its own, got {:?}", result),
        )?;
        ensure(supervisor.shutdown_exit_code() == Some(0), "hangup maps to exit code 0")?;

        let said = handle
            .stdio()
            .read_lines(procsup_supervisor::StreamType::Stdout)
            .collect_lines()
            .await;
        ensure(said == vec!["bye".to_string()], format!("expected goodbye, got {:?}", said))?;
        println!("✓ Child handled SIGTERM and exited 0");

        relay.abort();
        Ok::<(), String>(())
    })
    .await;
}

#[tokio::test]
async fn test_ignored_signal_does_not_stop() {
    run_scenario("Ignored signal", || async {
        let supervisor = fast_supervisor();
        let relay = supervisor.signal_relay().spawn(Arc::new(supervisor.clone()));
        let handle = supervisor
            .start(sleep_spec(5))
            .map_err(|e| format!("start: {}", e))?;

        relay.sender().deliver(SignalKind::User1);
        tokio::time::sleep(Duration::from_millis(200)).await;

        ensure(!supervisor.is_shutting_down(), "User1 must not start a shutdown")?;
        ensure(handle.state() == ProcessState::Running, "child keeps running")?;

        supervisor.kill(&handle).await.map_err(|e| e.to_string())?;
        relay.abort();
        Ok::<(), String>(())
    })
    .await;
}
