//! OS signals reach the supervisor through the relay.
//!
//! Kept in its own test binary: installing handlers changes how the whole
//! process reacts to the signal.

#![cfg(unix)]

use e2e_tests::assertions::{assert_killed, ensure};
use e2e_tests::{fast_supervisor, run_scenario, sleep_spec};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_sigquit_triggers_immediate_stop() {
    run_scenario("OS SIGQUIT relay", || async {
        let supervisor = fast_supervisor();
        let mut relay = supervisor.signal_relay();
        relay.listen_os().map_err(|e| format!("listen_os: {}", e))?;
        let relay = relay.spawn(Arc::new(supervisor.clone()));

        let handle = supervisor
            .start(sleep_spec(5))
            .map_err(|e| format!("start: {}", e))?;

        println!("Step 1: Sending SIGQUIT to the test process...");
        kill(Pid::this(), Signal::SIGQUIT).map_err(|e| e.to_string())?;

        tokio::time::timeout(Duration::from_secs(5), supervisor.wait_for_shutdown())
            .await
            .map_err(|_| "shutdown did not finish in time".to_string())?;

        ensure(supervisor.shutdown_exit_code() == Some(1), "SIGQUIT maps to exit code 1")?;
        assert_killed(&handle)?;
        println!("✓ SIGQUIT relayed into an immediate stop");

        relay.abort();
        Ok::<(), String>(())
    })
    .await;
}
