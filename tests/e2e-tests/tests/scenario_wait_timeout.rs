//! Scenario 2: Wait timeout
//!
//! `sleep 5` waited on with a 1s timeout is force-killed and reported as
//! `TimeoutExceeded`, well before it would have finished. A shell's own
//! children die with it.

#![cfg(unix)]

use e2e_tests::assertions::{assert_killed, assert_lines, ensure};
use e2e_tests::{fast_supervisor, run_scenario, sh_spec, sleep_spec};
use procsup_supervisor::{ProcessState, StreamType, SupervisorError};
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_wait_timeout_kills_child() {
    run_scenario("Wait timeout", || async {
        let supervisor = fast_supervisor();

        println!("Step 1: Starting sleep 5...");
        let handle = supervisor
            .start(sleep_spec(5))
            .map_err(|e| format!("start: {}", e))?;
        println!("✓ sleep running as pid {}\n", handle.pid());

        println!("Step 2: Waiting with a 1s timeout...");
        let began = Instant::now();
        let outcome = supervisor.wait(&handle, Some(Duration::from_secs(1))).await;
        let elapsed = began.elapsed();

        match outcome {
            Err(SupervisorError::TimeoutExceeded { pid, timeout }) => {
                ensure(pid == handle.pid(), "timeout error should name the child")?;
                ensure(timeout == Duration::from_secs(1), "timeout error should carry the limit")?;
            }
            other => return Err(format!("expected TimeoutExceeded, got {:?}", other)),
        }
        ensure(
            elapsed < Duration::from_secs(4),
            format!("wait should return shortly after the timeout, took {:?}", elapsed),
        )?;
        println!("✓ TimeoutExceeded after {:?}\n", elapsed);

        println!("Step 3: Checking final state...");
        assert_killed(&handle)?;
        ensure(handle.exit_code().is_none(), "a killed process has no exit code")?;
        let result = handle
            .exit_result()
            .ok_or("exit result should be published once wait returns")?;
        ensure(result.state == ProcessState::Killed, "reported state should be Killed")?;
        ensure(result.code == 137, format!("expected 128 + SIGKILL, got {}", result.code))?;
        println!("✓ Final state is killed with code 137");

        Ok::<(), String>(())
    })
    .await;
}

#[tokio::test]
async fn test_wait_without_timeout_returns_exit() {
    run_scenario("Wait without timeout", || async {
        let supervisor = fast_supervisor();
        let handle = supervisor
            .start(sleep_spec(1))
            .map_err(|e| format!("start: {}", e))?;

        let result = supervisor
            .wait(&handle, None)
            .await
            .map_err(|e| format!("wait: {}", e))?;
        ensure(result.success(), format!("sleep 1 should succeed, got {:?}", result))?;
        ensure(
            result.duration >= Duration::from_millis(900),
            format!("duration should cover the sleep, got {:?}", result.duration),
        )?;

        Ok::<(), String>(())
    })
    .await;
}

#[tokio::test]
async fn test_wait_timeout_kills_shell_and_its_children() {
    run_scenario("Wait timeout with grandchild", || async {
        let supervisor = fast_supervisor();

        println!("Step 1: Starting a shell that runs sleep 30 in the foreground...");
        let handle = supervisor
            .start(sh_spec("sleep 30; echo done"))
            .map_err(|e| format!("start: {}", e))?;
        println!("✓ shell running as pid {}\n", handle.pid());

        println!("Step 2: Waiting with a 1s timeout...");
        let began = Instant::now();
        let outcome = supervisor.wait(&handle, Some(Duration::from_secs(1))).await;
        let elapsed = began.elapsed();

        ensure(
            matches!(outcome, Err(SupervisorError::TimeoutExceeded { .. })),
            format!("expected TimeoutExceeded, got {:?}", outcome),
        )?;
        ensure(
            elapsed < Duration::from_millis(1800),
            format!("the sleeping child should die with the shell, took {:?}", elapsed),
        )?;
        println!("✓ TimeoutExceeded after {:?}\n", elapsed);

        println!("Step 3: Checking nothing was printed...");
        assert_killed(&handle)?;
        let stdout = handle
            .stdio()
            .read_lines(StreamType::Stdout)
            .collect_lines()
            .await;
        assert_lines(&stdout, &[])?;
        println!("✓ \"done\" never printed");

        Ok::<(), String>(())
    })
    .await;
}
