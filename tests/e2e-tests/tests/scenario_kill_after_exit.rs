//! Scenario 4: Kill after exit
//!
//! Killing a process that already exited is a no-op success: the state and
//! exit code of the natural exit are preserved.

#![cfg(unix)]

use e2e_tests::assertions::{assert_exited_with, ensure};
use e2e_tests::{fast_supervisor, run_scenario, sh_spec, sleep_spec};
use procsup_supervisor::{KillAck, ProcessState};

#[tokio::test]
async fn test_kill_after_exit_is_noop() {
    run_scenario("Kill after exit", || async {
        let supervisor = fast_supervisor();

        println!("Step 1: Running a child that exits with code 3...");
        let handle = supervisor
            .start(sh_spec("exit 3"))
            .map_err(|e| format!("start: {}", e))?;
        let result = supervisor
            .wait(&handle, None)
            .await
            .map_err(|e| format!("wait: {}", e))?;
        assert_exited_with(&result, 3)?;
        let ended_at = handle.ended_at();
        println!("✓ Child exited with code 3\n");

        println!("Step 2: Killing it twice...");
        for attempt in 1..=2 {
            let ack = supervisor
                .kill(&handle)
                .await
                .map_err(|e| format!("kill #{}: {}", attempt, e))?;
            ensure(
                ack == KillAck::AlreadyTerminal,
                format!("kill #{} should be a no-op, got {:?}", attempt, ack),
            )?;
        }
        println!("✓ Both kills were no-ops\n");

        println!("Step 3: Checking state is unchanged...");
        ensure(handle.state() == ProcessState::Exited, "state should stay exited")?;
        ensure(handle.exit_code() == Some(3), "exit code should be preserved")?;
        ensure(handle.ended_at() == ended_at, "ended_at should be set exactly once")?;
        println!("✓ State unchanged");

        Ok::<(), String>(())
    })
    .await;
}

#[tokio::test]
async fn test_repeated_kill_on_running_child() {
    run_scenario("Repeated kill", || async {
        let supervisor = fast_supervisor();
        let handle = supervisor
            .start(sleep_spec(5))
            .map_err(|e| format!("start: {}", e))?;

        let first = supervisor.kill(&handle).await.map_err(|e| e.to_string())?;
        let second = supervisor.kill(&handle).await.map_err(|e| e.to_string())?;
        ensure(first == KillAck::Killed, format!("first kill: {:?}", first))?;
        ensure(second == KillAck::AlreadyTerminal, format!("second kill: {:?}", second))?;

        let transitions = handle.history();
        let killed = transitions
            .iter()
            .filter(|t| t.to_state == ProcessState::Killed)
            .count();
        ensure(killed == 1, format!("expected one Killed transition, got {}", killed))?;

        Ok::<(), String>(())
    })
    .await;
}
