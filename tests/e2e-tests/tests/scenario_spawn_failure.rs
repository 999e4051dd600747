//! Scenario 3: Spawn failure
//!
//! A nonexistent or non-executable program fails with `SpawnFailed` and
//! leaves nothing registered with the supervisor.

#![cfg(unix)]

use e2e_tests::assertions::ensure;
use e2e_tests::{fast_supervisor, run_scenario};
use procsup_supervisor::{LaunchSpec, SupervisorError};

#[tokio::test]
async fn test_nonexistent_executable() {
    run_scenario("Spawn failure", || async {
        let supervisor = fast_supervisor();

        println!("Step 1: Starting a program that does not exist...");
        let outcome = supervisor.start(LaunchSpec::new("procsup-no-such-program-xyz"));
        match outcome {
            Err(SupervisorError::SpawnFailed { command, .. }) => {
                ensure(
                    command.contains("procsup-no-such-program-xyz"),
                    format!("error should name the program, got {}", command),
                )?;
            }
            other => return Err(format!("expected SpawnFailed, got {:?}", other)),
        }
        println!("✓ SpawnFailed returned\n");

        println!("Step 2: Checking nothing was registered...");
        ensure(supervisor.processes().is_empty(), "no handle should be registered")?;
        let stats = supervisor.stats();
        ensure(stats.spawned == 0, "nothing was spawned")?;
        ensure(stats.spawn_failures == 1, "one failure is counted")?;
        println!("✓ Registry empty");

        Ok::<(), String>(())
    })
    .await;
}

#[tokio::test]
async fn test_non_executable_file() {
    run_scenario("Spawn failure: not executable", || async {
        let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
        let script = dir.path().join("script.sh");
        std::fs::write(&script, "#!/bin/sh\necho hi\n").map_err(|e| e.to_string())?;

        let supervisor = fast_supervisor();
        let outcome = supervisor.start(LaunchSpec::new(script.display().to_string()));
        ensure(
            matches!(outcome, Err(SupervisorError::SpawnFailed { .. })),
            format!("expected SpawnFailed, got {:?}", outcome),
        )?;

        Ok::<(), String>(())
    })
    .await;
}
