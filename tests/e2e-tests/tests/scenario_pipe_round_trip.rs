//! Scenario 1: Pipe round trip
//!
//! Lines written to a child's stdin come back on its stdout in order, and
//! the child exits cleanly once stdin is closed.

#![cfg(unix)]

use e2e_tests::assertions::{assert_exited_with, assert_killed, assert_lines, ensure};
use e2e_tests::{cat_spec, fast_supervisor, run_scenario, step_err};
use procsup_supervisor::StreamType;
use std::time::Duration;

const MESSAGES: [&str; 3] = ["Hello", "Golang", "is awesome"];

#[tokio::test]
async fn test_pipe_round_trip() {
    run_scenario("Pipe round trip", || async {
        let supervisor = fast_supervisor();

        println!("Step 1: Starting cat with piped stdio...");
        let handle = supervisor.start(cat_spec()).map_err(step_err("start"))?;
        let lines = handle.stdio().read_lines(StreamType::Stdout);
        println!("✓ cat running as pid {}\n", handle.pid());

        println!("Step 2: Writing {} lines...", MESSAGES.len());
        for message in MESSAGES {
            handle
                .stdio()
                .write_line(message)
                .await
                .map_err(step_err("write_line"))?;
        }
        handle.stdio().close_stdin().await;
        println!("✓ Lines written, stdin closed\n");

        println!("Step 3: Reading lines back...");
        let echoed = lines.collect_lines().await;
        assert_lines(&echoed, &MESSAGES)?;
        println!("✓ Read back {:?}\n", echoed);

        println!("Step 4: Waiting for exit...");
        let result = supervisor
            .wait(&handle, Some(Duration::from_secs(5)))
            .await
            .map_err(step_err("wait"))?;
        assert_exited_with(&result, 0)?;
        ensure(handle.stdio().is_fully_closed(), "all streams should be closed")?;
        println!("✓ cat exited with code 0");

        Ok::<(), String>(())
    })
    .await;
}

#[tokio::test]
async fn test_pipe_then_kill() {
    run_scenario("Pipe then kill", || async {
        let supervisor = fast_supervisor();
        let handle = supervisor.start(cat_spec()).map_err(step_err("start"))?;
        let mut lines = handle.stdio().read_lines(StreamType::Stdout);

        println!("Step 1: Writing and reading without closing stdin...");
        for message in MESSAGES {
            handle
                .stdio()
                .write_line(message)
                .await
                .map_err(step_err("write_line"))?;
            let echoed = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
                .await
                .map_err(step_err("read"))?;
            ensure(
                echoed.as_deref() == Some(message),
                format!("expected {:?}, got {:?}", message, echoed),
            )?;
        }
        println!("✓ Every line echoed\n");

        println!("Step 2: Killing cat while it still waits for input...");
        supervisor.kill(&handle).await.map_err(step_err("kill"))?;
        assert_killed(&handle)?;

        let result = supervisor.wait(&handle, None).await.map_err(step_err("wait"))?;
        ensure(result.signal == Some(9), format!("expected SIGKILL, got {:?}", result))?;
        ensure(lines.next_line().await.is_none(), "stdout should be exhausted")?;

        let err = handle.stdio().write_line("too late").await;
        ensure(err.is_err(), "write after exit should fail")?;
        println!("✓ cat killed, pipes closed");

        Ok::<(), String>(())
    })
    .await;
}
