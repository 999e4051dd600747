//! Stdio routing and output capture
//!
//! Redirects land in files, unpiped streams start closed, and everything a
//! child printed is readable once `wait` returns.

#![cfg(unix)]

use e2e_tests::assertions::{assert_exited_with, assert_lines, ensure};
use e2e_tests::{fast_supervisor, run_scenario, sh_spec};
use procsup_supervisor::{StdioConfig, StdioRouting, StreamType};

#[tokio::test]
async fn test_redirect_to_file() {
    run_scenario("Redirect to file", || async {
        let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
        let out = dir.path().join("logs").join("out.log");
        let input = dir.path().join("input.txt");
        std::fs::write(&input, "from file\n").map_err(|e| e.to_string())?;

        let supervisor = fast_supervisor();
        let spec = sh_spec("cat; echo done").stdio(StdioConfig {
            stdin: StdioRouting::RedirectToFile(input.clone()),
            stdout: StdioRouting::RedirectToFile(out.clone()),
            stderr: StdioRouting::Null,
        });

        println!("Step 1: Running with stdin and stdout redirected...");
        let handle = supervisor.start(spec).map_err(|e| format!("start: {}", e))?;
        ensure(handle.stdio().is_fully_closed(), "no stream is piped")?;

        let result = supervisor
            .wait(&handle, None)
            .await
            .map_err(|e| format!("wait: {}", e))?;
        assert_exited_with(&result, 0)?;

        let written = std::fs::read_to_string(&out).map_err(|e| e.to_string())?;
        ensure(
            written == "from file\ndone\n",
            format!("unexpected file content {:?}", written),
        )?;
        println!("✓ Output landed in {}", out.display());

        println!("Step 2: Running again appends...");
        let again = sh_spec("echo again").stdio(StdioConfig {
            stdout: StdioRouting::RedirectToFile(out.clone()),
            ..StdioConfig::default()
        });
        let handle = supervisor.start(again).map_err(|e| format!("start: {}", e))?;
        supervisor
            .wait(&handle, None)
            .await
            .map_err(|e| format!("wait: {}", e))?;
        let written = std::fs::read_to_string(&out).map_err(|e| e.to_string())?;
        ensure(written.ends_with("done\nagain\n"), format!("expected append, got {:?}", written))?;
        println!("✓ Redirect appends");

        Ok::<(), String>(())
    })
    .await;
}

#[tokio::test]
async fn test_large_output_is_drained_before_wait_returns() {
    run_scenario("Drain before report", || async {
        let supervisor = fast_supervisor();
        // Well past a 64 KiB pipe buffer, with nobody reading while it runs.
        let handle = supervisor
            .start(sh_spec(
                "i=0; while [ $i -lt 5000 ]; do echo \"line $i of padding padding\"; i=$((i+1)); done",
            ))
            .map_err(|e| format!("start: {}", e))?;

        let result = supervisor
            .wait(&handle, None)
            .await
            .map_err(|e| format!("wait: {}", e))?;
        assert_exited_with(&result, 0)?;

        let status = handle.stdio().status();
        ensure(
            status.stdout.lines_read == 5000,
            format!("all lines should be drained, got {}", status.stdout.lines_read),
        )?;

        let lines = handle.stdio().read_lines(StreamType::Stdout).collect_lines().await;
        ensure(lines.len() == 5000, format!("expected 5000 lines, got {}", lines.len()))?;
        ensure(lines[0] == "line 0 of padding padding", "first line kept")?;
        ensure(lines[4999] == "line 4999 of padding padding", "last line kept")?;

        Ok::<(), String>(())
    })
    .await;
}

#[tokio::test]
async fn test_output_capture() {
    run_scenario("Output capture", || async {
        let supervisor = fast_supervisor();
        let captured = supervisor
            .output(sh_spec("echo one; echo two; echo warn >&2; exit 4"), None)
            .await
            .map_err(|e| format!("output: {}", e))?;

        assert_exited_with(&captured.exit, 4)?;
        assert_lines(&captured.stdout, &["one", "two"])?;
        assert_lines(&captured.stderr, &["warn"])?;

        Ok::<(), String>(())
    })
    .await;
}

#[tokio::test]
async fn test_trailing_partial_line() {
    run_scenario("Trailing partial line", || async {
        let supervisor = fast_supervisor();
        let captured = supervisor
            .output(sh_spec("printf 'a\\nb\\r\\nno newline'"), None)
            .await
            .map_err(|e| format!("output: {}", e))?;

        assert_lines(&captured.stdout, &["a", "b", "no newline"])?;
        Ok::<(), String>(())
    })
    .await;
}
