//! Custom assertions for E2E tests

use procsup_supervisor::{ExitResult, ProcessHandle, ProcessState};

/// Assert that a process exited on its own with `code`
pub fn assert_exited_with(result: &ExitResult, code: i32) -> Result<(), String> {
    if result.state == ProcessState::Exited && result.code == code {
        Ok(())
    } else {
        Err(format!(
            "Expected natural exit with code {}, got {:?}",
            code, result
        ))
    }
}

/// Assert that the supervisor killed the process
pub fn assert_killed(handle: &ProcessHandle) -> Result<(), String> {
    match handle.state() {
        ProcessState::Killed => Ok(()),
        other => Err(format!(
            "Process '{}' (pid {}) should be killed, but is {}",
            handle.label(),
            handle.pid(),
            other
        )),
    }
}

/// Assert that collected lines match exactly, in order
pub fn assert_lines(actual: &[String], expected: &[&str]) -> Result<(), String> {
    if actual.iter().map(String::as_str).eq(expected.iter().copied()) {
        Ok(())
    } else {
        Err(format!("Expected lines {:?}, got {:?}", expected, actual))
    }
}

/// Assert a condition with a message
pub fn ensure(condition: bool, message: impl Into<String>) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(message.into())
    }
}
