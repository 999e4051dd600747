//! Launch validation.
//!
//! Catches missing or non-executable programs before the spawn so the
//! supervisor can report `SpawnFailed` with a precise reason.

use procsup_common::{SupervisorError, SupervisorResult};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Resolve `program` to an existing executable file, the way the child will
/// see it.
///
/// Paths containing a separator are taken relative to `working_directory`
/// when one is set. Bare names are looked up in the `PATH` from
/// `environment`, falling back to the supervisor's own. The result is always
/// absolute, so it stays valid after the child changes directory.
pub fn resolve_executable(
    program: &str,
    working_directory: Option<&Path>,
    environment: &HashMap<String, String>,
) -> SupervisorResult<PathBuf> {
    if program.is_empty() {
        return Err(SupervisorError::spawn_failed(
            program,
            "Executable path cannot be empty",
        ));
    }

    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        let full = match working_directory {
            Some(dir) => dir.join(candidate),
            None => candidate.to_path_buf(),
        };
        let full =
            absolutize(full).map_err(|e| SupervisorError::spawn_failed(program, e.to_string()))?;
        return check_executable(&full).map(|_| full);
    }

    let path_var = environment
        .get("PATH")
        .map(OsString::from)
        .or_else(|| std::env::var_os("PATH"))
        .unwrap_or_default();
    for dir in std::env::split_paths(&path_var) {
        let dir = match working_directory {
            Some(wd) if dir.is_relative() => wd.join(dir),
            _ => dir,
        };
        let Ok(full) = absolutize(dir.join(program)) else {
            continue;
        };
        if check_executable(&full).is_ok() {
            return Ok(full);
        }
    }

    Err(SupervisorError::spawn_failed(
        program,
        "executable not found in PATH",
    ))
}

fn absolutize(path: PathBuf) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Validate that `path` names a regular file the current user may execute.
pub fn check_executable(path: &Path) -> SupervisorResult<()> {
    let display = path.display().to_string();
    let metadata = std::fs::metadata(path)
        .map_err(|e| SupervisorError::spawn_failed(&display, e.to_string()))?;

    if !metadata.is_file() {
        return Err(SupervisorError::spawn_failed(&display, "not a regular file"));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(SupervisorError::spawn_failed(&display, "permission denied (not executable)"));
        }
    }

    Ok(())
}

/// Validate a process label: non-empty, alphanumerics, `-`, `_` and `.`.
pub fn validate_label(label: &str) -> SupervisorResult<()> {
    if label.is_empty() {
        return Err(SupervisorError::configuration("Process id cannot be empty"));
    }

    if !label
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(SupervisorError::configuration(format!(
            "Process id '{}' can only contain alphanumeric characters, '-', '_' and '.'",
            label
        )));
    }

    Ok(())
}
