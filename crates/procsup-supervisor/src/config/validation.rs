use super::*;
use anyhow::{anyhow, Result};
use procsup_process::validate_label;
use std::collections::HashSet;

/// Validate the complete configuration
pub fn validate_config(config: &SupervisorConfig) -> Result<()> {
    validate_settings(&config.supervisor)?;
    validate_process_configs(&config.processes)?;
    Ok(())
}

fn validate_settings(settings: &SupervisorSettings) -> Result<()> {
    if settings.signal_queue_capacity == 0 {
        return Err(anyhow!("Signal queue capacity must be greater than 0"));
    }

    if settings.kill_confirm_timeout.is_zero() {
        return Err(anyhow!("Kill confirm timeout must be greater than 0"));
    }

    match settings.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(anyhow!(
            "Invalid log level: {}, must be one of: trace, debug, info, warn, error",
            settings.log_level
        )),
    }
}

fn validate_process_configs(processes: &[ProcessConfig]) -> Result<()> {
    let mut ids = HashSet::new();
    for process in processes {
        if !ids.insert(process.id.as_str()) {
            return Err(anyhow!("Duplicate process ID: {}", process.id));
        }
        validate_process_config(process)?;
    }
    Ok(())
}

fn validate_process_config(process: &ProcessConfig) -> Result<()> {
    validate_label(&process.id)?;

    if process.executable_path.trim().is_empty() {
        return Err(anyhow!("Process {}: executable_path cannot be empty", process.id));
    }

    if let Some(dir) = &process.working_directory {
        if dir.trim().is_empty() {
            return Err(anyhow!("Process {}: working_directory cannot be empty", process.id));
        }
    }

    Ok(())
}
