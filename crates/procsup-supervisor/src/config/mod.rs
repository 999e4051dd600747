use crate::launch::LaunchSpec;
use crate::supervisor::SupervisorOptions;
use anyhow::{Context, Result};
use procsup_signal::ActionTable;
use procsup_stdio::StdioConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub mod validation;

pub use duration_serde::parse_duration;

/// Top-level configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default)]
    pub supervisor: SupervisorSettings,
    #[serde(default)]
    pub processes: Vec<ProcessConfig>,
}

/// Supervisor-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_grace_period", with = "duration_serde")]
    pub grace_period: Duration,
    #[serde(default = "default_kill_confirm_timeout", with = "duration_serde")]
    pub kill_confirm_timeout: Duration,
    #[serde(default = "default_drain_timeout", with = "duration_serde")]
    pub drain_timeout: Duration,
    #[serde(default = "default_signal_queue_capacity")]
    pub signal_queue_capacity: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            grace_period: default_grace_period(),
            kill_confirm_timeout: default_kill_confirm_timeout(),
            drain_timeout: default_drain_timeout(),
            signal_queue_capacity: default_signal_queue_capacity(),
        }
    }
}

impl SupervisorSettings {
    /// Runtime options with the default signal action table.
    pub fn to_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            grace_period: self.grace_period,
            kill_confirm_timeout: self.kill_confirm_timeout,
            drain_timeout: self.drain_timeout,
            signal_queue_capacity: self.signal_queue_capacity,
            actions: ActionTable::default(),
        }
    }
}

/// One process to launch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    pub id: String,
    pub executable_path: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub stdio: StdioConfig,
    /// Passed to `wait`; absent means wait indefinitely
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_duration_serde"
    )]
    pub wait_timeout: Option<Duration>,
}

impl ProcessConfig {
    pub fn to_launch_spec(&self) -> LaunchSpec {
        let mut spec = LaunchSpec::new(self.executable_path.as_str())
            .label(self.id.as_str())
            .args(self.args.iter().cloned())
            .stdio(self.stdio.clone());
        if let Some(dir) = &self.working_directory {
            spec = spec.working_directory(dir);
        }
        spec.environment = self.environment.clone();
        spec
    }
}

impl SupervisorConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: SupervisorConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    pub fn launch_specs(&self) -> Vec<LaunchSpec> {
        self.processes.iter().map(ProcessConfig::to_launch_spec).collect()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_grace_period() -> Duration {
    Duration::from_secs(5)
}

fn default_kill_confirm_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_drain_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_signal_queue_capacity() -> usize {
    8
}

// Human durations: "500ms", "5s", "2m"
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn format_duration(duration: &Duration) -> String {
        if duration.subsec_millis() == 0 {
            format!("{}s", duration.as_secs())
        } else {
            format!("{}ms", duration.as_millis())
        }
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let invalid = || format!("Invalid duration: {}", s);

        // "ms" before "s", since "ms" ends with 's'
        if let Some(num) = s.strip_suffix("ms") {
            num.parse().map(Duration::from_millis).map_err(|_| invalid())
        } else if let Some(num) = s.strip_suffix('s') {
            num.parse().map(Duration::from_secs).map_err(|_| invalid())
        } else if let Some(num) = s.strip_suffix('m') {
            num.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| invalid())
        } else {
            // Bare numbers are seconds
            s.parse().map(Duration::from_secs).map_err(|_| invalid())
        }
    }
}

mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_str(&super::duration_serde::format_duration(d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) => super::duration_serde::parse_duration(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
