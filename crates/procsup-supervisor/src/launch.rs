//! Launch specification

use procsup_stdio::StdioConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Everything needed to start one child process.
///
/// Built with a consuming builder:
///
/// ```
/// use procsup_supervisor::{LaunchSpec, StdioConfig};
///
/// let spec = LaunchSpec::new("/bin/sh")
///     .label("greeter")
///     .args(["-c", "echo $GREETING"])
///     .env("GREETING", "hi")
///     .stdio(StdioConfig::default());
/// assert_eq!(spec.display_label(), "greeter");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub label: Option<String>,
    /// Path, relative to `working_directory` when set, or a bare name
    /// looked up on `PATH` (an `environment` override wins)
    pub executable: String,
    pub args: Vec<String>,
    pub working_directory: Option<PathBuf>,
    /// Overrides layered over the supervisor's own environment
    pub environment: HashMap<String, String>,
    pub stdio: StdioConfig,
}

impl LaunchSpec {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            label: None,
            executable: executable.into(),
            args: Vec::new(),
            working_directory: None,
            environment: HashMap::new(),
            stdio: StdioConfig::default(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn stdio(mut self, stdio: StdioConfig) -> Self {
        self.stdio = stdio;
        self
    }

    /// The explicit label, or the executable's file name.
    pub fn display_label(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        Path::new(&self.executable)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.executable.clone())
    }

    /// Executable and args joined with spaces, for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.executable.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
