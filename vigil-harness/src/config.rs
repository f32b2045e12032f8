//! Job configuration
//!
//! Identifies one scheduled job (project and script) and carries its runtime
//! limits. Jobs are started by an OS scheduler, so configuration comes from
//! environment variables set in the task definition, with explicit
//! construction available for tests and ad-hoc runs.

use std::path::PathBuf;
use std::time::Duration;

use vigil_core::domain::ledger::sanitize_identifier;

use crate::logger::{RunLogError, RunLogger};

/// Configuration for one job process.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Project this job belongs to, as recorded in the shared ledger.
    pub project: String,

    /// Script identifier within the project; also names the run log file.
    pub script: String,

    /// Directory holding this job's run log.
    pub log_dir: PathBuf,

    /// Maximum time the job may run before the asynchronous exit manager
    /// cancels it. `None` means no deadline.
    pub job_timeout: Option<Duration>,
}

impl JobConfig {
    /// Creates a configuration with no timeout.
    pub fn new(
        project: impl Into<String>,
        script: impl Into<String>,
        log_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project: project.into(),
            script: script.into(),
            log_dir: log_dir.into(),
            job_timeout: None,
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// Expected environment variables:
    /// - VIGIL_PROJECT (required)
    /// - VIGIL_SCRIPT (required)
    /// - VIGIL_LOG_DIR (optional, default: "logs")
    /// - VIGIL_JOB_TIMEOUT_SECS (optional, seconds, default: none)
    pub fn from_env() -> anyhow::Result<Self> {
        let project = std::env::var("VIGIL_PROJECT")
            .map_err(|_| anyhow::anyhow!("VIGIL_PROJECT environment variable not set"))?;

        let script = std::env::var("VIGIL_SCRIPT")
            .map_err(|_| anyhow::anyhow!("VIGIL_SCRIPT environment variable not set"))?;

        let log_dir = std::env::var("VIGIL_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("logs"));

        let job_timeout = std::env::var("VIGIL_JOB_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);

        Ok(Self {
            project,
            script,
            log_dir,
            job_timeout,
        })
    }

    /// Sets the job deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    /// Validates the configuration.
    ///
    /// Identifiers end up verbatim in ledger rows and the run log file name,
    /// so they must be non-empty, survive ledger sanitization unchanged, and
    /// contain no path separators.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.project.is_empty() {
            anyhow::bail!("project cannot be empty");
        }

        if self.script.is_empty() {
            anyhow::bail!("script cannot be empty");
        }

        for (field, value) in [("project", &self.project), ("script", &self.script)] {
            if sanitize_identifier(value) != *value {
                anyhow::bail!("{field} contains characters reserved by the ledger format");
            }
            if value.contains(['/', '\\']) {
                anyhow::bail!("{field} must not contain path separators");
            }
        }

        if self.job_timeout == Some(Duration::ZERO) {
            anyhow::bail!("job_timeout must be greater than 0");
        }

        Ok(())
    }

    /// Opens this job's run logger under `log_dir`.
    pub fn run_logger(&self) -> Result<RunLogger, RunLogError> {
        RunLogger::create(&self.log_dir, &self.script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_config_validates() {
        let config = JobConfig::new("projectA", "scriptX", "logs");
        assert!(config.validate().is_ok());
        assert_eq!(config.job_timeout, None);
    }

    #[test]
    fn test_config_validation() {
        let mut config = JobConfig::new("projectA", "scriptX", "logs");

        config.project = String::new();
        assert!(config.validate().is_err());

        config.project = "projectA".to_string();
        config.script = "bad,script".to_string();
        assert!(config.validate().is_err());

        config.script = "bad/script".to_string();
        assert!(config.validate().is_err());

        config.script = "multi\nline".to_string();
        assert!(config.validate().is_err());

        config.script = "scriptX".to_string();
        assert!(config.validate().is_ok());

        config.job_timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_timeout() {
        let config =
            JobConfig::new("projectA", "scriptX", "logs").with_timeout(Duration::from_secs(900));
        assert_eq!(config.job_timeout, Some(Duration::from_secs(900)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_run_logger_uses_script_name() {
        let dir = tempfile::tempdir().unwrap();
        let config = JobConfig::new("projectA", "scriptX", dir.path());
        let logger = config.run_logger().unwrap();
        assert!(logger.path().ends_with("scriptX.log"));
    }
}
