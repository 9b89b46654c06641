//! Operator configuration.
//!
//! Loaded from a TOML or JSON file, then overridden from `OPERATOR_*`
//! environment variables.

use std::path::Path;
use std::time::Duration;

use operator_commands::CommandConfig;
use operator_reconciler::{LoopConfig, ManagerConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Operator process settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Seconds between full resyncs of every controller.
    pub resync_interval: u64,
    /// Immediate retries after a write conflict.
    pub conflict_retries: u32,
    /// Milliseconds each command takes under dry run.
    pub dry_run_delay: u64,
    /// Seconds `run` waits for the operation to finish.
    pub run_timeout: u64,
    /// Tracing filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub commands: CommandConfig,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            resync_interval: 10,
            conflict_retries: 3,
            dry_run_delay: 3000,
            run_timeout: 3600,
            log_filter: "info".to_string(),
            commands: CommandConfig::default(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from a file. JSON when the extension says so,
    /// TOML otherwise.
    pub fn from_file(path: &Path) -> operator_core::Result<Self> {
        let format = match operator_core::DocumentFormat::from_path(path) {
            Some(operator_core::DocumentFormat::Json) => operator_core::DocumentFormat::Json,
            _ => operator_core::DocumentFormat::Toml,
        };
        let content = std::fs::read_to_string(path)
            .map_err(|e| operator_core::Error::file_read_failed(path, e.to_string()))?;
        operator_core::parse_document(format, &content)
    }

    /// Defaults overridden from the environment.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply `OPERATOR_*` overrides from the process environment.
    #[must_use]
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Unparsable values are logged and ignored.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        override_parsed(&lookup, "OPERATOR_RESYNC_INTERVAL", &mut self.resync_interval);
        override_parsed(&lookup, "OPERATOR_CONFLICT_RETRIES", &mut self.conflict_retries);
        override_parsed(&lookup, "OPERATOR_DRY_RUN_DELAY", &mut self.dry_run_delay);
        override_parsed(&lookup, "OPERATOR_RUN_TIMEOUT", &mut self.run_timeout);
        override_parsed(&lookup, "OPERATOR_FAIL_DELAY", &mut self.commands.fail_delay);
        override_parsed(&lookup, "OPERATOR_COMMAND_TIMEOUT", &mut self.commands.command_timeout);
        if let Some(filter) = lookup("OPERATOR_LOG_FILTER") {
            self.log_filter = filter;
        }
        if let Some(path) = lookup("OPERATOR_KUBEADM_PATH") {
            self.commands.kubeadm_path = path;
        }
        if let Some(path) = lookup("OPERATOR_KUBECTL_PATH") {
            self.commands.kubectl_path = path;
        }
        self
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            loops: LoopConfig {
                resync_interval: Duration::from_secs(self.resync_interval.max(1)),
                conflict_retries: self.conflict_retries,
            },
            dry_run_delay: Duration::from_millis(self.dry_run_delay),
        }
    }

    pub const fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout)
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse() {
        Ok(value) => *target = value,
        Err(_) => warn!(key, value = %raw, "Ignoring unparsable override"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_defaults() {
        let config = OperatorConfig::default();
        assert_eq!(config.resync_interval, 10);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.commands.kubeadm_path, "kubeadm");
        assert_eq!(config.manager_config().dry_run_delay, Duration::from_secs(3));
    }

    #[test]
    fn test_from_toml_file_keeps_defaults_for_missing_fields() -> TestResult {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(file, "conflict_retries = 7\n\n[commands]\nkubectl_path = \"/usr/bin/kubectl\"")?;

        let config = OperatorConfig::from_file(file.path())?;

        assert_eq!(config.conflict_retries, 7);
        assert_eq!(config.resync_interval, 10);
        assert_eq!(config.commands.kubectl_path, "/usr/bin/kubectl");
        assert_eq!(config.commands.kubeadm_path, "kubeadm");
        Ok(())
    }

    #[test]
    fn test_from_json_file() -> TestResult {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile()?;
        writeln!(file, r#"{{"dry_run_delay": 5, "log_filter": "debug"}}"#)?;

        let config = OperatorConfig::from_file(file.path())?;

        assert_eq!(config.dry_run_delay, 5);
        assert_eq!(config.log_filter, "debug");
        Ok(())
    }

    #[test]
    fn test_bad_file_is_an_error() -> TestResult {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(file, "resync_interval = \"soon\"")?;
        assert!(OperatorConfig::from_file(file.path()).is_err());
        Ok(())
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPERATOR_RUN_TIMEOUT", "60"),
            ("OPERATOR_KUBEADM_PATH", "/opt/kubeadm"),
            ("OPERATOR_CONFLICT_RETRIES", "many"),
        ]
        .into_iter()
        .collect();

        let config = OperatorConfig::default()
            .with_overrides(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.run_timeout(), Duration::from_secs(60));
        assert_eq!(config.commands.kubeadm_path, "/opt/kubeadm");
        assert_eq!(config.conflict_retries, 3);
    }
}
