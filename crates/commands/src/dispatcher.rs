//! Command dispatcher trait and the host implementation.

use std::time::Duration;

use async_trait::async_trait;
use operator_api::CommandDescriptor;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::CommandConfig;
use crate::error::{CommandError, Result};

/// Runs one command on behalf of a runtime task.
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    /// Execute `command` for the task bound to `node`.
    async fn dispatch(&self, command: &CommandDescriptor, node: &str) -> Result<()>;
}

/// What dispatching a command amounts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Succeed immediately.
    Succeed,
    /// Fail after a delay.
    Fail(Duration),
    /// Sleep, then succeed.
    Sleep(Duration),
    /// Run a host process.
    Process { program: String, args: Vec<String> },
    /// Nothing configured for this command; logged and treated as success.
    Skipped,
}

impl Invocation {
    fn process<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Process {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn from_argv(argv: Option<&Vec<String>>) -> Self {
        match argv.and_then(|a| a.split_first()) {
            Some((program, args)) => Self::process(program, args.iter().cloned()),
            None => Self::Skipped,
        }
    }
}

/// Dispatches commands on the local host.
///
/// `pass`, `fail` and `wait` run in-process; kubeadm and kubectl commands run
/// the configured binaries.
#[derive(Debug, Clone, Default)]
pub struct HostCommandDispatcher {
    config: CommandConfig,
}

impl HostCommandDispatcher {
    pub const fn new(config: CommandConfig) -> Self {
        Self { config }
    }

    /// Decide how a command runs on `node`.
    pub fn plan(&self, command: &CommandDescriptor, node: &str) -> Invocation {
        let kubeadm = self.config.kubeadm_path.as_str();
        let kubectl = self.config.kubectl_path.as_str();
        match command {
            CommandDescriptor::Pass => Invocation::Succeed,
            CommandDescriptor::Fail => {
                Invocation::Fail(Duration::from_millis(self.config.fail_delay))
            }
            CommandDescriptor::Wait { seconds } => {
                Invocation::Sleep(Duration::from_secs(u64::from(*seconds)))
            }
            CommandDescriptor::Preflight => Invocation::process(kubeadm, ["version"]),
            CommandDescriptor::KubeadmRenewCertificates => {
                Invocation::process(kubeadm, ["certs", "renew", "all"])
            }
            CommandDescriptor::KubeadmUpgradeApply { kubernetes_version } => Invocation::process(
                kubeadm,
                ["upgrade", "apply", kubernetes_version.as_str(), "--yes"],
            ),
            CommandDescriptor::KubeadmUpgradeNode => {
                Invocation::process(kubeadm, ["upgrade", "node"])
            }
            CommandDescriptor::UpgradeKubeadm => {
                Invocation::from_argv(self.config.upgrade_kubeadm.as_ref())
            }
            CommandDescriptor::UpgradeKubeletAndKubectl => {
                Invocation::from_argv(self.config.upgrade_kubelet_and_kubectl.as_ref())
            }
            CommandDescriptor::KubectlDrain => Invocation::process(
                kubectl,
                ["drain", node, "--ignore-daemonsets", "--delete-emptydir-data"],
            ),
            CommandDescriptor::KubectlUncordon => Invocation::process(kubectl, ["uncordon", node]),
        }
    }

    async fn run_process(&self, program: &str, args: &[String]) -> Result<()> {
        info!(program, args = ?args, "Running command");
        let seconds = self.config.command_timeout;
        let output = tokio::time::timeout(
            Duration::from_secs(seconds),
            Command::new(program).args(args).kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| CommandError::TimedOut {
            program: program.to_string(),
            seconds,
        })?
        .map_err(|e| CommandError::spawn_failed(program, e.to_string()))?;

        if output.status.success() {
            debug!(program, "Command succeeded");
            Ok(())
        } else {
            Err(CommandError::ExecutionFailed {
                program: program.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl CommandDispatcher for HostCommandDispatcher {
    async fn dispatch(&self, command: &CommandDescriptor, node: &str) -> Result<()> {
        match self.plan(command, node) {
            Invocation::Succeed => Ok(()),
            Invocation::Fail(delay) => {
                tokio::time::sleep(delay).await;
                Err(CommandError::failed(command.kind(), "fail command"))
            }
            Invocation::Sleep(duration) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
            Invocation::Process { program, args } => self.run_process(&program, &args).await,
            Invocation::Skipped => {
                warn!(command = %command, node, "No host command configured, skipping");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builtin_commands() {
        let dispatcher = HostCommandDispatcher::default();

        assert_eq!(dispatcher.dispatch(&CommandDescriptor::Pass, "n1").await, Ok(()));
        assert_eq!(
            dispatcher
                .dispatch(&CommandDescriptor::Wait { seconds: 0 }, "n1")
                .await,
            Ok(())
        );
        assert!(matches!(
            dispatcher.dispatch(&CommandDescriptor::Fail, "n1").await,
            Err(CommandError::Failed { .. })
        ));
    }

    #[test]
    fn test_kubectl_commands_target_the_node() {
        let dispatcher = HostCommandDispatcher::default();

        let drain = dispatcher.plan(&CommandDescriptor::KubectlDrain, "worker-2");
        let Invocation::Process { program, args } = drain else {
            assert!(matches!(drain, Invocation::Process { .. }));
            return;
        };
        assert_eq!(program, "kubectl");
        assert_eq!(args.first().map(String::as_str), Some("drain"));
        assert!(args.contains(&"worker-2".to_string()));
    }

    #[test]
    fn test_upgrade_apply_carries_the_version() {
        let dispatcher = HostCommandDispatcher::new(CommandConfig {
            kubeadm_path: "/usr/bin/kubeadm".to_string(),
            ..CommandConfig::default()
        });
        let apply = dispatcher.plan(
            &CommandDescriptor::KubeadmUpgradeApply {
                kubernetes_version: "v1.30.2".to_string(),
            },
            "cp-1",
        );
        assert_eq!(
            apply,
            Invocation::Process {
                program: "/usr/bin/kubeadm".to_string(),
                args: ["upgrade", "apply", "v1.30.2", "--yes"]
                    .map(String::from)
                    .to_vec(),
            }
        );
    }

    #[test]
    fn test_package_upgrades_use_configured_argv() {
        let unconfigured = HostCommandDispatcher::default();
        assert_eq!(
            unconfigured.plan(&CommandDescriptor::UpgradeKubeadm, "n1"),
            Invocation::Skipped
        );

        let configured = HostCommandDispatcher::new(CommandConfig {
            upgrade_kubeadm: Some(vec!["apt-get".to_string(), "install".to_string()]),
            ..CommandConfig::default()
        });
        assert_eq!(
            configured.plan(&CommandDescriptor::UpgradeKubeadm, "n1"),
            Invocation::Process {
                program: "apt-get".to_string(),
                args: vec!["install".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_spawn_failure() {
        let dispatcher = HostCommandDispatcher::new(CommandConfig {
            kubeadm_path: "/nonexistent/kubeadm-binary".to_string(),
            ..CommandConfig::default()
        });
        let result = dispatcher
            .dispatch(&CommandDescriptor::KubeadmUpgradeNode, "n1")
            .await;
        assert!(matches!(result, Err(CommandError::SpawnFailed { .. })));
    }
}
