//! Dispatcher configuration.

use serde::{Deserialize, Serialize};

/// How commands map onto the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Path to the kubeadm binary.
    pub kubeadm_path: String,
    /// Path to the kubectl binary.
    pub kubectl_path: String,
    /// Milliseconds the `fail` command waits before failing.
    pub fail_delay: u64,
    /// Seconds a host process may run before it is killed.
    pub command_timeout: u64,
    /// Argv replacing the kubeadm binary. Unset means the command is a no-op.
    pub upgrade_kubeadm: Option<Vec<String>>,
    /// Argv replacing the kubelet and kubectl binaries. Unset means no-op.
    pub upgrade_kubelet_and_kubectl: Option<Vec<String>>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            kubeadm_path: "kubeadm".to_string(),
            kubectl_path: "kubectl".to_string(),
            fail_delay: 0,
            command_timeout: 600,
            upgrade_kubeadm: None,
            upgrade_kubelet_and_kubectl: None,
        }
    }
}
