//! Command descriptors: the atomic units of work inside a runtime task.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One dispatchable command.
///
/// Serialized externally tagged, e.g. `pass` or `wait: { seconds: 3 }`, so a
/// descriptor can never name two command kinds at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CommandDescriptor {
    /// Check the kubeadm binary on the node.
    Preflight,
    /// `kubeadm certs renew`.
    KubeadmRenewCertificates,
    /// `kubeadm upgrade apply` on the first control plane.
    KubeadmUpgradeApply {
        #[serde(default)]
        kubernetes_version: String,
    },
    /// `kubeadm upgrade node` on every other node.
    KubeadmUpgradeNode,
    /// Replace the kubeadm binary.
    UpgradeKubeadm,
    /// Replace the kubelet and kubectl binaries.
    UpgradeKubeletAndKubectl,
    /// `kubectl drain` the node.
    KubectlDrain,
    /// `kubectl uncordon` the node.
    KubectlUncordon,
    /// Always succeeds.
    Pass,
    /// Always fails.
    Fail,
    /// Sleeps, then succeeds.
    Wait {
        #[serde(default)]
        seconds: u32,
    },
}

impl CommandDescriptor {
    /// Short kind name, used in logs and events.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Preflight => "preflight",
            Self::KubeadmRenewCertificates => "kubeadmRenewCertificates",
            Self::KubeadmUpgradeApply { .. } => "kubeadmUpgradeApply",
            Self::KubeadmUpgradeNode => "kubeadmUpgradeNode",
            Self::UpgradeKubeadm => "upgradeKubeadm",
            Self::UpgradeKubeletAndKubectl => "upgradeKubeletAndKubectl",
            Self::KubectlDrain => "kubectlDrain",
            Self::KubectlUncordon => "kubectlUncordon",
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Wait { .. } => "wait",
        }
    }
}

impl fmt::Display for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_command_list() -> Result<(), serde_yaml::Error> {
        let yaml = "- pass\n- wait:\n    seconds: 2\n- kubeadmUpgradeApply:\n    kubernetesVersion: v1.30.1\n- fail\n";
        let commands: Vec<CommandDescriptor> = serde_yaml::with::singleton_map_recursive::deserialize(
            serde_yaml::Deserializer::from_str(yaml),
        )?;

        assert_eq!(
            commands,
            vec![
                CommandDescriptor::Pass,
                CommandDescriptor::Wait { seconds: 2 },
                CommandDescriptor::KubeadmUpgradeApply {
                    kubernetes_version: "v1.30.1".to_string()
                },
                CommandDescriptor::Fail,
            ]
        );
        Ok(())
    }

    #[test]
    fn test_two_kinds_in_one_descriptor_are_rejected() {
        let json = r#"{"pass": null, "fail": null}"#;
        let parsed: Result<CommandDescriptor, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(CommandDescriptor::Wait { seconds: 1 }.kind(), "wait");
        assert_eq!(CommandDescriptor::KubectlDrain.to_string(), "kubectlDrain");
    }
}
