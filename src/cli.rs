//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// kubeadm operator
#[derive(Parser, Debug)]
#[command(name = "kubeadm-operator")]
#[command(version)]
#[command(about = "Runs kubeadm operations as ordered, pausable, recoverable per-node tasks")]
pub struct Cli {
    /// Configuration file (TOML, or JSON by extension)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Tracing filter, used when RUST_LOG is unset
    #[arg(long, global = true)]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the task groups planned for the operation in a manifest
    Plan {
        /// Manifest holding `nodes` and `operation` (YAML, JSON or TOML)
        #[arg(short, long)]
        manifest: PathBuf,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml)]
        output: OutputFormat,
    },

    /// Run the operation in a manifest against an in-memory cluster
    Run {
        /// Manifest holding `nodes` and `operation` (YAML, JSON or TOML)
        #[arg(short, long)]
        manifest: PathBuf,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml)]
        output: OutputFormat,

        /// Override the configured run timeout, in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_globals() -> Result<(), clap::Error> {
        let cli = Cli::try_parse_from([
            "kubeadm-operator",
            "run",
            "--manifest",
            "op.yaml",
            "--log-filter",
            "debug",
            "--timeout",
            "30",
        ])?;

        assert_eq!(cli.log_filter.as_deref(), Some("debug"));
        assert!(matches!(
            cli.command,
            Commands::Run { timeout: Some(30), output: OutputFormat::Yaml, .. }
        ));
        Ok(())
    }

    #[test]
    fn test_plan_requires_manifest() {
        assert!(Cli::try_parse_from(["kubeadm-operator", "plan"]).is_err());
    }
}
