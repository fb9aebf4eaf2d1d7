pub mod manifest;
pub mod toml_config;

#[cfg(feature = "cli")]
use clap::Parser;

pub use toml_config::DaemonConfig;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "email-daemon")]
#[command(about = "Watches an IMAP mailbox and copies one-time login codes to the clipboard")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "email-daemon.toml")]
    pub config: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run a single poll cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Show the configuration summary without connecting
    #[arg(long)]
    pub dry_run: bool,

    /// Log process resource usage every poll cycle
    #[arg(long)]
    pub monitor: bool,

    /// Run the connectivity probe (daemon.probe_url) and exit
    #[arg(long)]
    pub check: bool,
}
