pub mod config;
pub mod core;
pub mod desktop;
pub mod domain;
pub mod imap;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use config::manifest::DependencyManifest;
pub use config::DaemonConfig;
pub use core::Daemon;
pub use imap::ImapClient;
pub use utils::error::{DaemonError, Result};
