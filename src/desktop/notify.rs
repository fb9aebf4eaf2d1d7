use crate::config::toml_config::{NotifyBackend, NotifyConfig};
use crate::domain::ports::Notifier;
use crate::utils::error::{DaemonError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

const APP_TITLE: &str = "EmailDaemon";

/// 只寫入日誌的通知
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        tracing::info!("🔔 {}", message);
        Ok(())
    }
}

/// 透過 notify-send、osascript 或 Windows `msg` 顯示桌面通知
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    backend: NotifyBackend,
}

impl CommandNotifier {
    pub fn new(backend: NotifyBackend) -> Option<Self> {
        match backend {
            NotifyBackend::Auto | NotifyBackend::Log => None,
            backend => Some(Self { backend }),
        }
    }

    pub fn detect() -> Option<Self> {
        [
            (NotifyBackend::NotifySend, "notify-send"),
            (NotifyBackend::Osascript, "osascript"),
            (NotifyBackend::Windows, "msg"),
        ]
        .iter()
        .find(|(_, program)| which::which(program).is_ok())
        .and_then(|(backend, _)| Self::new(*backend))
    }

    fn command(&self, message: &str) -> Command {
        let mut cmd;
        match self.backend {
            NotifyBackend::Osascript => {
                cmd = Command::new("osascript");
                cmd.arg("-e").arg(format!(
                    "display notification {} with title {}",
                    applescript_string(message),
                    applescript_string(APP_TITLE)
                ));
            }
            NotifyBackend::Windows => {
                cmd = Command::new("msg");
                cmd.arg("*").arg(format!("{}: {}", APP_TITLE, message));
            }
            _ => {
                cmd = Command::new("notify-send");
                cmd.arg(APP_TITLE).arg(message);
            }
        }
        cmd
    }
}

fn applescript_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[async_trait]
impl Notifier for CommandNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        tracing::info!("🔔 {}", message);
        let output = self
            .command(message)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| DaemonError::NotifyError {
                message: format!("Failed to execute {:?} notifier: {}", self.backend, e),
            })?;
        if !output.status.success() {
            return Err(DaemonError::NotifyError {
                message: format!(
                    "{:?} notifier exited with {}: {}",
                    self.backend,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

pub fn build_notifier(config: &NotifyConfig) -> Box<dyn Notifier> {
    if !config.enabled {
        return Box::new(LogNotifier);
    }
    let notifier = match config.backend {
        NotifyBackend::Log => None,
        NotifyBackend::Auto => CommandNotifier::detect(),
        backend => CommandNotifier::new(backend),
    };
    match notifier {
        Some(notifier) => Box::new(notifier),
        None => Box::new(LogNotifier),
    }
}
