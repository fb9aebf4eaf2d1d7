use crate::config::toml_config::{ClipboardBackend, ClipboardConfig};
use crate::domain::ports::Clipboard;
use crate::utils::error::{DaemonError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
struct CommandSpec {
    program: &'static str,
    args: &'static [&'static str],
}

impl CommandSpec {
    const fn new(program: &'static str, args: &'static [&'static str]) -> Self {
        Self { program, args }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(self.program);
        cmd.args(self.args);
        cmd
    }
}

/// 透過系統剪貼簿工具 (wl-clipboard、xclip、xsel、pbcopy、clip) 讀寫文字
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    backend: ClipboardBackend,
    read_cmd: CommandSpec,
    write_cmd: CommandSpec,
}

impl CommandClipboard {
    pub fn for_backend(backend: ClipboardBackend) -> Option<Self> {
        let (read_cmd, write_cmd) = match backend {
            ClipboardBackend::Auto => return None,
            ClipboardBackend::WlClipboard => (
                CommandSpec::new("wl-paste", &["--no-newline"]),
                CommandSpec::new("wl-copy", &[]),
            ),
            ClipboardBackend::Xclip => (
                CommandSpec::new("xclip", &["-selection", "clipboard", "-o"]),
                CommandSpec::new("xclip", &["-selection", "clipboard"]),
            ),
            ClipboardBackend::Xsel => (
                CommandSpec::new("xsel", &["--clipboard", "--output"]),
                CommandSpec::new("xsel", &["--clipboard", "--input"]),
            ),
            ClipboardBackend::Pasteboard => (
                CommandSpec::new("pbpaste", &[]),
                CommandSpec::new("pbcopy", &[]),
            ),
            ClipboardBackend::Windows => (
                CommandSpec::new("powershell", &["-NoProfile", "-Command", "Get-Clipboard"]),
                CommandSpec::new("clip", &[]),
            ),
        };
        Some(Self {
            backend,
            read_cmd,
            write_cmd,
        })
    }

    /// 依序尋找第一個已安裝的剪貼簿工具
    pub fn detect() -> Option<Self> {
        let wayland = std::env::var_os("WAYLAND_DISPLAY").is_some();
        let candidates = [
            (ClipboardBackend::WlClipboard, "wl-copy", wayland),
            (ClipboardBackend::Xclip, "xclip", true),
            (ClipboardBackend::Xsel, "xsel", true),
            (ClipboardBackend::Pasteboard, "pbcopy", true),
            (ClipboardBackend::Windows, "clip", true),
        ];
        candidates
            .iter()
            .filter(|(_, _, usable)| *usable)
            .find(|(_, program, _)| which::which(program).is_ok())
            .and_then(|(backend, _, _)| Self::for_backend(*backend))
    }

    pub fn backend(&self) -> ClipboardBackend {
        self.backend
    }
}

#[async_trait]
impl Clipboard for CommandClipboard {
    async fn read(&self) -> Result<Option<String>> {
        let output = self
            .read_cmd
            .command()
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| DaemonError::ClipboardError {
                message: format!("Failed to execute {}: {}", self.read_cmd.program, e),
            })?;

        // 剪貼簿為空或內容不是文字時，多數工具以非零狀態結束
        if !output.status.success() {
            tracing::debug!(
                "{} exited with {}: {}",
                self.read_cmd.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(None);
        }

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if self.backend == ClipboardBackend::Windows && text.ends_with("\r\n") {
            text.truncate(text.len() - 2);
        }
        Ok(if text.is_empty() { None } else { Some(text) })
    }

    async fn write(&self, text: &str) -> Result<()> {
        let program = self.write_cmd.program;
        // xclip 與 wl-copy 會 fork 到背景持有內容，不能等待 stdout 關閉
        let mut child = self
            .write_cmd
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| DaemonError::ClipboardError {
                message: format!("Failed to execute {}: {}", program, e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| DaemonError::ClipboardError {
                    message: format!("Failed to write to {}: {}", program, e),
                })?;
        }

        let status = child.wait().await.map_err(|e| DaemonError::ClipboardError {
            message: format!("{} did not finish: {}", program, e),
        })?;
        if !status.success() {
            return Err(DaemonError::ClipboardError {
                message: format!("{} exited with {}", program, status),
            });
        }
        Ok(())
    }
}

/// 找不到任何剪貼簿工具時使用，所有操作都會失敗
#[derive(Debug, Default, Clone)]
pub struct UnavailableClipboard;

#[async_trait]
impl Clipboard for UnavailableClipboard {
    async fn read(&self) -> Result<Option<String>> {
        Err(DaemonError::ClipboardError {
            message: "No clipboard tool available".to_string(),
        })
    }

    async fn write(&self, _text: &str) -> Result<()> {
        Err(DaemonError::ClipboardError {
            message: "No clipboard tool available".to_string(),
        })
    }
}

pub fn build_clipboard(config: &ClipboardConfig) -> Box<dyn Clipboard> {
    let clipboard = match config.backend {
        ClipboardBackend::Auto => CommandClipboard::detect(),
        backend => CommandClipboard::for_backend(backend),
    };
    match clipboard {
        Some(clipboard) => {
            tracing::debug!("Using clipboard backend {:?}", clipboard.backend());
            Box::new(clipboard)
        }
        None => {
            tracing::warn!("⚠️ No clipboard tool found, tokens will only be shown in notifications");
            Box::new(UnavailableClipboard)
        }
    }
}

/// 讀出原本的剪貼簿內容後寫入新文字，回傳原本的內容
pub async fn swap_clipboard(clipboard: &dyn Clipboard, text: &str) -> Result<Option<String>> {
    let previous = clipboard.read().await?;
    clipboard.write(text).await?;
    Ok(previous)
}
