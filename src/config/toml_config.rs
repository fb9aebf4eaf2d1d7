use crate::utils::error::{DaemonError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub imap: ImapConfig,
    pub watch: WatchConfig,
    #[serde(default)]
    pub clipboard: ClipboardConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub daemon: SupervisorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// imaps：連線後立即進行 TLS 握手
    Tls,
    Plain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImapConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default = "default_security")]
    pub security: Security,
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_io_timeout")]
    pub io_timeout_secs: u64,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    pub ca_cert_path: Option<PathBuf>,
    /// 單一 `{n}` literal 的上限，超過視為協定錯誤
    #[serde(default = "default_max_literal_bytes")]
    pub max_literal_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub sender: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_recent_window")]
    pub recent_window_secs: u64,
    #[serde(default = "default_token_pattern")]
    pub token_pattern: String,
    /// 0 表示抓取整封郵件 (`BODY[]`)
    #[serde(default = "default_body_part")]
    pub body_part: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ClipboardBackend {
    #[default]
    Auto,
    WlClipboard,
    Xclip,
    Xsel,
    Pasteboard,
    Windows,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipboardConfig {
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_hold")]
    pub hold_secs: u64,
    #[serde(default)]
    pub backend: ClipboardBackend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NotifyBackend {
    #[default]
    Auto,
    NotifySend,
    Osascript,
    Windows,
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub backend: NotifyBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// 執行指定輪詢次數後結束 (至少 1)；None 表示持續運行
    pub max_cycles: Option<u64>,
    #[serde(default = "default_true")]
    pub delete_processed: bool,
    pub probe_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub json: bool,
}

fn default_port() -> u16 {
    993
}

fn default_security() -> Security {
    Security::Tls
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_io_timeout() -> u64 {
    36
}

fn default_max_literal_bytes() -> u64 {
    8 * 1024 * 1024
}

fn default_poll_interval() -> u64 {
    5000
}

fn default_recent_window() -> u64 {
    300
}

fn default_token_pattern() -> String {
    r"<p><b>(\d{6})</b></p>".to_string()
}

fn default_body_part() -> u32 {
    1
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    2
}

fn default_hold() -> u64 {
    10
}

fn default_reconnect_delay() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay(),
            hold_secs: default_hold(),
            backend: ClipboardBackend::default(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: NotifyBackend::default(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay(),
            max_cycles: None,
            delete_processed: true,
            probe_url: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            json: false,
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// 將 `${VAR}` 替換為環境變數值；未設定的變數保持原樣
pub(crate) fn substitute_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([^}]+)\}")?;

    let result = re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
    });

    Ok(result.into_owned())
}

impl DaemonConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| DaemonError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("imap.host", &self.imap.host)?;
        validation::validate_range("imap.port", self.imap.port, 1, u16::MAX)?;
        validation::validate_non_empty_string("imap.username", &self.imap.username)?;
        validation::validate_non_empty_string("imap.mailbox", &self.imap.mailbox)?;
        validation::validate_positive_number(
            "imap.connect_timeout_secs",
            self.imap.connect_timeout_secs,
            1,
        )?;
        validation::validate_positive_number("imap.io_timeout_secs", self.imap.io_timeout_secs, 1)?;
        validation::validate_positive_number("imap.max_literal_bytes", self.imap.max_literal_bytes, 1)?;
        if let Some(path) = &self.imap.ca_cert_path {
            validation::validate_path("imap.ca_cert_path", &path.to_string_lossy())?;
        }

        validation::validate_email_address("watch.sender", &self.watch.sender)?;
        validation::validate_positive_number("watch.poll_interval_ms", self.watch.poll_interval_ms, 100)?;
        validation::validate_positive_number("watch.recent_window_secs", self.watch.recent_window_secs, 1)?;
        self.token_regex()?;

        validation::validate_positive_number(
            "clipboard.retry_attempts",
            u64::from(self.clipboard.retry_attempts),
            1,
        )?;

        if let Some(max_cycles) = self.daemon.max_cycles {
            validation::validate_positive_number("daemon.max_cycles", max_cycles, 1)?;
        }

        if let Some(url) = &self.daemon.probe_url {
            validation::validate_url("daemon.probe_url", url)?;
        }

        validation::validate_one_of("logging.level", &self.logging.level, &LOG_LEVELS)?;
        if let Some(path) = &self.logging.file {
            validation::validate_path("logging.file", &path.to_string_lossy())?;
        }

        Ok(())
    }

    /// 編譯 token 的正規表達式，至少需要一個擷取群組
    pub fn token_regex(&self) -> Result<Regex> {
        let re = Regex::new(&self.watch.token_pattern)?;
        if re.captures_len() < 2 {
            return Err(DaemonError::InvalidConfigValueError {
                field: "watch.token_pattern".to_string(),
                value: self.watch.token_pattern.clone(),
                reason: "Pattern needs a capture group around the token".to_string(),
            });
        }
        Ok(re)
    }

    pub fn body_part(&self) -> Option<u32> {
        match self.watch.body_part {
            0 => None,
            part => Some(part),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.watch.poll_interval_ms)
    }

    pub fn recent_window(&self) -> Duration {
        Duration::from_secs(self.watch.recent_window_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.daemon.reconnect_delay_ms)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.imap.host, self.imap.port)
    }

    pub fn imap_url(&self) -> String {
        let scheme = match self.imap.security {
            Security::Tls => "imaps",
            Security::Plain => "imap",
        };
        format!("{}://{}:{}", scheme, self.imap.host, self.imap.port)
    }

    /// 密碼遮罩後的顯示字串
    pub fn masked_password(&self) -> String {
        if self.imap.password.is_empty() {
            "(empty)".to_string()
        } else {
            "*".repeat(8)
        }
    }
}

impl Validate for DaemonConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
