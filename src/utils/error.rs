use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP probe failed: {0}")]
    ProbeError(#[from] reqwest::Error),

    #[error("Invalid pattern: {0}")]
    PatternError(#[from] regex::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Connection error: {message}")]
    ConnectionError { message: String },

    #[error("TLS error: {message}")]
    TlsError { message: String },

    #[error("IMAP protocol error: {message}")]
    ProtocolError { message: String },

    #[error("IMAP server rejected '{command}': {message}")]
    ServerError { command: String, message: String },

    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("Clipboard error: {message}")]
    ClipboardError { message: String },

    #[error("Notification error: {message}")]
    NotifyError { message: String },

    #[error("Staging error: {message}")]
    StagingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Protocol,
    Desktop,
    FileSystem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl DaemonError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    pub fn tls(message: impl Into<String>) -> Self {
        Self::TlsError {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolError {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. }
            | Self::PatternError(_) => ErrorCategory::Configuration,
            Self::ConnectionError { .. }
            | Self::TlsError { .. }
            | Self::Timeout { .. }
            | Self::ProbeError(_) => ErrorCategory::Network,
            Self::ProtocolError { .. } | Self::ServerError { .. } => ErrorCategory::Protocol,
            Self::ClipboardError { .. } | Self::NotifyError { .. } => ErrorCategory::Desktop,
            Self::IoError(_) | Self::StagingError { .. } => ErrorCategory::FileSystem,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotifyError { .. } => ErrorSeverity::Low,
            Self::ConnectionError { .. }
            | Self::Timeout { .. }
            | Self::ProbeError(_)
            | Self::ClipboardError { .. } => ErrorSeverity::Medium,
            Self::ProtocolError { .. }
            | Self::ServerError { .. }
            | Self::TlsError { .. }
            | Self::StagingError { .. } => ErrorSeverity::High,
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. }
            | Self::PatternError(_)
            | Self::IoError(_) => ErrorSeverity::Critical,
        }
    }

    /// 可重試的錯誤：守護程序重新初始化連線後再試
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network | ErrorCategory::Protocol
        )
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::ConfigError { .. } | Self::ConfigValidationError { .. } => {
                "Check the TOML syntax and the section names in the configuration file".to_string()
            }
            Self::InvalidConfigValueError { field, .. } => {
                format!("Correct the value of '{}' in the configuration file", field)
            }
            Self::MissingConfigError { field } => {
                format!("Add '{}' to the configuration file", field)
            }
            Self::PatternError(_) => {
                "Fix watch.token_pattern; it must be a valid regular expression".to_string()
            }
            Self::ConnectionError { .. } | Self::Timeout { .. } => {
                "Verify imap.host / imap.port and your network connection".to_string()
            }
            Self::TlsError { .. } => {
                "Check imap.security, or provide imap.ca_cert_path for a private CA".to_string()
            }
            Self::ProtocolError { .. } => {
                "The server sent an unexpected reply; retry or run with --verbose".to_string()
            }
            Self::ServerError { .. } => {
                "Check the IMAP credentials and that the mailbox exists".to_string()
            }
            Self::ProbeError(_) => "Verify daemon.probe_url is reachable".to_string(),
            Self::ClipboardError { .. } => {
                "Install a clipboard tool (wl-clipboard, xclip, xsel) or set clipboard.backend"
                    .to_string()
            }
            Self::NotifyError { .. } => {
                "Install notify-send or set notify.backend = \"log\"".to_string()
            }
            Self::IoError(_) | Self::StagingError { .. } => {
                "Check that the paths exist and are writable".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Network => format!("Could not reach the mail server: {}", self),
            ErrorCategory::Protocol => format!("Mail server error: {}", self),
            ErrorCategory::Desktop => format!("Desktop integration failed: {}", self),
            ErrorCategory::FileSystem => format!("File system error: {}", self),
        }
    }

    /// 依嚴重程度決定的程序結束碼
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, DaemonError>;
