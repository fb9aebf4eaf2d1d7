use crate::utils::error::{DaemonError, Result};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 日誌設定，由 CLI 參數與 `[logging]` 區段合併而來
#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    pub verbose: bool,
    pub level: Option<String>,
    pub file: Option<PathBuf>,
    pub json: bool,
}

impl LogSettings {
    fn directive(&self) -> String {
        if self.verbose {
            return "email_daemon=debug,info".to_string();
        }
        match self.level.as_deref() {
            Some(level) => format!("email_daemon={}", level),
            None => "email_daemon=info".to_string(),
        }
    }
}

pub fn init_cli_logger(verbose: bool) {
    let settings = LogSettings {
        verbose,
        ..LogSettings::default()
    };
    // 只有在已經安裝過 subscriber 時才會失敗，可以忽略
    let _ = init_daemon_logger(&settings);
}

pub fn init_daemon_logger(settings: &LogSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.directive()));

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if settings.json {
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .json()
                .boxed(),
        );
    } else {
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .boxed(),
        );
    }

    if let Some(path) = &settings.file {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file))
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| DaemonError::ConfigError {
            message: format!("Failed to install logger: {}", e),
        })
}
