use clap::Parser;
use email_daemon::core::probe;
use email_daemon::desktop::{build_clipboard, build_notifier};
use email_daemon::utils::logger::{self, LogSettings};
use email_daemon::utils::monitor::SystemMonitor;
use email_daemon::utils::validation::{self, Validate};
use email_daemon::{CliConfig, Daemon, DaemonConfig, DaemonError, ImapClient};
use std::time::Duration;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliConfig::parse();

    // 載入 TOML 配置
    let mut config = match DaemonConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            logger::init_cli_logger(args.verbose);
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 初始化日誌
    let settings = LogSettings {
        verbose: args.verbose,
        level: Some(config.logging.level.clone()),
        file: config.logging.file.clone(),
        json: config.logging.json,
    };
    if let Err(e) = logger::init_daemon_logger(&settings) {
        logger::init_cli_logger(args.verbose);
        tracing::warn!("⚠️ Falling back to console logging: {}", e);
    }

    tracing::info!("🚀 Starting email-daemon");
    tracing::info!("📁 Loaded configuration from: {}", args.config);

    if args.once {
        config.daemon.max_cycles = Some(1);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");
    display_config_summary(&config, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - nothing will be connected");
        return Ok(());
    }

    if args.check {
        let url = match validation::validate_required_field("daemon.probe_url", &config.daemon.probe_url) {
            Ok(url) => url.as_str(),
            Err(e) => exit_with(&e),
        };
        let timeout = Duration::from_secs(config.imap.connect_timeout_secs);
        match probe(url, timeout).await {
            Ok(status) => println!("✅ {} is reachable (HTTP {})", url, status),
            Err(e) => exit_with(&e),
        }
        return Ok(());
    }

    if args.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("🛑 Shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    let client = ImapClient::new(config.imap.clone());
    let clipboard = build_clipboard(&config.clipboard);
    let notifier = build_notifier(&config.notify);

    let mut daemon = match Daemon::new(config, client, clipboard, notifier) {
        Ok(daemon) => daemon
            .with_monitor(SystemMonitor::new(args.monitor))
            .with_shutdown(shutdown_rx),
        Err(e) => exit_with(&e),
    };

    match daemon.run().await {
        Ok(cycles) => {
            tracing::info!("✅ Completed {} poll cycle(s)", cycles);
        }
        Err(e) => exit_with(&e),
    }

    Ok(())
}

fn exit_with(e: &DaemonError) -> ! {
    // 記錄詳細錯誤信息
    tracing::error!(
        "❌ email-daemon failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    std::process::exit(e.exit_code())
}

fn display_config_summary(config: &DaemonConfig, args: &CliConfig) {
    println!("📋 Configuration Summary:");
    println!("  Server: {}", config.imap_url());
    println!("  Username: {}", config.imap.username);
    println!("  Password: {}", config.masked_password());
    println!("  Mailbox: {}", config.imap.mailbox);
    println!("  Sender: {}", config.watch.sender);
    println!("  Poll Interval: {} ms", config.watch.poll_interval_ms);
    println!("  Recent Window: {} s", config.watch.recent_window_secs);
    match config.body_part() {
        Some(part) => println!("  Body Part: BODY[{}]", part),
        None => println!("  Body Part: BODY[]"),
    }
    println!(
        "  Clipboard: {:?} ({} attempts, hold {} s)",
        config.clipboard.backend, config.clipboard.retry_attempts, config.clipboard.hold_secs
    );
    println!("  Delete Processed: {}", config.daemon.delete_processed);

    if let Some(max_cycles) = config.daemon.max_cycles {
        println!("  Max Cycles: {}", max_cycles);
    }

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}
