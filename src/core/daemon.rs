use crate::config::DaemonConfig;
use crate::core::token::{body_payload, extract_token, is_recent, parse_internaldate};
use crate::desktop::swap_clipboard;
use crate::domain::model::{CycleReport, Delivery, MailToken};
use crate::domain::ports::{Clipboard, MailboxClient, Notifier};
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use chrono::Utc;
use regex::Regex;
use std::time::Duration;
use tokio::sync::watch;

/// 輪詢信箱、把 token 放進剪貼簿的守護程序
pub struct Daemon<C: MailboxClient> {
    config: DaemonConfig,
    client: C,
    clipboard: Box<dyn Clipboard>,
    notifier: Box<dyn Notifier>,
    token_pattern: Regex,
    monitor: SystemMonitor,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<C: MailboxClient> Daemon<C> {
    pub fn new(
        config: DaemonConfig,
        client: C,
        clipboard: Box<dyn Clipboard>,
        notifier: Box<dyn Notifier>,
    ) -> Result<Self> {
        let token_pattern = config.token_regex()?;
        Ok(Self {
            config,
            client,
            clipboard,
            notifier,
            token_pattern,
            monitor: SystemMonitor::new(false),
            shutdown: None,
        })
    }

    pub fn with_monitor(mut self, monitor: SystemMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    /// 收到 `true` 時在下一個等待點停止
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn into_client(self) -> C {
        self.client
    }

    /// 連線、登入並選擇信箱
    pub async fn init_session(&mut self) -> Result<()> {
        self.client.connect().await?;
        self.client.login().await?;
        self.client.select(&self.config.imap.mailbox).await?;
        tracing::info!("📂 Selected {}", self.config.imap.mailbox);
        Ok(())
    }

    /// 單次輪詢：從最新的郵件往回找第一個有效 token
    pub async fn poll_once(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        tracing::debug!("Checking for new emails...");

        let uids = self.client.search_from(&self.config.watch.sender).await?;
        report.found = uids.len();
        if uids.is_empty() {
            tracing::debug!("No new emails found");
        } else {
            tracing::debug!("Found {} email(s) from {}", uids.len(), self.config.watch.sender);
        }

        let window = self.config.recent_window();
        let part = self.config.body_part();

        for uid in uids.iter().rev() {
            tracing::debug!("Checking timestamp for UID {}", uid);
            let date_response = self.client.fetch_internaldate(uid).await?;
            let received = match parse_internaldate(&date_response.text()) {
                Some(received) => received,
                None => {
                    tracing::error!("Failed to find timestamp for UID {}", uid);
                    continue;
                }
            };
            if !is_recent(received, Utc::now(), window) {
                tracing::info!("Email {} is not recent (received {})", uid, received);
                continue;
            }
            report.recent += 1;

            let body = self.client.fetch_body(uid, part).await?;
            let payload = body_payload(&body);
            let code = match extract_token(&payload, &self.token_pattern) {
                Some(code) => code,
                None => {
                    tracing::error!("No token found in email {}", uid);
                    continue;
                }
            };
            tracing::info!("🔑 Token found in email {}", uid);
            tracing::debug!("Token: {}", code);

            let delivery = self.deliver(&code).await;
            report.token = Some(MailToken {
                uid: uid.clone(),
                code,
            });
            report.delivery = Some(delivery);
            break;
        }

        if !uids.is_empty() && self.config.daemon.delete_processed {
            if self.client.delete_uids(&uids).await?.is_some() {
                report.deleted = uids.len();
            }
        }

        Ok(report)
    }

    async fn deliver(&mut self, code: &str) -> Delivery {
        let attempts = self.config.clipboard.retry_attempts.max(1);
        let retry_delay = Duration::from_millis(self.config.clipboard.retry_delay_ms);

        let mut swapped = None;
        for attempt in 1..=attempts {
            match swap_clipboard(self.clipboard.as_ref(), code).await {
                Ok(previous) => {
                    swapped = Some(previous);
                    break;
                }
                Err(e) => {
                    tracing::warn!("Clipboard attempt {}/{} failed: {}", attempt, attempts, e);
                    if attempt < attempts {
                        tokio::time::sleep(retry_delay).await;
                    }
                }
            }
        }

        let previous = match swapped {
            Some(previous) => previous,
            None => {
                tracing::error!("❌ Failed to copy token to clipboard");
                self.send_notification(&format!(
                    "Unable to copy token to clipboard! Token: {}",
                    code
                ))
                .await;
                return Delivery::NotifiedOnly;
            }
        };

        tracing::info!("📋 Token copied to clipboard");
        self.send_notification("Token copied!").await;

        let hold = Duration::from_secs(self.config.clipboard.hold_secs);
        self.pause(hold).await;

        if let Some(previous) = previous {
            match self.clipboard.write(&previous).await {
                Ok(()) => tracing::info!("Clipboard restored"),
                Err(e) => tracing::warn!("Failed to restore clipboard: {}", e),
            }
        }
        Delivery::Copied
    }

    async fn send_notification(&self, message: &str) {
        if let Err(e) = self.notifier.notify(message).await {
            tracing::warn!("Notification failed: {}", e);
        }
    }

    /// 持續運行直到收到停止訊號或達到 `max_cycles`，回傳完成的輪詢次數
    pub async fn run(&mut self) -> Result<u64> {
        tracing::info!("🚀 Starting daemon for {}", self.config.imap_url());
        let max_cycles = self.config.daemon.max_cycles;
        let reconnect_delay = self.config.reconnect_delay();
        let poll_interval = self.config.poll_interval();
        let mut cycles = 0u64;

        'supervisor: loop {
            loop {
                if self.is_shutdown() {
                    break 'supervisor;
                }
                match self.init_session().await {
                    Ok(()) => break,
                    Err(e) => {
                        tracing::error!("Initialization failed: {}", e);
                        self.client.disconnect().await;
                        if self.pause(reconnect_delay).await {
                            break 'supervisor;
                        }
                    }
                }
            }
            tracing::info!("✅ IMAP session initialized");

            loop {
                let outcome = self.poll_once().await;
                cycles += 1;
                self.monitor.log_cycle(cycles);
                let finished = max_cycles.is_some_and(|max| cycles >= max);

                match outcome {
                    Ok(report) => {
                        tracing::debug!(
                            "Cycle {}: {} found, {} recent, {} deleted",
                            cycles,
                            report.found,
                            report.recent,
                            report.deleted
                        );
                        if finished {
                            break 'supervisor;
                        }
                        tracing::debug!(
                            "Waiting {} ms before checking again",
                            poll_interval.as_millis()
                        );
                        if self.pause(poll_interval).await {
                            break 'supervisor;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Error: {}", e);
                        self.client.disconnect().await;
                        if finished {
                            self.monitor.log_final_stats();
                            return Err(e);
                        }
                        if self.pause(reconnect_delay).await {
                            break 'supervisor;
                        }
                        continue 'supervisor;
                    }
                }
            }
        }

        self.client.disconnect().await;
        self.monitor.log_final_stats();
        tracing::info!("👋 Daemon stopped after {} cycle(s)", cycles);
        Ok(cycles)
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }

    /// 等待指定時間；期間收到停止訊號時回傳 true
    async fn pause(&mut self, duration: Duration) -> bool {
        let Some(rx) = self.shutdown.as_mut() else {
            tokio::time::sleep(duration).await;
            return false;
        };
        if *rx.borrow() {
            return true;
        }

        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                changed = rx.changed() => match changed {
                    Ok(()) if *rx.borrow() => return true,
                    Ok(()) => continue,
                    Err(_) => {
                        // 發送端已關閉，不會再有停止訊號
                        sleep.await;
                        return false;
                    }
                },
            }
        }
    }
}
