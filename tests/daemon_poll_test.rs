use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration as ChronoDuration, Utc};
use email_daemon::domain::model::{Delivery, ImapResponse, ResponseStatus, Uid};
use email_daemon::domain::ports::{Clipboard, MailboxClient, Notifier};
use email_daemon::{Daemon, DaemonConfig, DaemonError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

struct Message {
    internaldate: String,
    body: String,
}

#[derive(Default)]
struct MockMailbox {
    order: Vec<Uid>,
    messages: HashMap<Uid, Message>,
    calls: Vec<String>,
    deleted: Vec<Uid>,
    connects: usize,
    failing_connects: usize,
    failing_searches: usize,
}

impl MockMailbox {
    fn with_message(mut self, uid: &str, age_secs: i64, html: &str) -> Self {
        let received = Utc::now() - ChronoDuration::seconds(age_secs);
        self.order.push(uid.to_string());
        self.messages.insert(
            uid.to_string(),
            Message {
                internaldate: received.format("%d-%b-%Y %H:%M:%S %z").to_string(),
                body: STANDARD.encode(html),
            },
        );
        self
    }

    fn with_raw_date(mut self, uid: &str, internaldate: &str, html: &str) -> Self {
        self.order.push(uid.to_string());
        self.messages.insert(
            uid.to_string(),
            Message {
                internaldate: internaldate.to_string(),
                body: STANDARD.encode(html),
            },
        );
        self
    }

    fn ok(lines: Vec<String>, literals: Vec<Vec<u8>>) -> ImapResponse {
        ImapResponse {
            status: ResponseStatus::Ok,
            status_text: "completed".to_string(),
            lines,
            literals,
        }
    }
}

#[async_trait]
impl MailboxClient for MockMailbox {
    async fn connect(&mut self) -> Result<()> {
        self.connects += 1;
        self.calls.push("CONNECT".to_string());
        if self.failing_connects > 0 {
            self.failing_connects -= 1;
            return Err(DaemonError::connection("Connection refused"));
        }
        Ok(())
    }

    async fn login(&mut self) -> Result<()> {
        self.calls.push("LOGIN".to_string());
        Ok(())
    }

    async fn select(&mut self, mailbox: &str) -> Result<ImapResponse> {
        self.calls.push(format!("SELECT {}", mailbox));
        Ok(Self::ok(vec![], vec![]))
    }

    async fn search_from(&mut self, sender: &str) -> Result<Vec<Uid>> {
        self.calls.push(format!("SEARCH {}", sender));
        if self.failing_searches > 0 {
            self.failing_searches -= 1;
            return Err(DaemonError::connection("Connection closed by server"));
        }
        Ok(self.order.clone())
    }

    async fn fetch_internaldate(&mut self, uid: &str) -> Result<ImapResponse> {
        self.calls.push(format!("DATE {}", uid));
        let date = &self.messages[uid].internaldate;
        Ok(Self::ok(
            vec![format!("1 FETCH (UID {} INTERNALDATE \"{}\")", uid, date)],
            vec![],
        ))
    }

    async fn fetch_body(&mut self, uid: &str, part: Option<u32>) -> Result<ImapResponse> {
        self.calls.push(format!("BODY {} {:?}", uid, part));
        let body = self.messages[uid].body.clone();
        Ok(Self::ok(
            vec![format!("1 FETCH (UID {} BODY[1] {{{}}}", uid, body.len()), ")".to_string()],
            vec![body.into_bytes()],
        ))
    }

    async fn delete_uids(&mut self, uids: &[Uid]) -> Result<Option<ImapResponse>> {
        if uids.is_empty() {
            return Ok(None);
        }
        self.deleted.extend_from_slice(uids);
        Ok(Some(Self::ok(vec![], vec![])))
    }

    async fn disconnect(&mut self) {
        self.calls.push("DISCONNECT".to_string());
    }
}

#[derive(Clone, Default)]
struct FakeClipboard {
    content: Arc<Mutex<Option<String>>>,
    writes: Arc<Mutex<Vec<String>>>,
    reads: Arc<Mutex<usize>>,
    broken: bool,
    flaky_reads: Arc<Mutex<usize>>,
}

#[async_trait]
impl Clipboard for FakeClipboard {
    async fn read(&self) -> Result<Option<String>> {
        *self.reads.lock().unwrap() += 1;
        let mut flaky = self.flaky_reads.lock().unwrap();
        if self.broken || *flaky > 0 {
            *flaky = flaky.saturating_sub(1);
            return Err(DaemonError::ClipboardError {
                message: "clipboard busy".to_string(),
            });
        }
        drop(flaky);
        Ok(self.content.lock().unwrap().clone())
    }

    async fn write(&self, text: &str) -> Result<()> {
        self.writes.lock().unwrap().push(text.to_string());
        *self.content.lock().unwrap() = Some(text.to_string());
        Ok(())
    }
}

#[derive(Clone, Default)]
struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

fn config() -> DaemonConfig {
    DaemonConfig::from_toml_str(
        r#"
[imap]
host = "imap.example.com"
username = "watcher@example.com"
password = "secret"

[watch]
sender = "noreply@login.example.com"
poll_interval_ms = 10

[clipboard]
retry_attempts = 3
retry_delay_ms = 1
hold_secs = 0

[daemon]
reconnect_delay_ms = 10
"#,
    )
    .unwrap()
}

fn token_html(code: &str) -> String {
    format!("<html><p>Your login code</p><p><b>{}</b></p></html>", code)
}

fn daemon(
    config: DaemonConfig,
    mailbox: MockMailbox,
    clipboard: &FakeClipboard,
    notifier: &RecordingNotifier,
) -> Daemon<MockMailbox> {
    Daemon::new(
        config,
        mailbox,
        Box::new(clipboard.clone()),
        Box::new(notifier.clone()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_newest_recent_token_is_copied_and_clipboard_restored() {
    let mailbox = MockMailbox::default()
        .with_message("1", 30, &token_html("999999"))
        .with_message("2", 20, &token_html("222222"))
        .with_message("3", 10, &token_html("111111"));
    let clipboard = FakeClipboard::default();
    *clipboard.content.lock().unwrap() = Some("meeting notes".to_string());
    let notifier = RecordingNotifier::default();

    let mut daemon = daemon(config(), mailbox, &clipboard, &notifier);
    let report = daemon.poll_once().await.unwrap();

    assert_eq!(report.found, 3);
    assert_eq!(report.recent, 1);
    let token = report.token.unwrap();
    assert_eq!(token.uid, "3");
    assert_eq!(token.code, "111111");
    assert_eq!(report.delivery, Some(Delivery::Copied));
    assert_eq!(report.deleted, 3);

    assert_eq!(*clipboard.writes.lock().unwrap(), vec!["111111", "meeting notes"]);
    assert_eq!(*notifier.messages.lock().unwrap(), vec!["Token copied!"]);

    let mailbox = daemon.client();
    assert_eq!(mailbox.deleted, vec!["1", "2", "3"]);
    assert!(!mailbox.calls.iter().any(|c| c.starts_with("DATE 2")));
    assert!(mailbox.calls.contains(&"BODY 3 Some(1)".to_string()));
}

#[tokio::test]
async fn test_stale_messages_are_skipped() {
    let mailbox = MockMailbox::default()
        .with_message("4", 60, &token_html("444444"))
        .with_message("5", 3600, &token_html("555555"));
    let clipboard = FakeClipboard::default();
    let notifier = RecordingNotifier::default();

    let mut daemon = daemon(config(), mailbox, &clipboard, &notifier);
    let report = daemon.poll_once().await.unwrap();

    assert_eq!(report.recent, 1);
    assert_eq!(report.token.unwrap().code, "444444");
    // 剪貼簿原本是空的，不需要還原
    assert_eq!(*clipboard.writes.lock().unwrap(), vec!["444444"]);
    assert!(!daemon.client().calls.contains(&"BODY 5 Some(1)".to_string()));
}

#[tokio::test]
async fn test_clipboard_failure_falls_back_to_notification() {
    let mailbox = MockMailbox::default().with_message("8", 5, &token_html("333333"));
    let clipboard = FakeClipboard {
        broken: true,
        ..FakeClipboard::default()
    };
    let notifier = RecordingNotifier::default();

    let mut daemon = daemon(config(), mailbox, &clipboard, &notifier);
    let report = daemon.poll_once().await.unwrap();

    assert_eq!(report.delivery, Some(Delivery::NotifiedOnly));
    assert_eq!(*clipboard.reads.lock().unwrap(), 3);
    assert!(clipboard.writes.lock().unwrap().is_empty());
    assert_eq!(
        *notifier.messages.lock().unwrap(),
        vec!["Unable to copy token to clipboard! Token: 333333"]
    );
    assert_eq!(report.deleted, 1);
}

#[tokio::test]
async fn test_clipboard_recovers_within_retry_attempts() {
    let mailbox = MockMailbox::default().with_message("8", 5, &token_html("654321"));
    let clipboard = FakeClipboard::default();
    *clipboard.content.lock().unwrap() = Some("shopping list".to_string());
    *clipboard.flaky_reads.lock().unwrap() = 2;
    let notifier = RecordingNotifier::default();

    let mut daemon = daemon(config(), mailbox, &clipboard, &notifier);
    let report = daemon.poll_once().await.unwrap();

    assert_eq!(report.delivery, Some(Delivery::Copied));
    assert_eq!(*clipboard.reads.lock().unwrap(), 3);
    assert_eq!(*clipboard.writes.lock().unwrap(), vec!["654321", "shopping list"]);
    assert_eq!(*notifier.messages.lock().unwrap(), vec!["Token copied!"]);
}

#[tokio::test]
async fn test_unparsable_date_moves_on_to_older_message() {
    let mailbox = MockMailbox::default()
        .with_message("4", 20, &token_html("121212"))
        .with_raw_date("5", "", &token_html("565656"))
        .with_raw_date("6", "sometime yesterday", &token_html("909090"));
    let clipboard = FakeClipboard::default();
    let notifier = RecordingNotifier::default();

    let mut daemon = daemon(config(), mailbox, &clipboard, &notifier);
    let report = daemon.poll_once().await.unwrap();

    assert_eq!(report.found, 3);
    assert_eq!(report.recent, 1);
    let token = report.token.unwrap();
    assert_eq!(token.uid, "4");
    assert_eq!(token.code, "121212");
    assert_eq!(report.deleted, 3);

    let calls = &daemon.client().calls;
    assert!(calls.contains(&"DATE 6".to_string()));
    assert!(calls.contains(&"DATE 5".to_string()));
    assert!(!calls.iter().any(|c| c.starts_with("BODY 6") || c.starts_with("BODY 5")));
}

#[tokio::test]
async fn test_message_without_token_is_still_deleted() {
    let mailbox =
        MockMailbox::default().with_message("9", 5, "<p>Welcome aboard, no code here</p>");
    let clipboard = FakeClipboard::default();
    let notifier = RecordingNotifier::default();

    let mut daemon = daemon(config(), mailbox, &clipboard, &notifier);
    let report = daemon.poll_once().await.unwrap();

    assert_eq!(report.recent, 1);
    assert!(report.token.is_none());
    assert!(report.delivery.is_none());
    assert_eq!(report.deleted, 1);
    assert!(notifier.messages.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_processed_disabled_keeps_messages() {
    let mailbox = MockMailbox::default().with_message("2", 5, &token_html("777777"));
    let clipboard = FakeClipboard::default();
    let notifier = RecordingNotifier::default();
    let mut config = config();
    config.daemon.delete_processed = false;

    let mut daemon = daemon(config, mailbox, &clipboard, &notifier);
    let report = daemon.poll_once().await.unwrap();

    assert_eq!(report.deleted, 0);
    assert!(daemon.client().deleted.is_empty());
}

#[tokio::test]
async fn test_empty_mailbox_reports_nothing() {
    let clipboard = FakeClipboard::default();
    let notifier = RecordingNotifier::default();

    let mut daemon = daemon(config(), MockMailbox::default(), &clipboard, &notifier);
    let report = daemon.poll_once().await.unwrap();

    assert_eq!(report.found, 0);
    assert_eq!(report.deleted, 0);
    assert!(report.token.is_none());
}

#[tokio::test]
async fn test_run_stops_after_max_cycles() {
    let clipboard = FakeClipboard::default();
    let notifier = RecordingNotifier::default();
    let mut config = config();
    config.daemon.max_cycles = Some(2);

    let mut daemon = daemon(config, MockMailbox::default(), &clipboard, &notifier);
    let cycles = daemon.run().await.unwrap();

    assert_eq!(cycles, 2);
    let mailbox = daemon.into_client();
    assert_eq!(mailbox.connects, 1);
    assert_eq!(
        mailbox.calls,
        vec![
            "CONNECT",
            "LOGIN",
            "SELECT INBOX",
            "SEARCH noreply@login.example.com",
            "SEARCH noreply@login.example.com",
            "DISCONNECT",
        ]
    );
}

#[tokio::test]
async fn test_run_reinitializes_after_poll_error() {
    let clipboard = FakeClipboard::default();
    let notifier = RecordingNotifier::default();
    let mut config = config();
    config.daemon.max_cycles = Some(2);
    let mailbox = MockMailbox {
        failing_searches: 1,
        ..MockMailbox::default()
    };

    let mut daemon = daemon(config, mailbox, &clipboard, &notifier);
    let cycles = daemon.run().await.unwrap();

    assert_eq!(cycles, 2);
    assert_eq!(daemon.client().connects, 2);
}

#[tokio::test]
async fn test_run_retries_initialization_until_connected() {
    let clipboard = FakeClipboard::default();
    let notifier = RecordingNotifier::default();
    let mut config = config();
    config.daemon.max_cycles = Some(1);
    let mailbox = MockMailbox {
        failing_connects: 3,
        ..MockMailbox::default()
    };

    let started = std::time::Instant::now();
    let mut daemon = daemon(config, mailbox, &clipboard, &notifier);
    let cycles = daemon.run().await.unwrap();

    assert_eq!(cycles, 1);
    // 三次失敗各等待 reconnect_delay_ms = 10
    assert!(started.elapsed() >= std::time::Duration::from_millis(30));

    let mailbox = daemon.into_client();
    assert_eq!(mailbox.connects, 4);
    assert_eq!(
        mailbox.calls,
        vec![
            "CONNECT",
            "DISCONNECT",
            "CONNECT",
            "DISCONNECT",
            "CONNECT",
            "DISCONNECT",
            "CONNECT",
            "LOGIN",
            "SELECT INBOX",
            "SEARCH noreply@login.example.com",
            "DISCONNECT",
        ]
    );
}

#[tokio::test]
async fn test_run_returns_error_when_last_cycle_fails() {
    let clipboard = FakeClipboard::default();
    let notifier = RecordingNotifier::default();
    let mut config = config();
    config.daemon.max_cycles = Some(1);
    let mailbox = MockMailbox {
        failing_searches: 1,
        ..MockMailbox::default()
    };

    let mut daemon = daemon(config, mailbox, &clipboard, &notifier);
    let err = daemon.run().await.unwrap_err();
    assert!(matches!(err, DaemonError::ConnectionError { .. }));
}

#[tokio::test]
async fn test_run_honors_shutdown_signal() {
    let clipboard = FakeClipboard::default();
    let notifier = RecordingNotifier::default();
    let (tx, rx) = watch::channel(false);

    let mut daemon = daemon(config(), MockMailbox::default(), &clipboard, &notifier)
        .with_shutdown(rx);

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        tx
    });

    let cycles = daemon.run().await.unwrap();
    let _tx = stopper.await.unwrap();

    assert!(cycles >= 1);
    assert_eq!(daemon.client().connects, 1);
}

#[tokio::test]
async fn test_shutdown_before_start_connects_nothing() {
    let clipboard = FakeClipboard::default();
    let notifier = RecordingNotifier::default();
    let (tx, rx) = watch::channel(true);

    let mut daemon = daemon(config(), MockMailbox::default(), &clipboard, &notifier)
        .with_shutdown(rx);
    let cycles = daemon.run().await.unwrap();

    drop(tx);
    assert_eq!(cycles, 0);
    assert_eq!(daemon.client().connects, 0);
}
