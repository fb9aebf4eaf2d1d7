use anyhow::Result;
use email_daemon::core::token::{body_payload, extract_token, parse_internaldate};
use email_daemon::{DaemonConfig, DaemonError, ImapClient};
use regex::Regex;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

const BODY: &str = "PGh0bWw+PGJvZHk+PHA+WW91ciBsb2dpbiBjb2Rl\r\nPC9wPjxwPjxiPjEyMzQ1NjwvYj48L3A+PC9ib2R5PjwvaHRtbD4=\r\n";

fn respond(command: &str) -> (String, String) {
    let words: Vec<&str> = command.split_whitespace().collect();
    let ok = |text: &str| format!("OK {}", text);

    match words.as_slice() {
        ["LOGIN", _, password] if *password == "\"wrong\"" => (
            String::new(),
            "NO [AUTHENTICATIONFAILED] Invalid credentials".to_string(),
        ),
        ["LOGIN", ..] => (String::new(), ok("LOGIN completed")),
        ["SELECT", ..] => (
            "* 2 EXISTS\r\n* FLAGS (\\Seen \\Deleted)\r\n".to_string(),
            ok("[READ-WRITE] SELECT completed"),
        ),
        ["UID", "SEARCH", ..] => ("* SEARCH 3 7\r\n".to_string(), ok("SEARCH completed")),
        ["UID", "FETCH", uid, "INTERNALDATE"] => (
            format!(
                "* 1 FETCH (UID {} INTERNALDATE \"17-Jul-2025 14:03:27 +0200\")\r\n",
                uid
            ),
            ok("FETCH completed"),
        ),
        ["UID", "FETCH", "9", item] if item.starts_with("BODY[") => (
            format!("* 1 FETCH (UID 9 {} {{18446744073709551615}}\r\n", item),
            ok("FETCH completed"),
        ),
        ["UID", "FETCH", uid, item] if item.starts_with("BODY[") => (
            format!(
                "* 2 FETCH (UID {} {} {{{}}}\r\n{})\r\n",
                uid,
                item,
                BODY.len(),
                BODY
            ),
            ok("FETCH completed"),
        ),
        ["UID", "STORE", ..] => (
            "* 1 FETCH (FLAGS (\\Deleted))\r\n* 2 FETCH (FLAGS (\\Deleted))\r\n".to_string(),
            ok("STORE completed"),
        ),
        ["EXPUNGE"] => (
            "* 1 EXPUNGE\r\n* 1 EXPUNGE\r\n".to_string(),
            ok("EXPUNGE completed"),
        ),
        ["LOGOUT"] => ("* BYE logging out\r\n".to_string(), ok("LOGOUT completed")),
        _ => (String::new(), "BAD unknown command".to_string()),
    }
}

/// 單一連線的假 IMAP 伺服器，記錄收到的指令
async fn start_server(greeting: &'static str) -> (u16, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let received = Arc::new(Mutex::new(Vec::new()));
    let log = received.clone();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = socket.into_split();
        let mut reader = BufReader::new(reader);

        writer.write_all(greeting.as_bytes()).await.unwrap();

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                break;
            }
            let line = line.trim_end().to_string();
            let (tag, command) = line.split_once(' ').unwrap();
            log.lock().unwrap().push(line.clone());

            let (untagged, status) = respond(command);
            writer.write_all(untagged.as_bytes()).await.unwrap();
            writer
                .write_all(format!("{} {}\r\n", tag, status).as_bytes())
                .await
                .unwrap();

            if command == "LOGOUT" {
                break;
            }
        }
    });

    (port, received)
}

fn config(port: u16, password: &str) -> DaemonConfig {
    let toml = format!(
        r#"
[imap]
host = "127.0.0.1"
port = {}
username = "watcher@example.com"
password = "{}"
security = "plain"
connect_timeout_secs = 5
io_timeout_secs = 5

[watch]
sender = "noreply@login.example.com"
"#,
        port, password
    );
    DaemonConfig::from_toml_str(&toml).unwrap()
}

#[tokio::test]
async fn test_full_session_against_fake_server() -> Result<()> {
    let (port, received) = start_server("* OK [CAPABILITY IMAP4rev1] ready\r\n").await;
    let config = config(port, "secret");
    let mut client = ImapClient::new(config.imap.clone());

    client.connect().await?;
    assert!(client.is_connected());
    client.login().await?;

    let selected = client.select("INBOX").await?;
    assert!(selected.is_ok());
    assert_eq!(selected.lines[0], "2 EXISTS");

    let uids = client.search_from(&config.watch.sender).await?;
    assert_eq!(uids, vec!["3", "7"]);

    let date = client.fetch_internaldate("7").await?;
    let received_at = parse_internaldate(&date.text()).unwrap();
    assert_eq!(received_at.to_rfc3339(), "2025-07-17T14:03:27+02:00");

    let body = client.fetch_body("7", config.body_part()).await?;
    assert_eq!(body.literals.len(), 1);
    assert_eq!(body.literals[0], BODY.as_bytes());
    assert_eq!(body.lines.last().map(String::as_str), Some(")"));

    let pattern = Regex::new(&config.watch.token_pattern)?;
    assert_eq!(
        extract_token(&body_payload(&body), &pattern),
        Some("123456".to_string())
    );

    let expunged = client.delete_uids(&uids).await?.expect("EXPUNGE response");
    assert!(expunged.is_ok());

    client.disconnect().await;
    assert!(!client.is_connected());

    let commands = received.lock().unwrap().clone();
    assert_eq!(
        commands,
        vec![
            "A0001 LOGIN \"watcher@example.com\" \"secret\"",
            "A0002 SELECT \"INBOX\"",
            "A0003 UID SEARCH FROM \"noreply@login.example.com\"",
            "A0004 UID FETCH 7 INTERNALDATE",
            "A0005 UID FETCH 7 BODY[1]",
            "A0006 UID STORE 3,7 +FLAGS (\\Deleted)",
            "A0007 EXPUNGE",
            "A0008 LOGOUT",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_whole_message_fetch_uses_body_brackets() {
    let (port, received) = start_server("* OK ready\r\n").await;
    let mut config = config(port, "secret");
    config.watch.body_part = 0;
    let mut client = ImapClient::new(config.imap.clone());

    client.connect().await.unwrap();
    let body = client.fetch_body("3", config.body_part()).await.unwrap();
    assert_eq!(body.literals[0], BODY.as_bytes());
    client.disconnect().await;

    let commands = received.lock().unwrap().clone();
    assert_eq!(commands[0], "A0001 UID FETCH 3 BODY[]");
}

#[tokio::test]
async fn test_rejected_login_is_server_error() {
    let (port, _received) = start_server("* OK ready\r\n").await;
    let config = config(port, "wrong");
    let mut client = ImapClient::new(config.imap.clone());

    client.connect().await.unwrap();
    let err = client.login().await.unwrap_err();
    match &err {
        DaemonError::ServerError { command, message } => {
            assert_eq!(command, "LOGIN");
            assert!(message.starts_with("NO"));
            assert!(message.contains("AUTHENTICATIONFAILED"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_bye_greeting_is_connection_error() {
    let (port, _received) = start_server("* BYE too many connections\r\n").await;
    let config = config(port, "secret");
    let mut client = ImapClient::new(config.imap.clone());

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, DaemonError::ConnectionError { .. }));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut client = ImapClient::new(config(port, "secret").imap);
    let err = client.connect().await.unwrap_err();
    assert!(matches!(
        err,
        DaemonError::ConnectionError { .. } | DaemonError::Timeout { .. }
    ));
}

#[tokio::test]
async fn test_oversized_literal_drops_session() {
    let (port, _received) = start_server("* OK ready\r\n").await;
    let config = config(port, "secret");
    let mut client = ImapClient::new(config.imap.clone());

    client.connect().await.unwrap();
    let err = client.fetch_body("9", config.body_part()).await.unwrap_err();
    assert!(matches!(err, DaemonError::ProtocolError { .. }));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_literal_limit_is_configurable() {
    let (port, _received) = start_server("* OK ready\r\n").await;
    let mut config = config(port, "secret");
    config.imap.max_literal_bytes = 16;
    let mut client = ImapClient::new(config.imap.clone());

    client.connect().await.unwrap();
    let err = client.fetch_body("7", config.body_part()).await.unwrap_err();
    match err {
        DaemonError::ProtocolError { message } => {
            assert!(message.contains(&BODY.len().to_string()));
            assert!(message.contains("16 byte limit"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(!client.is_connected());
}
