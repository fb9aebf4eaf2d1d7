use crate::domain::model::ImapResponse;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, FixedOffset, Utc};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

fn internaldate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"\bINTERNALDATE\s+"(\s?\d{1,2}-[A-Za-z]{3}-\d{4}\s\d{2}:\d{2}:\d{2}\s[+-]\d{4})""#,
        )
        .expect("static INTERNALDATE pattern")
    })
}

fn quoted_body_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"BODY\[[^\]]*\]\s+"((?:[^"\\]|\\.)*)""#).expect("static BODY pattern")
    })
}

/// 從 `UID FETCH <uid> INTERNALDATE` 的回應中取出接收時間
pub fn parse_internaldate(text: &str) -> Option<DateTime<FixedOffset>> {
    let caps = internaldate_regex().captures(text)?;
    let raw = caps.get(1)?.as_str().trim();
    match DateTime::parse_from_str(raw, "%d-%b-%Y %H:%M:%S %z") {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::error!("Failed to parse timestamp '{}': {}", raw, e);
            None
        }
    }
}

/// 郵件是否在時間窗內：`0 <= now - received <= window`
pub fn is_recent(received: DateTime<FixedOffset>, now: DateTime<Utc>, window: Duration) -> bool {
    let diff = now.signed_duration_since(received);
    match chrono::Duration::from_std(window) {
        Ok(window) => diff >= chrono::Duration::zero() && diff <= window,
        Err(_) => diff >= chrono::Duration::zero(),
    }
}

/// 去掉原始 FETCH 記錄的第一行 (FETCH 標頭) 與最後一行 (結尾括號)
pub fn extract_base64_from_email(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    if lines.len() <= 2 {
        return String::new();
    }
    lines[1..lines.len() - 1]
        .iter()
        .map(|line| format!("{}\n", line))
        .collect()
}

/// 以 base64 解碼郵件內容；不是合法 base64 時原樣回傳
pub fn decode_body(payload: &str) -> String {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return payload.to_string();
    }
    match STANDARD.decode(compact.as_bytes()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => payload.to_string(),
    }
}

pub fn find_token(body: &str, pattern: &Regex) -> Option<String> {
    pattern
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// 先在解碼後的內容中尋找 token，找不到再看原始內容
pub fn extract_token(payload: &str, pattern: &Regex) -> Option<String> {
    let decoded = decode_body(payload);
    tracing::debug!("Decoded email body: {}", decoded);
    find_token(&decoded, pattern).or_else(|| find_token(payload, pattern))
}

/// 取得 FETCH BODY 回應中的郵件內容：literal、引號字串或原始記錄
pub fn body_payload(response: &ImapResponse) -> String {
    if let Some(text) = response.first_literal_text() {
        return text;
    }
    let text = response.text();
    if let Some(caps) = quoted_body_regex().captures(&text) {
        if let Some(m) = caps.get(1) {
            return m.as_str().replace("\\\"", "\"").replace("\\\\", "\\");
        }
    }
    extract_base64_from_email(&text)
}
