use crate::domain::model::{ResponseStatus, Uid};

/// 解析 tagged 完成行，例如 `A0003 OK SEARCH completed`
pub fn parse_tagged(line: &str, tag: &str) -> Option<(ResponseStatus, String)> {
    let rest = line.strip_prefix(tag)?.strip_prefix(' ')?;
    let (word, text) = match rest.split_once(' ') {
        Some((word, text)) => (word, text.trim().to_string()),
        None => (rest, String::new()),
    };
    let status = match word.to_ascii_uppercase().as_str() {
        "OK" => ResponseStatus::Ok,
        "NO" => ResponseStatus::No,
        "BAD" => ResponseStatus::Bad,
        _ => return None,
    };
    Some((status, text))
}

/// 行尾的 `{n}` (或 `{n+}`) literal 長度；超出 u64 的長度以 `u64::MAX` 表示
pub fn literal_size(line: &str) -> Option<u64> {
    let inner = line.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    let digits = inner[open + 1..].trim_end_matches('+');
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(digits.parse().unwrap_or(u64::MAX))
}

/// 取第一個 `SEARCH` 回應行中的 UID
pub fn parse_search_uids(lines: &[String]) -> Vec<Uid> {
    lines
        .iter()
        .find_map(|line| {
            let mut words = line.split_whitespace();
            match words.next() {
                Some(first) if first.eq_ignore_ascii_case("SEARCH") => {
                    Some(words.map(str::to_string).collect())
                }
                _ => None,
            }
        })
        .unwrap_or_default()
}

/// IMAP quoted string
pub fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}
