use std::fmt;

/// IMAP 訊息 UID，保留伺服器回傳的原始字串
pub type Uid = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    No,
    Bad,
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::No => write!(f, "NO"),
            Self::Bad => write!(f, "BAD"),
        }
    }
}

/// 一個 tagged 指令的完整回應
#[derive(Debug, Clone)]
pub struct ImapResponse {
    pub status: ResponseStatus,
    pub status_text: String,
    /// untagged 行（已去除 "* " 與行尾 CRLF）
    pub lines: Vec<String>,
    /// `{n}` literal 內容，依出現順序
    pub literals: Vec<Vec<u8>>,
}

impl ImapResponse {
    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    /// 串接所有 untagged 行，不含 literal
    pub fn text(&self) -> String {
        self.lines.join("\r\n")
    }

    pub fn first_literal_text(&self) -> Option<String> {
        self.literals
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailToken {
    pub uid: Uid,
    pub code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// 已複製到剪貼簿並在保留時間後還原
    Copied,
    /// 剪貼簿不可用，僅透過通知顯示
    NotifiedOnly,
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub found: usize,
    pub recent: usize,
    pub token: Option<MailToken>,
    pub delivery: Option<Delivery>,
    pub deleted: usize,
}
