use crate::domain::model::{ImapResponse, Uid};
use crate::utils::error::Result;
use async_trait::async_trait;

/// 守護程序所需的信箱操作
#[async_trait]
pub trait MailboxClient: Send {
    /// 建立連線並讀取伺服器問候
    async fn connect(&mut self) -> Result<()>;
    async fn login(&mut self) -> Result<()>;
    async fn select(&mut self, mailbox: &str) -> Result<ImapResponse>;
    async fn search_from(&mut self, sender: &str) -> Result<Vec<Uid>>;
    async fn fetch_internaldate(&mut self, uid: &str) -> Result<ImapResponse>;
    /// `part` 為 None 時抓取整封郵件 (`BODY[]`)
    async fn fetch_body(&mut self, uid: &str, part: Option<u32>) -> Result<ImapResponse>;
    /// 標記刪除並 EXPUNGE；空清單不送出任何指令
    async fn delete_uids(&mut self, uids: &[Uid]) -> Result<Option<ImapResponse>>;
    async fn disconnect(&mut self);
}

#[async_trait]
pub trait Clipboard: Send + Sync {
    /// 目前的剪貼簿文字；空的剪貼簿回傳 None
    async fn read(&self) -> Result<Option<String>>;
    async fn write(&self, text: &str) -> Result<()>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<()>;
}
