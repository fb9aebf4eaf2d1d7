use crate::utils::error::{DaemonError, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// 明文或 TLS 連線，讓指令層不必區分兩者
pub(crate) enum ImapStream {
    Plain(BufReader<TcpStream>),
    Tls(Box<BufReader<TlsStream<TcpStream>>>),
}

impl ImapStream {
    /// 讀取一行 (含 CRLF)；伺服器送出的非 UTF-8 位元組會以替代字元呈現
    pub(crate) async fn read_line(&mut self, buf: &mut String) -> Result<usize> {
        let mut raw = Vec::new();
        let n = match self {
            Self::Plain(r) => r.read_until(b'\n', &mut raw).await,
            Self::Tls(r) => r.read_until(b'\n', &mut raw).await,
        }
        .map_err(|e| DaemonError::connection(format!("Read error: {}", e)))?;
        buf.push_str(&String::from_utf8_lossy(&raw));
        Ok(n)
    }

    pub(crate) async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        match self {
            Self::Plain(r) => r.read_exact(buf).await,
            Self::Tls(r) => r.read_exact(buf).await,
        }
        .map(|_| ())
        .map_err(|e| DaemonError::connection(format!("Literal read error: {}", e)))
    }

    pub(crate) async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(r) => r.get_mut().write_all(data).await,
            Self::Tls(r) => r.get_mut().write_all(data).await,
        }
        .map_err(|e| DaemonError::connection(format!("Write error: {}", e)))
    }

    pub(crate) async fn flush(&mut self) -> Result<()> {
        match self {
            Self::Plain(r) => r.get_mut().flush().await,
            Self::Tls(r) => r.get_mut().flush().await,
        }
        .map_err(|e| DaemonError::connection(format!("Flush error: {}", e)))
    }

    pub(crate) async fn shutdown(&mut self) {
        let _ = match self {
            Self::Plain(r) => r.get_mut().shutdown().await,
            Self::Tls(r) => r.get_mut().shutdown().await,
        };
    }
}
