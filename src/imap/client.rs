use crate::config::toml_config::{ImapConfig, Security};
use crate::domain::model::{ImapResponse, ResponseStatus, Uid};
use crate::domain::ports::MailboxClient;
use crate::imap::parse::{literal_size, parse_search_uids, parse_tagged, quote};
use crate::imap::stream::ImapStream;
use crate::utils::error::{DaemonError, Result};
use async_trait::async_trait;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// 單一 IMAP 連線；`connect` 可重複呼叫以重新建立連線
pub struct ImapClient {
    config: ImapConfig,
    stream: Option<ImapStream>,
    next_tag: u32,
}

impl ImapClient {
    pub fn new(config: ImapConfig) -> Self {
        Self {
            config,
            stream: None,
            next_tag: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub async fn connect(&mut self) -> Result<()> {
        self.stream = None;
        let addr = format!("{}:{}", self.config.host, self.config.port);
        tracing::debug!("Connecting to IMAP server {}", addr);

        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let tcp = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| DaemonError::timeout(format!("connect to {}", addr)))?
            .map_err(|e| DaemonError::connection(format!("Connection to {} failed: {}", addr, e)))?;

        let stream = match self.config.security {
            Security::Tls => {
                let tls = tokio::time::timeout(timeout, self.tls_handshake(tcp))
                    .await
                    .map_err(|_| DaemonError::timeout("TLS handshake"))??;
                ImapStream::Tls(Box::new(BufReader::new(tls)))
            }
            Security::Plain => ImapStream::Plain(BufReader::new(tcp)),
        };
        self.stream = Some(stream);
        self.next_tag = 0;

        let greeting = self.read_line().await?;
        let upper = greeting.to_ascii_uppercase();
        if upper.starts_with("* OK") || upper.starts_with("* PREAUTH") {
            tracing::info!("🔌 Connected to {}: {}", addr, greeting);
            Ok(())
        } else {
            self.stream = None;
            Err(DaemonError::connection(format!(
                "Server rejected connection: {}",
                greeting
            )))
        }
    }

    pub async fn login(&mut self) -> Result<()> {
        let command = format!(
            "LOGIN {} {}",
            quote(&self.config.username),
            quote(&self.config.password)
        );
        self.execute(&command).await?;
        tracing::info!("🔑 Logged in as {}", self.config.username);
        Ok(())
    }

    pub async fn select(&mut self, mailbox: &str) -> Result<ImapResponse> {
        self.execute(&format!("SELECT {}", quote(mailbox))).await
    }

    pub async fn raw_search(&mut self, criteria: &str) -> Result<ImapResponse> {
        self.execute(&format!("UID SEARCH {}", criteria)).await
    }

    pub async fn search(&mut self, criteria: &str) -> Result<Vec<Uid>> {
        let response = self.raw_search(criteria).await?;
        Ok(parse_search_uids(&response.lines))
    }

    pub async fn search_from(&mut self, sender: &str) -> Result<Vec<Uid>> {
        self.search(&format!("FROM {}", quote(sender))).await
    }

    pub async fn raw_fetch(&mut self, uid: &str, items: &str) -> Result<ImapResponse> {
        self.execute(&format!("UID FETCH {} {}", uid, items)).await
    }

    pub async fn fetch_internaldate(&mut self, uid: &str) -> Result<ImapResponse> {
        self.raw_fetch(uid, "INTERNALDATE").await
    }

    pub async fn fetch_body(&mut self, uid: &str, part: Option<u32>) -> Result<ImapResponse> {
        let items = match part {
            Some(part) => format!("BODY[{}]", part),
            None => "BODY[]".to_string(),
        };
        self.raw_fetch(uid, &items).await
    }

    pub async fn delete_uids(&mut self, uids: &[Uid]) -> Result<Option<ImapResponse>> {
        if uids.is_empty() {
            return Ok(None);
        }
        self.execute(&format!("UID STORE {} +FLAGS (\\Deleted)", uids.join(",")))
            .await?;
        let expunged = self.execute("EXPUNGE").await?;
        tracing::info!("🗑️ Deleted {} message(s)", uids.len());
        Ok(Some(expunged))
    }

    pub async fn logout(&mut self) -> Result<ImapResponse> {
        self.execute("LOGOUT").await
    }

    pub async fn disconnect(&mut self) {
        if self.stream.is_none() {
            return;
        }
        if let Err(e) = self.logout().await {
            tracing::debug!("LOGOUT failed: {}", e);
        }
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await;
        }
    }

    /// 送出 tagged 指令並讀到對應的完成行；NO/BAD 轉成錯誤
    pub async fn execute(&mut self, command: &str) -> Result<ImapResponse> {
        self.next_tag += 1;
        let tag = format!("A{:04}", self.next_tag);

        if command.starts_with("LOGIN ") {
            tracing::debug!("C: {} LOGIN {} ****", tag, self.config.username);
        } else {
            tracing::debug!("C: {} {}", tag, command);
        }

        let stream = self.stream_mut()?;
        stream
            .write_all(format!("{} {}\r\n", tag, command).as_bytes())
            .await?;
        stream.flush().await?;

        let response = self.read_response(&tag).await?;
        match response.status {
            ResponseStatus::Ok => Ok(response),
            status => {
                let verb = command.split_whitespace().next().unwrap_or(command);
                let verb = if verb.eq_ignore_ascii_case("UID") {
                    command.split_whitespace().take(2).collect::<Vec<_>>().join(" ")
                } else {
                    verb.to_string()
                };
                Err(DaemonError::ServerError {
                    command: verb,
                    message: format!("{} {}", status, response.status_text),
                })
            }
        }
    }

    async fn read_response(&mut self, tag: &str) -> Result<ImapResponse> {
        let mut lines = Vec::new();
        let mut literals = Vec::new();

        loop {
            let line = self.read_line().await?;

            if let Some((status, status_text)) = parse_tagged(&line, tag) {
                tracing::debug!("S: {}", line);
                return Ok(ImapResponse {
                    status,
                    status_text,
                    lines,
                    literals,
                });
            }

            if line.starts_with(tag) && line[tag.len()..].starts_with(' ') {
                return Err(DaemonError::protocol(format!(
                    "Unrecognised completion: {}",
                    line
                )));
            }

            if let Some(size) = literal_size(&line) {
                let mut literal = self.literal_buffer(size)?;
                let timeout = self.io_timeout();
                let stream = self.stream_mut()?;
                tokio::time::timeout(timeout, stream.read_exact(&mut literal))
                    .await
                    .map_err(|_| DaemonError::timeout("literal read"))??;
                tracing::debug!("S: {} ({} literal bytes)", line, size);
                literals.push(literal);
            } else {
                tracing::trace!("S: {}", line);
            }

            let untagged = line.strip_prefix("* ").unwrap_or(&line);
            lines.push(untagged.to_string());
        }
    }

    /// 讀一行並去除行尾 CRLF
    async fn read_line(&mut self) -> Result<String> {
        let timeout = self.io_timeout();
        let stream = self.stream_mut()?;
        let mut line = String::new();
        let n = tokio::time::timeout(timeout, stream.read_line(&mut line))
            .await
            .map_err(|_| DaemonError::timeout("read"))??;
        if n == 0 {
            self.stream = None;
            return Err(DaemonError::connection("Connection closed by server"));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// 依伺服器宣告的長度配置 literal 緩衝區，超過上限時丟棄連線
    fn literal_buffer(&mut self, size: u64) -> Result<Vec<u8>> {
        let limit = self.config.max_literal_bytes;
        let len = usize::try_from(size).ok().filter(|_| size <= limit);
        let Some(len) = len else {
            self.stream = None;
            return Err(DaemonError::protocol(format!(
                "Literal of {} bytes exceeds the {} byte limit",
                size, limit
            )));
        };

        let mut literal = Vec::new();
        literal.try_reserve_exact(len).map_err(|e| {
            self.stream = None;
            DaemonError::protocol(format!("Cannot allocate {} byte literal: {}", len, e))
        })?;
        literal.resize(len, 0);
        Ok(literal)
    }

    fn stream_mut(&mut self) -> Result<&mut ImapStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| DaemonError::connection("Not connected"))
    }

    fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.config.io_timeout_secs)
    }

    async fn tls_handshake(&self, tcp: TcpStream) -> Result<TlsStream<TcpStream>> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        if let Some(ca_path) = &self.config.ca_cert_path {
            let pem_data = tokio::fs::read(ca_path)
                .await
                .map_err(|e| DaemonError::tls(format!("Failed to read CA cert: {}", e)))?;
            let mut cursor = Cursor::new(pem_data);
            for cert in rustls_pemfile::certs(&mut cursor).filter_map(|r| r.ok()) {
                root_store
                    .add(cert)
                    .map_err(|e| DaemonError::tls(format!("Failed to add CA cert: {}", e)))?;
            }
        }

        let mut tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        if self.config.accept_invalid_certs {
            tracing::warn!("TLS certificate verification disabled");
            tls_config
                .dangerous()
                .set_certificate_verifier(Arc::new(NoCertVerifier));
        }

        let connector = TlsConnector::from(Arc::new(tls_config));
        let server_name = rustls::pki_types::ServerName::try_from(self.config.host.clone())
            .map_err(|e| DaemonError::tls(format!("Invalid server name: {}", e)))?;

        connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| DaemonError::tls(format!("TLS handshake failed: {}", e)))
    }
}

#[async_trait]
impl MailboxClient for ImapClient {
    async fn connect(&mut self) -> Result<()> {
        ImapClient::connect(self).await
    }

    async fn login(&mut self) -> Result<()> {
        ImapClient::login(self).await
    }

    async fn select(&mut self, mailbox: &str) -> Result<ImapResponse> {
        ImapClient::select(self, mailbox).await
    }

    async fn search_from(&mut self, sender: &str) -> Result<Vec<Uid>> {
        ImapClient::search_from(self, sender).await
    }

    async fn fetch_internaldate(&mut self, uid: &str) -> Result<ImapResponse> {
        ImapClient::fetch_internaldate(self, uid).await
    }

    async fn fetch_body(&mut self, uid: &str, part: Option<u32>) -> Result<ImapResponse> {
        ImapClient::fetch_body(self, uid, part).await
    }

    async fn delete_uids(&mut self, uids: &[Uid]) -> Result<Option<ImapResponse>> {
        ImapClient::delete_uids(self, uids).await
    }

    async fn disconnect(&mut self) {
        ImapClient::disconnect(self).await
    }
}

/// 接受任何憑證，只在 `accept_invalid_certs = true` 時使用
#[derive(Debug)]
struct NoCertVerifier;

impl rustls::client::danger::ServerCertVerifier for NoCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
        ]
    }
}
