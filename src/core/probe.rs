use crate::utils::error::Result;
use std::time::Duration;

/// 以 HTTP HEAD 確認網路可用；只要伺服器有回應即視為成功，回傳狀態碼
pub async fn probe(url: &str, timeout: Duration) -> Result<u16> {
    tracing::info!("🔍 Probing {}", url);
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client.head(url).send().await?;
    let status = response.status();
    tracing::info!("✅ Sanity check passed, {} answered {}", url, status);
    Ok(status.as_u16())
}
