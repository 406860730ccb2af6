// src/sys/resolver.rs

use async_trait::async_trait;
use std::net::IpAddr;
use std::path::PathBuf;
use tokio::fs;
use tracing::info;

use crate::sys::traits::ResolverManager;

pub struct ResolvConfManager {
    resolv_conf: PathBuf,
}

impl ResolvConfManager {
    pub fn new(resolv_conf: PathBuf) -> Self {
        Self { resolv_conf }
    }

    async fn read(&self) -> Result<String, String> {
        match fs::read_to_string(&self.resolv_conf).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(format!("Failed to read {}: {e}", self.resolv_conf.display())),
        }
    }

    async fn write(&self, content: String) -> Result<(), String> {
        fs::write(&self.resolv_conf, content)
            .await
            .map_err(|e| format!("Failed to write {}: {e}", self.resolv_conf.display()))
    }
}

/// Drops loopback resolver lines, keeping everything else byte-for-byte.
pub fn purge_local_entries(content: &str) -> String {
    content
        .lines()
        .filter(|line| !is_local_nameserver(line))
        .map(|line| format!("{line}\n"))
        .collect()
}

fn is_local_nameserver(line: &str) -> bool {
    let mut fields = line.split_whitespace();
    matches!(
        (fields.next(), fields.next()),
        (Some("nameserver"), Some(addr)) if addr.starts_with("127.")
    )
}

fn has_nameserver(content: &str, address: &str) -> bool {
    content.lines().any(|line| {
        let mut fields = line.split_whitespace();
        fields.next() == Some("nameserver") && fields.next() == Some(address)
    })
}

#[async_trait]
impl ResolverManager for ResolvConfManager {
    async fn purge_local_nameservers(&self) -> Result<(), String> {
        let content = self.read().await?;
        let purged = purge_local_entries(&content);
        if purged != content {
            self.write(purged).await?;
            info!(path = %self.resolv_conf.display(), "Loopback nameservers purged");
        }
        Ok(())
    }

    async fn append_nameserver(&self, address: &str) -> Result<bool, String> {
        address
            .parse::<IpAddr>()
            .map_err(|_| format!("Not an IP address: '{address}'"))?;

        let mut content = self.read().await?;
        if has_nameserver(&content, address) {
            return Ok(false);
        }

        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&format!("nameserver {address}\n"));
        self.write(content).await?;

        info!(nameserver = address, "Nameserver appended");
        Ok(true)
    }
}
