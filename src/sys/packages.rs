// src/sys/packages.rs

use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use tokio::fs;
use tracing::info;

use crate::sys::run::CommandRunner;
use crate::sys::traits::PackageManager;
use crate::sys::validate::{validate_country_code, validate_package_name};

pub struct AptPackageManager {
    runner: CommandRunner,
    sources_list: PathBuf,
}

/// Rewrites every archive mirror reference to the country-local host.
/// Handles both the bare `archive.ubuntu.com` and an already-localized
/// `xx.archive.ubuntu.com`.
pub fn rewrite_mirror(content: &str, country_code: &str) -> String {
    let re = Regex::new(r"http://(?:[a-z]{2}\.)?archive\.ubuntu\.com").unwrap();
    re.replace_all(content, format!("http://{country_code}.archive.ubuntu.com").as_str())
        .to_string()
}

impl AptPackageManager {
    pub fn new(runner: CommandRunner, sources_list: PathBuf) -> Self {
        Self {
            runner,
            sources_list,
        }
    }
}

#[async_trait]
impl PackageManager for AptPackageManager {
    async fn refresh_index(&self) -> Result<(), String> {
        self.runner.run("apt-get", &["-q", "update"]).await?;
        info!("Package index refreshed");
        Ok(())
    }

    async fn install(&self, packages: &[String]) -> Result<(), String> {
        // Validate the whole request before apt-get sees any of it.
        for package in packages {
            validate_package_name(package)?;
        }

        let mut cmd = self.runner.command("apt-get");
        cmd.env("DEBIAN_FRONTEND", "noninteractive")
            .arg("-y")
            .arg("install")
            .args(packages);
        self.runner.run_command("apt-get", cmd).await?;

        info!(count = packages.len(), "Packages installed");
        Ok(())
    }

    async fn select_mirror(&self, country_code: &str) -> Result<bool, String> {
        validate_country_code(country_code)?;

        let content = fs::read_to_string(&self.sources_list)
            .await
            .map_err(|e| format!("Failed to read {}: {e}", self.sources_list.display()))?;

        let updated = rewrite_mirror(&content, country_code);
        if updated == content {
            return Ok(false);
        }

        fs::write(&self.sources_list, updated)
            .await
            .map_err(|e| format!("Failed to write {}: {e}", self.sources_list.display()))?;

        info!(mirror = country_code, "apt mirror updated");
        Ok(true)
    }
}
