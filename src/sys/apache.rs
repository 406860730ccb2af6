// src/sys/apache.rs

use async_trait::async_trait;
use tracing::info;

use crate::sys::run::CommandRunner;
use crate::sys::traits::WebServerManager;
use crate::sys::validate::validate_site_name;

/// Drives the stock Debian toggles (`a2enmod` and friends) and the
/// configtest-gated restart.
pub struct ApacheManager {
    runner: CommandRunner,
}

impl ApacheManager {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    async fn toggle(&self, tool: &str, names: &[String]) -> Result<(), String> {
        // Validate the whole batch before the first toggle runs.
        for name in names {
            validate_site_name(name)?;
        }
        for name in names {
            self.runner.run(tool, &[name.as_str()]).await?;
            info!("{tool} {name}");
        }
        Ok(())
    }
}

#[async_trait]
impl WebServerManager for ApacheManager {
    async fn enable_modules(&self, modules: &[String]) -> Result<(), String> {
        self.toggle("a2enmod", modules).await
    }

    async fn disable_modules(&self, modules: &[String]) -> Result<(), String> {
        self.toggle("a2dismod", modules).await
    }

    async fn enable_sites(&self, names: &[String]) -> Result<(), String> {
        self.toggle("a2ensite", names).await
    }

    async fn disable_sites(&self, names: &[String]) -> Result<(), String> {
        self.toggle("a2dissite", names).await
    }

    async fn restart(&self) -> Result<(), String> {
        self.runner
            .run("apache2ctl", &["configtest"])
            .await
            .map_err(|e| format!("Apache config check failed: {e}"))?;

        self.runner.run("systemctl", &["restart", "apache2"]).await?;
        info!("Apache restarted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn toggle_rejects_hostile_names_before_spawning() {
        let mgr = ApacheManager::new(CommandRunner::default());
        let err = mgr
            .enable_modules(&["rewrite;reboot".to_string()])
            .await
            .unwrap_err();
        assert!(err.contains("Invalid characters"), "{err}");

        let err = mgr
            .enable_sites(&["../../etc/passwd".to_string()])
            .await
            .unwrap_err();
        assert!(err.contains("Path traversal"), "{err}");
    }

    #[tokio::test]
    async fn batch_validation_happens_before_any_toggle() {
        // First name is fine, second is not; nothing should run.
        let mgr = ApacheManager::new(CommandRunner::default());
        let names = vec!["rewrite".to_string(), "bad name".to_string()];
        assert!(mgr.enable_modules(&names).await.is_err());
    }
}
