// src/agent.rs

use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::AgentConfig;
use crate::sys::apache::ApacheManager;
use crate::sys::database::MysqlAdmin;
use crate::sys::packages::AptPackageManager;
use crate::sys::resolver::ResolvConfManager;
use crate::sys::run::CommandRunner;
use crate::sys::secrets::DbCredential;
use crate::sys::suexec::SuexecAllowList;
use crate::sys::traits::{
    DatabaseAdmin, DatabaseSpec, PackageManager, ResolverManager, RestoreOutcome, SiteProvisioner,
    SiteSpec, WebServerManager,
};
use crate::sys::vhost::ApacheSiteProvisioner;

/// Orchestrates the per-concern managers. Implementations can be swapped
/// behind the trait objects without touching the dispatch code in main.
pub struct ProvisionService {
    config: AgentConfig,
    sites: Box<dyn SiteProvisioner>,
    web: Box<dyn WebServerManager>,
    packages: Box<dyn PackageManager>,
    resolver: Box<dyn ResolverManager>,
    database: Box<dyn DatabaseAdmin>,
}

impl ProvisionService {
    pub fn new(config: AgentConfig) -> Self {
        let runner = CommandRunner::new(config.escalate.clone());
        Self {
            sites: Box::new(ApacheSiteProvisioner::new(
                PathBuf::from(&config.sites_available_dir),
                PathBuf::from(&config.apache_log_dir),
                PathBuf::from(&config.suexec_binary),
                SuexecAllowList::new(PathBuf::from(&config.suexec_allowlist)),
            )),
            web: Box::new(ApacheManager::new(runner.clone())),
            packages: Box::new(AptPackageManager::new(
                runner.clone(),
                PathBuf::from(&config.apt_sources),
            )),
            resolver: Box::new(ResolvConfManager::new(PathBuf::from(&config.resolv_conf))),
            database: Box::new(MysqlAdmin::new(
                runner,
                PathBuf::from(&config.mysql_cnf),
                DbCredential::from_env("MYSQL_ROOT_PASSWORD"),
            )),
            config,
        }
    }

    // --- DNS resolver -------------------------------------------------------

    pub async fn nameservers_local_purge(&self) -> Result<(), String> {
        self.resolver.purge_local_nameservers().await
    }

    pub async fn nameservers_append(&self, address: &str) -> Result<(), String> {
        if !self.resolver.append_nameserver(address).await? {
            info!(nameserver = address, "Nameserver already present");
        }
        Ok(())
    }

    // --- apt ----------------------------------------------------------------

    pub async fn apt_mirror_pick(&self, country_code: &str) -> Result<(), String> {
        if !self.packages.select_mirror(country_code).await? {
            info!(mirror = country_code, "apt mirror already selected");
        }
        Ok(())
    }

    pub async fn apt_packages_update(&self) -> Result<(), String> {
        self.packages.refresh_index().await
    }

    pub async fn apt_packages_install(&self, packages: &[String]) -> Result<(), String> {
        self.packages.install(packages).await
    }

    // --- Apache -------------------------------------------------------------

    /// The site-provisioning workflow. Positional defaults cascade
    /// (path from name, user from name, group from user); the PHP
    /// interpreter comes from configuration, not from arguments.
    pub async fn apache_sites_create(
        &self,
        name: &str,
        path: Option<&str>,
        user: Option<&str>,
        group: Option<&str>,
    ) -> Result<(), String> {
        let spec = SiteSpec::from_args(
            name,
            path,
            user,
            group,
            self.config.php_interpreter.as_deref(),
        )?;
        self.sites.create_site(&spec).await
    }

    pub async fn apache_modules_enable(&self, modules: &[String]) -> Result<(), String> {
        self.web.enable_modules(modules).await
    }

    pub async fn apache_modules_disable(&self, modules: &[String]) -> Result<(), String> {
        self.web.disable_modules(modules).await
    }

    pub async fn apache_sites_enable(&self, names: &[String]) -> Result<(), String> {
        self.web.enable_sites(names).await
    }

    pub async fn apache_sites_disable(&self, names: &[String]) -> Result<(), String> {
        self.web.disable_sites(names).await
    }

    pub async fn apache_restart(&self) -> Result<(), String> {
        self.web.restart().await
    }

    // --- MySQL --------------------------------------------------------------

    pub async fn mysql_database_create(
        &self,
        name: &str,
        charset: Option<&str>,
        collation: Option<&str>,
    ) -> Result<(), String> {
        let spec = DatabaseSpec::from_args(name, charset, collation)?;
        self.database.create_database(&spec).await
    }

    pub async fn mysql_database_restore(&self, name: &str, backup_dir: &str) -> Result<(), String> {
        match self
            .database
            .restore_database(name, Path::new(backup_dir))
            .await?
        {
            RestoreOutcome::Restored(archive) => {
                info!(archive = %archive.display(), "Restore complete");
            }
            // The no-op branches were already reported by the admin.
            RestoreOutcome::AlreadyPopulated | RestoreOutcome::NoBackupFound => {}
        }
        Ok(())
    }

    pub async fn mysql_database_backup(&self, name: &str, backup_dir: &str) -> Result<(), String> {
        let archive = self
            .database
            .backup_database(name, Path::new(backup_dir))
            .await?;
        info!(archive = %archive.display(), "Backup complete");
        Ok(())
    }

    pub async fn mysql_remote_access(&self, allow: bool) -> Result<(), String> {
        if self.database.set_remote_access(allow).await? {
            self.database.restart().await?;
        } else {
            info!("MySQL bind address already as requested");
        }
        Ok(())
    }

    pub async fn mysql_restart(&self) -> Result<(), String> {
        self.database.restart().await
    }
}
