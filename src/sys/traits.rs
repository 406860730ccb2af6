// src/sys/traits.rs

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::sys::validate::{validate_site_name, validate_sql_identifier, validate_unix_name};

// ==============================================================================
// 1. Site Provisioning (Apache + SuExec + optional PHP-FastCGI)
// ==============================================================================

/// Everything needed to stamp out one virtual host.
///
/// Built once from invocation arguments. Positional defaults cascade:
/// document root `/<name>`, user `<name>`, group `<user>`.
#[derive(Debug, Clone)]
pub struct SiteSpec {
    pub name: String,
    pub document_root: PathBuf,
    pub run_as_user: String,
    pub run_as_group: String,
    pub php_interpreter: Option<PathBuf>,
}

impl SiteSpec {
    pub fn from_args(
        name: &str,
        document_root: Option<&str>,
        run_as_user: Option<&str>,
        run_as_group: Option<&str>,
        php_interpreter: Option<&str>,
    ) -> Result<Self, String> {
        validate_site_name(name)?;

        let run_as_user = match run_as_user {
            Some(user) => {
                validate_unix_name(user)?;
                user.to_string()
            }
            None => name.to_string(),
        };
        let run_as_group = match run_as_group {
            Some(group) => {
                validate_unix_name(group)?;
                group.to_string()
            }
            None => run_as_user.clone(),
        };
        let document_root = match document_root {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(format!("/{name}")),
        };

        Ok(Self {
            name: name.to_string(),
            document_root,
            run_as_user,
            run_as_group,
            php_interpreter: php_interpreter.map(PathBuf::from),
        })
    }

    /// The CGI bridge directory the FastCGI wrapper scripts live in.
    pub fn cgi_bridge_dir(&self) -> PathBuf {
        self.document_root.join(".cgi-bin")
    }
}

#[async_trait]
pub trait SiteProvisioner: Send + Sync {
    /// Creates all filesystem artifacts required for Apache + SuExec
    /// (+ optional PHP-FastCGI) to serve a new virtual host. Does NOT
    /// enable the site; that is a separate `WebServerManager` call.
    async fn create_site(&self, spec: &SiteSpec) -> Result<(), String>;
}

// ==============================================================================
// 2. Web Server Control
// ==============================================================================

#[async_trait]
pub trait WebServerManager: Send + Sync {
    async fn enable_modules(&self, modules: &[String]) -> Result<(), String>;
    async fn disable_modules(&self, modules: &[String]) -> Result<(), String>;
    async fn enable_sites(&self, names: &[String]) -> Result<(), String>;
    async fn disable_sites(&self, names: &[String]) -> Result<(), String>;

    /// Configtest gate first; a broken config never reaches systemctl.
    async fn restart(&self) -> Result<(), String>;
}

// ==============================================================================
// 3. Package Management
// ==============================================================================

#[async_trait]
pub trait PackageManager: Send + Sync {
    async fn refresh_index(&self) -> Result<(), String>;
    async fn install(&self, packages: &[String]) -> Result<(), String>;

    /// Points the archive mirror at a country-local host.
    /// Returns true when the sources list actually changed.
    async fn select_mirror(&self, country_code: &str) -> Result<bool, String>;
}

// ==============================================================================
// 4. DNS Resolver
// ==============================================================================

#[async_trait]
pub trait ResolverManager: Send + Sync {
    /// Drops loopback `nameserver 127.*` entries, keeping everything else.
    async fn purge_local_nameservers(&self) -> Result<(), String>;

    /// Appends a nameserver line unless an identical one already exists.
    /// Returns true when a line was added.
    async fn append_nameserver(&self, address: &str) -> Result<bool, String>;
}

// ==============================================================================
// 5. Database Administration
// ==============================================================================

#[derive(Debug, Clone)]
pub struct DatabaseSpec {
    pub name: String,
    pub charset: String,
    pub collation: String,
}

impl DatabaseSpec {
    pub fn from_args(
        name: &str,
        charset: Option<&str>,
        collation: Option<&str>,
    ) -> Result<Self, String> {
        validate_sql_identifier("database name", name)?;
        let charset = charset.unwrap_or("utf8");
        let collation = collation.unwrap_or("utf8_general_ci");
        validate_sql_identifier("charset", charset)?;
        validate_sql_identifier("collation", collation)?;

        Ok(Self {
            name: name.to_string(),
            charset: charset.to_string(),
            collation: collation.to_string(),
        })
    }
}

/// Outcome of a restore attempt. Both no-op branches are first-class so the
/// caller can report them instead of guessing from silence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored(PathBuf),
    AlreadyPopulated,
    NoBackupFound,
}

#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    async fn create_database(&self, spec: &DatabaseSpec) -> Result<(), String>;

    /// Restores the newest date-stamped archive from `backup_dir` into an
    /// empty database. A database that already holds tables, or a directory
    /// with no matching archive, is a reported no-op.
    async fn restore_database(
        &self,
        name: &str,
        backup_dir: &Path,
    ) -> Result<RestoreOutcome, String>;

    /// Dumps the database into a date-stamped archive `restore_database`
    /// will pick up later. Returns the archive path.
    async fn backup_database(&self, name: &str, backup_dir: &Path) -> Result<PathBuf, String>;

    /// Opens up (or locks down) the server bind address.
    /// Returns true when the config file changed.
    async fn set_remote_access(&self, allow: bool) -> Result<bool, String>;

    async fn restart(&self) -> Result<(), String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn site_spec_defaults_cascade() {
        let spec = SiteSpec::from_args("blog", None, None, None, None).unwrap();
        assert_eq!(spec.document_root, Path::new("/blog"));
        assert_eq!(spec.run_as_user, "blog");
        assert_eq!(spec.run_as_group, "blog");
        assert!(spec.php_interpreter.is_none());
    }

    #[test]
    fn site_spec_group_defaults_to_user() {
        let spec = SiteSpec::from_args("blog", None, Some("www-run"), None, None).unwrap();
        assert_eq!(spec.run_as_user, "www-run");
        assert_eq!(spec.run_as_group, "www-run");
    }

    #[test]
    fn site_spec_explicit_arguments_win() {
        let spec = SiteSpec::from_args(
            "blog",
            Some("/srv/blog"),
            Some("alice"),
            Some("web"),
            Some("/usr/bin/php-cgi"),
        )
        .unwrap();
        assert_eq!(spec.document_root, Path::new("/srv/blog"));
        assert_eq!(spec.run_as_group, "web");
        assert_eq!(spec.php_interpreter.as_deref(), Some(Path::new("/usr/bin/php-cgi")));
    }

    #[test]
    fn site_spec_rejects_empty_name() {
        assert!(SiteSpec::from_args("", None, None, None, None).is_err());
    }

    #[test]
    fn cgi_bridge_dir_lives_under_document_root() {
        let spec = SiteSpec::from_args("blog", None, None, None, None).unwrap();
        assert_eq!(spec.cgi_bridge_dir(), Path::new("/blog/.cgi-bin"));
    }

    #[test]
    fn database_spec_defaults() {
        let spec = DatabaseSpec::from_args("shop", None, None).unwrap();
        assert_eq!(spec.charset, "utf8");
        assert_eq!(spec.collation, "utf8_general_ci");
    }

    #[test]
    fn database_spec_rejects_quote_breakers() {
        assert!(DatabaseSpec::from_args("shop`; DROP", None, None).is_err());
        assert!(DatabaseSpec::from_args("shop", Some("utf8'"), None).is_err());
    }
}
