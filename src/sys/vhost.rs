// src/sys/vhost.rs

use async_trait::async_trait;
use nix::unistd::{Gid, Group, Uid, User, chown};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::sys::suexec::SuexecAllowList;
use crate::sys::traits::{SiteProvisioner, SiteSpec};
use crate::sys::validate::validate_site_name;

/// URL prefix the CGI bridge is mounted under. Fixed across all sites.
const CGI_URL_PREFIX: &str = "/cgi-bin/";

// ==============================================================================
// 1. Rendered configuration
// ==============================================================================

/// An Apache virtual-host config assembled as an ordered list of named
/// sections and rendered to text once, at the end. Section names never
/// reach the output; they exist so a partially-built document can be
/// inspected without string-matching the whole artifact.
#[derive(Debug, Default)]
pub struct VhostDocument {
    sections: Vec<(&'static str, String)>,
}

impl VhostDocument {
    pub fn push(&mut self, name: &'static str, body: String) {
        self.sections.push((name, body));
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.iter().any(|(n, _)| *n == name)
    }

    pub fn section_count(&self, name: &str) -> usize {
        self.sections.iter().filter(|(n, _)| *n == name).count()
    }

    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(|(_, body)| body.as_str())
            .collect::<Vec<_>>()
            .concat()
    }
}

// ==============================================================================
// 2. Concrete provisioner
// ==============================================================================

pub struct ApacheSiteProvisioner {
    sites_available_dir: PathBuf,
    log_dir: PathBuf,
    suexec_binary: PathBuf,
    allow_list: SuexecAllowList,
}

impl ApacheSiteProvisioner {
    pub fn new(
        sites_available_dir: PathBuf,
        log_dir: PathBuf,
        suexec_binary: PathBuf,
        allow_list: SuexecAllowList,
    ) -> Self {
        Self {
            sites_available_dir,
            log_dir,
            suexec_binary,
            allow_list,
        }
    }

    /// Builds the full document for a spec. Pure; no filesystem access.
    pub fn render_document(&self, spec: &SiteSpec) -> VhostDocument {
        // Apache wants the ScriptAlias target with a trailing slash.
        let cgi_dir = format!("{}/", spec.cgi_bridge_dir().display());
        let mut doc = VhostDocument::default();

        doc.push(
            "virtual-host",
            format!(
                r#"<VirtualHost *:80>
    FastCgiWrapper {suexec}
    FastCgiConfig -autoUpdate -killInterval 120 -idleTimeout 30
    DocumentRoot {docroot}
    ErrorLog {log_dir}/{name}.error.log
    CustomLog {log_dir}/{name}.access.log combined
    SuexecUserGroup {user} {group}
    ScriptAlias {cgi_url} {cgi_dir}
    <Directory {docroot}>
        Options All
        AllowOverride All
    </Directory>
"#,
                suexec = self.suexec_binary.display(),
                docroot = spec.document_root.display(),
                log_dir = self.log_dir.display(),
                name = spec.name,
                user = spec.run_as_user,
                group = spec.run_as_group,
                cgi_url = CGI_URL_PREFIX,
                cgi_dir = cgi_dir,
            ),
        );

        if spec.php_interpreter.is_some() {
            doc.push(
                "php-handler",
                format!(
                    r#"    AddHandler php-fcgi .php
    Action php-fcgi {cgi_url}php-fcgi
    <Location {cgi_url}php-fcgi>
        SetHandler fastcgi-script
        Options +ExecCGI +FollowSymLinks
        Order allow,deny
        Allow from all
    </Location>
"#,
                    cgi_url = CGI_URL_PREFIX,
                ),
            );
        }

        doc.push("closing", "</VirtualHost>\n".to_string());
        doc
    }

    /// The wrapper SuExec launches per site; it pins the FastCGI pool
    /// policy and execs the real interpreter.
    fn render_php_wrapper(cgi_dir: &str, interpreter: &Path) -> String {
        format!(
            r#"#!/bin/sh
export PHP_FCGI_CHILDREN=4
export PHP_FCGI_MAX_REQUESTS=200
export PHPRC={cgi_dir}php.ini
exec {interpreter}
"#,
            interpreter = interpreter.display(),
        )
    }
}

#[async_trait]
impl SiteProvisioner for ApacheSiteProvisioner {
    async fn create_site(&self, spec: &SiteSpec) -> Result<(), String> {
        // A bad name fails here, before any filesystem mutation.
        validate_site_name(&spec.name)?;

        let cgi_dir = spec.cgi_bridge_dir();
        let cgi_dir_slash = format!("{}/", cgi_dir.display());

        // 1. CGI bridge directory, world-traversable for Apache.
        fs::create_dir_all(&cgi_dir)
            .await
            .map_err(|e| format!("Failed to create {}: {e}", cgi_dir.display()))?;
        set_mode(&cgi_dir, 0o755).await?;

        // 2-4. Assemble the config document.
        let doc = self.render_document(spec);

        // 3b. The wrapper script rides along only when PHP is configured.
        if let Some(interpreter) = &spec.php_interpreter {
            let wrapper_path = cgi_dir.join("php-fcgi");
            let wrapper = Self::render_php_wrapper(&cgi_dir_slash, interpreter);
            fs::write(&wrapper_path, wrapper)
                .await
                .map_err(|e| format!("Failed to write {}: {e}", wrapper_path.display()))?;
            set_mode(&wrapper_path, 0o755).await?;
        }

        // 5. Persist, overwriting any previous rendering of the same site.
        // Enabling is a separate step (a2ensite).
        let config_path = self.sites_available_dir.join(&spec.name);
        fs::write(&config_path, doc.render())
            .await
            .map_err(|e| format!("Failed to write {}: {e}", config_path.display()))?;

        // 6. Hand the bridge directory to the SuExec user.
        chown_tree(&cgi_dir, &spec.run_as_user, &spec.run_as_group).await?;

        // 7. Register the document root with SuExec.
        self.allow_list.ensure_entry(&spec.document_root).await?;

        info!(site = %spec.name, config = %config_path.display(), "Virtual host provisioned");
        Ok(())
    }
}

async fn set_mode(path: &Path, mode: u32) -> Result<(), String> {
    let mut perms = fs::metadata(path)
        .await
        .map_err(|e| format!("Failed to stat {}: {e}", path.display()))?
        .permissions();
    perms.set_mode(mode);
    fs::set_permissions(path, perms)
        .await
        .map_err(|e| format!("Failed to chmod {}: {e}", path.display()))
}

/// Recursively chowns a directory tree. Owner and group are resolved by
/// name up front; unknown principals are fatal before the walk starts.
/// Symlinked entries are skipped, not followed.
async fn chown_tree(root: &Path, user: &str, group: &str) -> Result<(), String> {
    let uid = User::from_name(user)
        .map_err(|e| format!("Failed to look up user '{user}': {e}"))?
        .ok_or_else(|| format!("Unknown user: '{user}'"))?
        .uid;
    let gid = Group::from_name(group)
        .map_err(|e| format!("Failed to look up group '{group}': {e}"))?
        .ok_or_else(|| format!("Unknown group: '{group}'"))?
        .gid;

    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        apply_owner(&dir, uid, gid)?;
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| format!("Failed to read {}: {e}", dir.display()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| format!("Failed to read {}: {e}", dir.display()))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| format!("Failed to stat {}: {e}", entry.path().display()))?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if !file_type.is_symlink() {
                apply_owner(&entry.path(), uid, gid)?;
            }
        }
    }
    Ok(())
}

fn apply_owner(path: &Path, uid: Uid, gid: Gid) -> Result<(), String> {
    chown(path, Some(uid), Some(gid)).map_err(|e| format!("Failed to chown {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn current_user() -> String {
        User::from_uid(Uid::effective()).unwrap().unwrap().name
    }

    fn current_group() -> String {
        Group::from_gid(Gid::effective()).unwrap().unwrap().name
    }

    fn provisioner(root: &Path) -> ApacheSiteProvisioner {
        let sites = root.join("sites-available");
        std::fs::create_dir_all(&sites).unwrap();
        ApacheSiteProvisioner::new(
            sites,
            root.join("log"),
            PathBuf::from("/usr/lib/apache2/suexec"),
            SuexecAllowList::new(root.join("suexec").join("www-data")),
        )
    }

    /// A spec whose ownership step resolves to the test process itself, so
    /// the chown walk succeeds without privileges.
    fn spec_in(root: &Path, name: &str, php: Option<&str>) -> SiteSpec {
        SiteSpec {
            name: name.to_string(),
            document_root: root.join(name),
            run_as_user: current_user(),
            run_as_group: current_group(),
            php_interpreter: php.map(PathBuf::from),
        }
    }

    fn mode_of(path: &Path) -> u32 {
        std::fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn base_document_carries_all_vhost_directives() {
        let tmp = tempdir().unwrap();
        let p = provisioner(tmp.path());
        let spec = SiteSpec::from_args("blog", None, None, None, None).unwrap();

        let rendered = p.render_document(&spec).render();
        assert!(rendered.starts_with("<VirtualHost *:80>"));
        assert!(rendered.contains("FastCgiWrapper /usr/lib/apache2/suexec"));
        assert!(rendered.contains("DocumentRoot /blog"));
        assert!(rendered.contains(&format!("ErrorLog {}/blog.error.log", tmp.path().join("log").display())));
        assert!(rendered.contains("SuexecUserGroup blog blog"));
        assert!(rendered.contains("ScriptAlias /cgi-bin/ /blog/.cgi-bin/"));
        assert!(rendered.contains("Options All"));
        assert!(rendered.contains("AllowOverride All"));
        assert!(rendered.trim_end().ends_with("</VirtualHost>"));
    }

    #[test]
    fn php_section_appears_exactly_once_when_configured() {
        let tmp = tempdir().unwrap();
        let p = provisioner(tmp.path());

        let plain = SiteSpec::from_args("blog", None, None, None, None).unwrap();
        let doc = p.render_document(&plain);
        assert!(!doc.has_section("php-handler"));
        assert!(!doc.render().contains("AddHandler php-fcgi"));

        let with_php =
            SiteSpec::from_args("blog", None, None, None, Some("/usr/bin/php-cgi")).unwrap();
        let doc = p.render_document(&with_php);
        assert_eq!(doc.section_count("php-handler"), 1);
        let rendered = doc.render();
        assert_eq!(rendered.matches("AddHandler php-fcgi .php").count(), 1);
        assert!(rendered.contains("Action php-fcgi /cgi-bin/php-fcgi"));
    }

    #[tokio::test]
    async fn create_site_writes_config_and_bridge_dir() {
        let tmp = tempdir().unwrap();
        let p = provisioner(tmp.path());
        let spec = spec_in(tmp.path(), "blog", None);

        p.create_site(&spec).await.unwrap();

        let config = std::fs::read_to_string(tmp.path().join("sites-available/blog")).unwrap();
        assert!(config.contains(&format!("DocumentRoot {}", spec.document_root.display())));
        assert!(config.contains(&format!(
            "SuexecUserGroup {} {}",
            spec.run_as_user, spec.run_as_group
        )));

        let cgi_dir = spec.cgi_bridge_dir();
        assert!(cgi_dir.is_dir());
        assert_eq!(mode_of(&cgi_dir), 0o755);
        assert!(!cgi_dir.join("php-fcgi").exists());
    }

    #[tokio::test]
    async fn create_site_with_php_writes_executable_wrapper() {
        let tmp = tempdir().unwrap();
        let p = provisioner(tmp.path());
        let spec = spec_in(tmp.path(), "blog", Some("/usr/bin/php-cgi"));

        p.create_site(&spec).await.unwrap();

        let wrapper = spec.cgi_bridge_dir().join("php-fcgi");
        assert_eq!(mode_of(&wrapper), 0o755);
        let body = std::fs::read_to_string(&wrapper).unwrap();
        assert!(body.starts_with("#!/bin/sh"));
        assert!(body.contains("export PHP_FCGI_CHILDREN=4"));
        assert!(body.contains(&format!(
            "PHPRC={}/php.ini",
            spec.cgi_bridge_dir().display()
        )));
        assert!(body.contains("exec /usr/bin/php-cgi"));

        let config = std::fs::read_to_string(tmp.path().join("sites-available/blog")).unwrap();
        assert_eq!(config.matches("AddHandler php-fcgi .php").count(), 1);
    }

    #[tokio::test]
    async fn create_site_overwrites_instead_of_appending() {
        let tmp = tempdir().unwrap();
        let p = provisioner(tmp.path());
        let spec = spec_in(tmp.path(), "blog", None);

        p.create_site(&spec).await.unwrap();
        let first = std::fs::read_to_string(tmp.path().join("sites-available/blog")).unwrap();
        p.create_site(&spec).await.unwrap();
        let second = std::fs::read_to_string(tmp.path().join("sites-available/blog")).unwrap();

        assert_eq!(first, second);
        assert_eq!(second.matches("<VirtualHost").count(), 1);
    }

    #[tokio::test]
    async fn document_root_registered_with_suexec_exactly_once() {
        let tmp = tempdir().unwrap();
        let p = provisioner(tmp.path());
        let spec = spec_in(tmp.path(), "blog", None);

        p.create_site(&spec).await.unwrap();
        p.create_site(&spec).await.unwrap();
        p.create_site(&spec).await.unwrap();

        let allow = std::fs::read_to_string(tmp.path().join("suexec/www-data")).unwrap();
        let entry = spec.document_root.display().to_string();
        assert_eq!(allow.lines().filter(|l| *l == entry).count(), 1);
    }

    #[tokio::test]
    async fn empty_site_name_fails_before_touching_disk() {
        let tmp = tempdir().unwrap();
        let p = provisioner(tmp.path());
        let mut spec = spec_in(tmp.path(), "blog", None);
        spec.name = String::new();

        assert!(p.create_site(&spec).await.is_err());
        assert!(!spec.cgi_bridge_dir().exists());
    }

    #[tokio::test]
    async fn unknown_owner_is_fatal() {
        let tmp = tempdir().unwrap();
        let p = provisioner(tmp.path());
        let mut spec = spec_in(tmp.path(), "blog", None);
        spec.run_as_user = "no-such-user-902817".to_string();

        let err = p.create_site(&spec).await.unwrap_err();
        assert!(err.contains("Unknown user"), "{err}");
    }
}
