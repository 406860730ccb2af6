// src/sys/database.rs

use async_trait::async_trait;
use chrono::Local;
use regex::Regex;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tracing::{info, warn};

use crate::sys::run::CommandRunner;
use crate::sys::secrets::DbCredential;
use crate::sys::traits::{DatabaseAdmin, DatabaseSpec, RestoreOutcome};
use crate::sys::validate::validate_sql_identifier;

/// Backup archives are named `<YYYYMMDD>-<HHMM>.tar.bz2`. The stamp doubles
/// as the sort key, so the lexicographic maximum is the newest dump.
const BACKUP_STAMP_FORMAT: &str = "%Y%m%d-%H%M";

fn backup_name_pattern() -> Regex {
    Regex::new(r"^\d{8}-\d{4}\.tar\.bz2$").unwrap()
}

pub struct MysqlAdmin {
    runner: CommandRunner,
    cnf_path: PathBuf,
    credential: Option<DbCredential>,
}

impl MysqlAdmin {
    pub fn new(runner: CommandRunner, cnf_path: PathBuf, credential: Option<DbCredential>) -> Self {
        Self {
            runner,
            cnf_path,
            credential,
        }
    }

    /// Client command with the credential in the process environment.
    /// MYSQL_PWD keeps the password off the command line, where every
    /// local user could read it out of /proc.
    fn client_command(&self, program: &str) -> tokio::process::Command {
        let mut cmd = self.runner.command(program);
        if let Some(credential) = &self.credential {
            credential.with_password(|password| {
                cmd.env("MYSQL_PWD", std::ffi::OsStr::from_bytes(password));
            });
        }
        cmd
    }

    async fn table_count(&self, name: &str) -> Result<u64, String> {
        let mut cmd = self.client_command("mysql");
        cmd.args(["-N", "-B", "-e"]).arg(format!(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = '{name}'"
        ));
        let output = self.runner.run_command("mysql", cmd).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("Unexpected table count output '{}': {e}", stdout.trim()))
    }
}

/// Picks the newest date-stamped archive in a directory, or None when
/// nothing matches the naming scheme.
pub async fn find_latest_backup(backup_dir: &Path) -> Result<Option<PathBuf>, String> {
    let pattern = backup_name_pattern();
    let mut entries = fs::read_dir(backup_dir)
        .await
        .map_err(|e| format!("Failed to read backup directory {}: {e}", backup_dir.display()))?;

    let mut latest: Option<(String, PathBuf)> = None;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| format!("Failed to read backup directory {}: {e}", backup_dir.display()))?
    {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !pattern.is_match(&file_name) {
            continue;
        }
        if latest.as_ref().map(|(name, _)| file_name > *name).unwrap_or(true) {
            latest = Some((file_name, entry.path()));
        }
    }
    Ok(latest.map(|(_, path)| path))
}

/// Locates the SQL dump inside an unpacked archive (top level only; the
/// backup writer puts it there).
async fn find_sql_dump(dir: &Path) -> Result<Option<PathBuf>, String> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", dir.display()))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| format!("Failed to read {}: {e}", dir.display()))?
    {
        let path = entry.path();
        if path.extension().map(|ext| ext == "sql").unwrap_or(false) {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Rewrites the bind-address line, reactivating a commented-out one.
/// Returns the new content and whether anything changed.
pub fn rewrite_bind_address(content: &str, address: &str) -> (String, bool) {
    let re = Regex::new(r"(?m)^\s*#?\s*bind-address\s*=.*$").unwrap();
    if !re.is_match(content) {
        return (content.to_string(), false);
    }
    let replacement = format!("bind-address            = {address}");
    let updated = re.replace_all(content, replacement.as_str()).to_string();
    let changed = updated != content;
    (updated, changed)
}

#[async_trait]
impl DatabaseAdmin for MysqlAdmin {
    async fn create_database(&self, spec: &DatabaseSpec) -> Result<(), String> {
        validate_sql_identifier("database name", &spec.name)?;
        validate_sql_identifier("charset", &spec.charset)?;
        validate_sql_identifier("collation", &spec.collation)?;

        let statement = format!(
            "CREATE DATABASE IF NOT EXISTS `{}` CHARACTER SET {} COLLATE {}",
            spec.name, spec.charset, spec.collation
        );
        let mut cmd = self.client_command("mysql");
        cmd.arg("-e").arg(&statement);
        self.runner.run_command("mysql", cmd).await?;

        info!(database = %spec.name, charset = %spec.charset, collation = %spec.collation, "Database created");
        Ok(())
    }

    async fn restore_database(
        &self,
        name: &str,
        backup_dir: &Path,
    ) -> Result<RestoreOutcome, String> {
        validate_sql_identifier("database name", name)?;

        if self.table_count(name).await? > 0 {
            warn!(database = %name, "Database already has tables; refusing to restore over it");
            return Ok(RestoreOutcome::AlreadyPopulated);
        }

        let Some(archive) = find_latest_backup(backup_dir).await? else {
            warn!(directory = %backup_dir.display(), "No date-stamped backup archive found");
            return Ok(RestoreOutcome::NoBackupFound);
        };

        // Unpack into a throwaway staging directory.
        let staging = tempfile::tempdir()
            .map_err(|e| format!("Failed to create staging directory: {e}"))?;
        let archive_arg = archive.display().to_string();
        let staging_arg = staging.path().display().to_string();
        self.runner
            .run("tar", &["-xjf", archive_arg.as_str(), "-C", staging_arg.as_str()])
            .await?;

        let dump = find_sql_dump(staging.path())
            .await?
            .ok_or_else(|| format!("Archive {} contains no SQL dump", archive.display()))?;

        let dump_file = std::fs::File::open(&dump)
            .map_err(|e| format!("Failed to open {}: {e}", dump.display()))?;
        let mut cmd = self.client_command("mysql");
        cmd.arg(name).stdin(Stdio::from(dump_file));
        self.runner.run_command("mysql", cmd).await?;

        info!(database = %name, archive = %archive.display(), "Database restored");
        Ok(RestoreOutcome::Restored(archive))
    }

    async fn backup_database(&self, name: &str, backup_dir: &Path) -> Result<PathBuf, String> {
        validate_sql_identifier("database name", name)?;

        fs::create_dir_all(backup_dir)
            .await
            .map_err(|e| format!("Failed to create {}: {e}", backup_dir.display()))?;

        let staging = tempfile::tempdir()
            .map_err(|e| format!("Failed to create staging directory: {e}"))?;
        let dump_name = format!("{name}.sql");
        let dump_path = staging.path().join(&dump_name);

        let dump_file = std::fs::File::create(&dump_path)
            .map_err(|e| format!("Failed to create {}: {e}", dump_path.display()))?;
        let mut cmd = self.client_command("mysqldump");
        cmd.arg(name).stdout(Stdio::from(dump_file));
        self.runner.run_command("mysqldump", cmd).await?;

        let stamp = Local::now().format(BACKUP_STAMP_FORMAT);
        let archive = backup_dir.join(format!("{stamp}.tar.bz2"));
        let archive_arg = archive.display().to_string();
        let staging_arg = staging.path().display().to_string();
        // -C so the archive holds the bare dump, matching what restore expects.
        self.runner
            .run(
                "tar",
                &[
                    "-cjf",
                    archive_arg.as_str(),
                    "-C",
                    staging_arg.as_str(),
                    dump_name.as_str(),
                ],
            )
            .await?;

        info!(database = %name, archive = %archive.display(), "Database dumped");
        Ok(archive)
    }

    async fn set_remote_access(&self, allow: bool) -> Result<bool, String> {
        let address = if allow { "0.0.0.0" } else { "127.0.0.1" };
        let content = fs::read_to_string(&self.cnf_path)
            .await
            .map_err(|e| format!("Failed to read {}: {e}", self.cnf_path.display()))?;

        let (updated, changed) = rewrite_bind_address(&content, address);
        if !changed {
            return Ok(false);
        }

        fs::write(&self.cnf_path, updated)
            .await
            .map_err(|e| format!("Failed to write {}: {e}", self.cnf_path.display()))?;

        info!(bind_address = address, "MySQL bind address updated");
        Ok(true)
    }

    async fn restart(&self) -> Result<(), String> {
        self.runner.run("systemctl", &["restart", "mysql"]).await?;
        info!("MySQL restarted");
        Ok(())
    }
}
