// src/config.rs

use serde::Deserialize;
use std::env;

/// Every ambient input of the agent, made explicit: the privilege
/// escalation prefix, the PHP interpreter, and the system file paths are
/// plain fields, so each operation can be pointed at a sandbox.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Privilege-escalation prefix for external commands. None when the
    /// agent already runs as root.
    pub escalate: Option<String>,
    /// PHP binary for the FastCGI wiring. None leaves the PHP handler
    /// block and wrapper script out of new sites.
    pub php_interpreter: Option<String>,
    pub sites_available_dir: String,
    pub suexec_allowlist: String,
    pub suexec_binary: String,
    pub apache_log_dir: String,
    pub resolv_conf: String,
    pub apt_sources: String,
    pub mysql_cnf: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            escalate: None,
            php_interpreter: None,
            sites_available_dir: "/etc/apache2/sites-available".to_string(),
            suexec_allowlist: "/etc/apache2/suexec/www-data".to_string(),
            suexec_binary: "/usr/lib/apache2/suexec".to_string(),
            apache_log_dir: "/var/log/apache2".to_string(),
            resolv_conf: "/etc/resolv.conf".to_string(),
            apt_sources: "/etc/apt/sources.list".to_string(),
            mysql_cnf: "/etc/mysql/my.cnf".to_string(),
        }
    }
}

impl AgentConfig {
    /// Loads the configuration: the JSON file named by LAMPCTL_CONFIG when
    /// present, then environment overrides on top. A malformed config file
    /// refuses to start rather than provisioning against half-read paths.
    pub fn load() -> Self {
        let mut config = match env::var("LAMPCTL_CONFIG") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .unwrap_or_else(|e| panic!("FATAL: cannot read config file {path}: {e}"));
                serde_json::from_str(&raw)
                    .unwrap_or_else(|e| panic!("FATAL: invalid config file {path}: {e}"))
            }
            Err(_) => Self::default(),
        };

        if let Ok(prefix) = env::var("SUDO") {
            if !prefix.is_empty() {
                config.escalate = Some(prefix);
            }
        }
        if let Ok(php) = env::var("PHP") {
            if !php.is_empty() {
                config.php_interpreter = Some(php);
            }
        }
        if let Ok(dir) = env::var("LAMPCTL_SITES_AVAILABLE") {
            config.sites_available_dir = dir;
        }
        if let Ok(path) = env::var("LAMPCTL_SUEXEC_ALLOWLIST") {
            config.suexec_allowlist = path;
        }
        if let Ok(path) = env::var("LAMPCTL_RESOLV_CONF") {
            config.resolv_conf = path;
        }
        if let Ok(path) = env::var("LAMPCTL_APT_SOURCES") {
            config.apt_sources = path;
        }
        if let Ok(path) = env::var("LAMPCTL_MYSQL_CNF") {
            config.mysql_cnf = path;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_stock_layout() {
        let config = AgentConfig::default();
        assert_eq!(config.sites_available_dir, "/etc/apache2/sites-available");
        assert_eq!(config.suexec_allowlist, "/etc/apache2/suexec/www-data");
        assert_eq!(config.mysql_cnf, "/etc/mysql/my.cnf");
        assert!(config.escalate.is_none());
        assert!(config.php_interpreter.is_none());
    }

    #[test]
    fn partial_json_keeps_defaults_for_the_rest() {
        let config: AgentConfig = serde_json::from_str(
            r#"{"php_interpreter": "/usr/bin/php-cgi", "apt_sources": "/tmp/sources.list"}"#,
        )
        .unwrap();
        assert_eq!(config.php_interpreter.as_deref(), Some("/usr/bin/php-cgi"));
        assert_eq!(config.apt_sources, "/tmp/sources.list");
        assert_eq!(config.resolv_conf, "/etc/resolv.conf");
    }
}
