// src/main.rs

mod agent;
mod config;
mod sys;

use crate::agent::ProvisionService;
use crate::config::AgentConfig;

const USAGE: &str = "\
lampctl — single-host Ubuntu LAMP provisioning

Usage: lampctl <command> [args]

  nameservers-local-purge
  nameservers-append <ip>
  apt-mirror-pick <country-code>
  apt-packages-update
  apt-packages-install <package>...
  apache-modules-enable <module>...
  apache-modules-disable <module>...
  apache-sites-create <name> [path] [user] [group]
  apache-sites-enable <name>...
  apache-sites-disable <name>...
  apache-restart
  mysql-database-create <name> [charset] [collation]
  mysql-database-restore <name> <backup-dir>
  mysql-database-backup <name> <backup-dir>
  mysql-remote-access-allow
  mysql-remote-access-revoke
  mysql-restart

Environment: SUDO, PHP, MYSQL_ROOT_PASSWORD, LAMPCTL_CONFIG, LAMPCTL_*
";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprint!("{USAGE}");
        std::process::exit(2);
    };

    let service = ProvisionService::new(AgentConfig::load());

    // First error terminates the whole run; partially-applied state is
    // left in place for the operator to inspect.
    if let Err(err) = dispatch(&service, command, &args[1..]).await {
        tracing::error!("{err}");
        std::process::exit(1);
    }
}

async fn dispatch(
    service: &ProvisionService,
    command: &str,
    rest: &[String],
) -> Result<(), String> {
    match command {
        "nameservers-local-purge" => service.nameservers_local_purge().await,
        "nameservers-append" => service.nameservers_append(required(rest, 0, "ip")?).await,

        "apt-mirror-pick" => {
            service
                .apt_mirror_pick(required(rest, 0, "country-code")?)
                .await
        }
        "apt-packages-update" => service.apt_packages_update().await,
        "apt-packages-install" => {
            service
                .apt_packages_install(at_least_one(rest, "package")?)
                .await
        }

        "apache-modules-enable" => {
            service
                .apache_modules_enable(at_least_one(rest, "module")?)
                .await
        }
        "apache-modules-disable" => {
            service
                .apache_modules_disable(at_least_one(rest, "module")?)
                .await
        }
        "apache-sites-create" => {
            service
                .apache_sites_create(
                    required(rest, 0, "name")?,
                    rest.get(1).map(String::as_str),
                    rest.get(2).map(String::as_str),
                    rest.get(3).map(String::as_str),
                )
                .await
        }
        "apache-sites-enable" => {
            service
                .apache_sites_enable(at_least_one(rest, "name")?)
                .await
        }
        "apache-sites-disable" => {
            service
                .apache_sites_disable(at_least_one(rest, "name")?)
                .await
        }
        "apache-restart" => service.apache_restart().await,

        "mysql-database-create" => {
            service
                .mysql_database_create(
                    required(rest, 0, "name")?,
                    rest.get(1).map(String::as_str),
                    rest.get(2).map(String::as_str),
                )
                .await
        }
        "mysql-database-restore" => {
            service
                .mysql_database_restore(
                    required(rest, 0, "name")?,
                    required(rest, 1, "backup-dir")?,
                )
                .await
        }
        "mysql-database-backup" => {
            service
                .mysql_database_backup(
                    required(rest, 0, "name")?,
                    required(rest, 1, "backup-dir")?,
                )
                .await
        }
        "mysql-remote-access-allow" => service.mysql_remote_access(true).await,
        "mysql-remote-access-revoke" => service.mysql_remote_access(false).await,
        "mysql-restart" => service.mysql_restart().await,

        _ => {
            eprint!("{USAGE}");
            Err(format!("Unknown command: {command}"))
        }
    }
}

fn required<'a>(args: &'a [String], index: usize, label: &str) -> Result<&'a str, String> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| format!("Missing required argument: <{label}>"))
}

fn at_least_one<'a>(args: &'a [String], label: &str) -> Result<&'a [String], String> {
    if args.is_empty() {
        return Err(format!("At least one <{label}> argument is required"));
    }
    Ok(args)
}
