// src/sys/run.rs

use std::process::Output;
use tokio::process::Command;

/// Spawns external binaries, optionally through a privilege-escalation
/// prefix (`sudo` when the agent is not already root). The prefix is plain
/// configuration handed in at construction; call sites never consult the
/// ambient environment.
#[derive(Clone, Debug, Default)]
pub struct CommandRunner {
    escalate: Option<String>,
}

impl CommandRunner {
    pub fn new(escalate: Option<String>) -> Self {
        Self { escalate }
    }

    /// Builds a command with the escalation prefix applied. Callers add
    /// arguments, environment, or stdio redirection before running it.
    pub fn command(&self, program: &str) -> Command {
        match &self.escalate {
            Some(prefix) => {
                let mut cmd = Command::new(prefix);
                cmd.arg(program);
                cmd
            }
            None => Command::new(program),
        }
    }

    pub async fn run(&self, program: &str, args: &[&str]) -> Result<Output, String> {
        let mut cmd = self.command(program);
        cmd.args(args);
        self.run_command(program, cmd).await
    }

    /// Runs a pre-built command and enforces a zero exit status. The failing
    /// tool's stderr is the diagnostic; there is nothing to add to it.
    pub async fn run_command(&self, program: &str, mut cmd: Command) -> Result<Output, String> {
        let output = cmd
            .output()
            .await
            .map_err(|e| format!("Failed to spawn {program}: {e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{program} exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_returns_output() {
        let runner = CommandRunner::default();
        let output = runner.run("echo", &["hello"]).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn failing_command_reports_exit_code() {
        let runner = CommandRunner::default();
        let err = runner.run("sh", &["-c", "echo boom >&2; exit 3"]).await.unwrap_err();
        assert!(err.contains("exited with code 3"), "{err}");
        assert!(err.contains("boom"), "{err}");
    }

    #[tokio::test]
    async fn missing_binary_reports_spawn_failure() {
        let runner = CommandRunner::default();
        let err = runner.run("definitely-not-a-binary", &[]).await.unwrap_err();
        assert!(err.contains("Failed to spawn"), "{err}");
    }

    #[test]
    fn escalation_prefix_wraps_program() {
        let runner = CommandRunner::new(Some("sudo".to_string()));
        let cmd = runner.command("apt-get");
        assert_eq!(cmd.as_std().get_program(), "sudo");
    }

    #[tokio::test]
    async fn escalation_prefix_passes_program_through() {
        // 'env' runs its argv as a command, standing in for sudo here.
        let runner = CommandRunner::new(Some("env".to_string()));
        let output = runner.run("echo", &["escalated"]).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "escalated");
    }
}
