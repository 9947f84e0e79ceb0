//! Command execution seam for the firewall backend.
//!
//! Abstracting over `std::process::Command` lets the backend tests mock
//! `firewall-cmd` invocations instead of running them.

use std::io;
use std::process::{Command, Stdio};

#[cfg(test)]
use mockall::automock;

/// Output from an executed command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

/// Runs external commands. The real implementation spawns processes; tests
/// substitute a mock.
#[cfg_attr(test, automock)]
pub trait CommandExecutor: Send + Sync {
    /// Run `cmd` with `args` and capture its output. An `Err` means the
    /// process could not be spawned at all; a non-zero exit is an `Ok`
    /// with `success == false`.
    fn execute(&self, cmd: &str, args: &[String]) -> io::Result<CommandOutput>;
}

/// Executor that runs actual system commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealCommandExecutor;

impl RealCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, cmd: &str, args: &[String]) -> io::Result<CommandOutput> {
        let output = Command::new(cmd)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_default() {
        let output = CommandOutput::default();
        assert!(output.stdout.is_empty());
        assert!(!output.success);
        assert!(output.code.is_none());
    }

    #[test]
    fn test_real_executor_success() {
        let executor = RealCommandExecutor::new();
        let output = executor
            .execute("echo", &["-n".to_string(), "hello".to_string()])
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "hello");
    }

    #[test]
    fn test_real_executor_nonzero_exit_is_ok() {
        let executor = RealCommandExecutor::new();
        let output = executor.execute("false", &[]).unwrap();
        assert!(!output.success);
        assert_eq!(output.code, Some(1));
    }

    #[test]
    fn test_real_executor_missing_binary_is_err() {
        let executor = RealCommandExecutor::new();
        assert!(executor
            .execute("/nonexistent/definitely-not-a-binary", &[])
            .is_err());
    }

    #[test]
    fn test_mock_executor() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| cmd == "firewall-cmd" && args == ["--reload".to_string()])
            .times(1)
            .returning(|_, _| {
                Ok(CommandOutput {
                    success: true,
                    code: Some(0),
                    ..Default::default()
                })
            });

        let output = mock
            .execute("firewall-cmd", &["--reload".to_string()])
            .unwrap();
        assert!(output.success);
    }
}
