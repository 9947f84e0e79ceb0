//! firewalld backend implementation.
//!
//! Drives `firewall-cmd` rich rules. Add/remove operate on the permanent
//! configuration by default, so changes only go live on `commit` (a
//! `--reload`). In runtime mode rules apply immediately and `commit` is a
//! no-op: a reload would restore the permanent configuration and discard
//! them.

use async_trait::async_trait;
use tracing::{debug, info};

use super::RuleBackend;
use crate::cmd::{CommandExecutor, CommandOutput, RealCommandExecutor};
use crate::error::SyncError;
use crate::rules::FirewallRule;

const FIREWALL_CMD: &str = "firewall-cmd";

/// firewalld answers a `--query-rich-rule` miss with exit code 1.
const QUERY_NO_EXIT_CODE: i32 = 1;

/// firewalld backend configured with a zone and permanence flag.
pub struct FirewalldBackend<E: CommandExecutor = RealCommandExecutor> {
    executor: E,
    zone: String,
    permanent: bool,
}

impl FirewalldBackend<RealCommandExecutor> {
    pub fn new(zone: impl Into<String>, permanent: bool) -> Self {
        Self::with_executor(RealCommandExecutor::new(), zone, permanent)
    }
}

impl<E: CommandExecutor> FirewalldBackend<E> {
    pub fn with_executor(executor: E, zone: impl Into<String>, permanent: bool) -> Self {
        Self {
            executor,
            zone: zone.into(),
            permanent,
        }
    }

    /// Build the argument vector for one rich-rule operation.
    fn rule_args(&self, verb: &str, rule: &FirewallRule) -> Vec<String> {
        let mut args = Vec::with_capacity(3);
        if self.permanent {
            args.push("--permanent".to_string());
        }
        args.push(format!("--zone={}", self.zone));
        args.push(format!("--{}-rich-rule={}", verb, rule.rich_rule()));
        args
    }

    fn run(&self, args: &[String]) -> Result<CommandOutput, SyncError> {
        debug!("firewall-cmd {}", args.join(" "));
        self.executor
            .execute(FIREWALL_CMD, args)
            .map_err(|e| SyncError::BackendUnavailable(format!("{}: {}", FIREWALL_CMD, e)))
    }
}

/// Map a failed `firewall-cmd` invocation to the right error kind.
fn classify_failure(output: &CommandOutput) -> SyncError {
    let detail = if output.stderr.trim().is_empty() {
        output.stdout.trim().to_string()
    } else {
        output.stderr.trim().to_string()
    };

    if detail.contains("INVALID_") {
        SyncError::BackendRejected(detail)
    } else {
        SyncError::BackendUnavailable(format!(
            "{} exited with {:?}: {}",
            FIREWALL_CMD, output.code, detail
        ))
    }
}

/// Whether the combined output mentions a firewalld warning code.
fn output_mentions(output: &CommandOutput, code: &str) -> bool {
    output.stdout.contains(code) || output.stderr.contains(code)
}

#[async_trait]
impl<E: CommandExecutor> RuleBackend for FirewalldBackend<E> {
    async fn rule_exists(&self, rule: &FirewallRule) -> Result<bool, SyncError> {
        let output = self.run(&self.rule_args("query", rule))?;
        if output.success {
            return Ok(true);
        }
        // "no" is a clean miss, everything else is a control-plane failure
        if output.code == Some(QUERY_NO_EXIT_CODE) {
            return Ok(false);
        }
        Err(classify_failure(&output))
    }

    async fn add_rule(&self, rule: &FirewallRule) -> Result<(), SyncError> {
        let output = self.run(&self.rule_args("add", rule))?;
        if output.success || output_mentions(&output, "ALREADY_ENABLED") {
            debug!("Allowed {}", rule);
            return Ok(());
        }
        Err(classify_failure(&output))
    }

    async fn remove_rule(&self, rule: &FirewallRule) -> Result<(), SyncError> {
        let output = self.run(&self.rule_args("remove", rule))?;
        if output.success || output_mentions(&output, "NOT_ENABLED") {
            debug!("Disallowed {}", rule);
            return Ok(());
        }
        Err(classify_failure(&output))
    }

    async fn commit(&self) -> Result<(), SyncError> {
        // Runtime rules are live as soon as they are added; a reload would
        // restore the permanent configuration and drop them.
        if !self.permanent {
            debug!("Runtime mode, rules already live, skipping reload");
            return Ok(());
        }
        let output = self.run(&["--reload".to_string()])?;
        if output.success {
            info!("Reloaded firewalld");
            return Ok(());
        }
        Err(classify_failure(&output))
    }
}
