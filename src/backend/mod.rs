//! Firewall rule backends.

mod firewalld;

use async_trait::async_trait;

pub use firewalld::FirewalldBackend;

use crate::error::SyncError;
use crate::rules::FirewallRule;

/// Allow-rule lifecycle operations against a firewall.
///
/// Add and remove are idempotent: ensuring presence of a rule that already
/// exists, or absence of one that doesn't, is success. `commit` makes staged
/// changes live; backends whose changes apply immediately implement it as a
/// successful no-op.
#[async_trait]
pub trait RuleBackend: Send + Sync {
    /// Whether an equivalent rule is already active.
    async fn rule_exists(&self, rule: &FirewallRule) -> Result<bool, SyncError>;

    /// Ensure the rule is present.
    async fn add_rule(&self, rule: &FirewallRule) -> Result<(), SyncError>;

    /// Ensure the rule is absent.
    async fn remove_rule(&self, rule: &FirewallRule) -> Result<(), SyncError>;

    /// Make pending rule changes take effect.
    async fn commit(&self) -> Result<(), SyncError>;

    /// Add every rule, stopping at the first failure. Rules applied before
    /// a failure are not rolled back; the caller decides how to react.
    async fn add_rules(&self, rules: &[FirewallRule]) -> Result<(), SyncError> {
        for rule in rules {
            self.add_rule(rule).await?;
        }
        Ok(())
    }

    /// Remove every rule, stopping at the first failure.
    async fn remove_rules(&self, rules: &[FirewallRule]) -> Result<(), SyncError> {
        for rule in rules {
            self.remove_rule(rule).await?;
        }
        Ok(())
    }
}

/// Check if running as root (effective UID == 0).
///
/// Manipulating firewalld rules requires root; failing early gives a
/// clearer message than a denied `firewall-cmd` call.
pub fn check_root() -> Result<(), SyncError> {
    // SAFETY: geteuid() reads the effective user ID, has no preconditions
    // and never fails.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        return Err(SyncError::Permission(
            "firewall synchronization requires root privileges, run with sudo".to_string(),
        ));
    }
    Ok(())
}
