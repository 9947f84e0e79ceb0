//! The reconciliation engine.
//!
//! One call to [`Reconciler::run`] is one pass: fetch the published ranges,
//! compare their fingerprint against the cached one, and only on a mismatch
//! replace the firewall's allow rules wholesale and persist the new
//! snapshot. Rules are regenerated from range sets each pass and never
//! diffed CIDR-by-CIDR; the provider's fingerprint already encodes "the
//! whole list changed", and add/remove are idempotent, so a wholesale
//! replace is safe to reapply.

use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::backend::RuleBackend;
use crate::error::SyncError;
use crate::source::{PublishedRanges, RangeSource};
use crate::store::{StateStore, SyncState};

/// Result of a completed pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Fingerprints matched: nothing touched.
    InSync,
    /// Rules were replaced and the new snapshot persisted.
    Updated {
        etag: String,
        rules_removed: usize,
        rules_added: usize,
    },
}

/// What a pass would do, decided from the fetched snapshot and the cached
/// baseline alone. Computing a plan never touches the backend or mutates
/// the store, so dry runs share the exact decision logic of a real pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Fingerprints match: a pass would be a no-op.
    InSync { etag: String },
    /// Fingerprints differ: a pass would replace `previous` with
    /// `published`.
    Replace {
        previous: SyncState,
        published: PublishedRanges,
    },
}

/// Drives one fetch/compare/replace/persist cycle.
///
/// Holds only transient copies of state during a pass; the store owns the
/// persisted record. The allowed-port set is fixed for the process
/// lifetime.
pub struct Reconciler<'a> {
    source: &'a dyn RangeSource,
    store: &'a dyn StateStore,
    backend: &'a dyn RuleBackend,
    ports: BTreeSet<u16>,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        source: &'a dyn RangeSource,
        store: &'a dyn StateStore,
        backend: &'a dyn RuleBackend,
        ports: BTreeSet<u16>,
    ) -> Self {
        Self {
            source,
            store,
            backend,
            ports,
        }
    }

    /// Decide what a pass would do: fetch the published snapshot, read the
    /// cached baseline and compare fingerprints.
    pub async fn plan(&self) -> Result<Plan, SyncError> {
        let published = self.source.fetch().await?;
        let previous = self.store.read()?;

        if previous.etag.as_deref() == Some(published.etag.as_str()) {
            debug!("Fingerprint {} unchanged, nothing to do", published.etag);
            return Ok(Plan::InSync {
                etag: published.etag,
            });
        }

        Ok(Plan::Replace {
            previous,
            published,
        })
    }

    /// Rules a plan would remove and add, honoring the first-run skip.
    pub fn preview(&self, plan: &Plan) -> (usize, usize) {
        match plan {
            Plan::InSync { .. } => (0, 0),
            Plan::Replace {
                previous,
                published,
            } => {
                let removed = if previous.is_first_run() {
                    0
                } else {
                    previous.ipv4_ranges().expand(&self.ports).len()
                        + previous.ipv6_ranges().expand(&self.ports).len()
                };
                let added = published.ipv4.expand(&self.ports).len()
                    + published.ipv6.expand(&self.ports).len();
                (removed, added)
            }
        }
    }

    /// Run a single reconciliation pass.
    ///
    /// Any failure aborts the pass immediately and leaves the store
    /// untouched, so the next pass retries the same transition from the
    /// same baseline. A failure after some rules were applied but before
    /// the reload can leave the live firewall mixed until that retry; the
    /// idempotent backend operations make the reapply safe.
    pub async fn run(&self) -> Result<Outcome, SyncError> {
        let (previous, published) = match self.plan().await? {
            Plan::InSync { .. } => return Ok(Outcome::InSync),
            Plan::Replace {
                previous,
                published,
            } => (previous, published),
        };

        info!(
            "Fingerprint changed ({} -> {}), replacing allow rules",
            previous.etag.as_deref().unwrap_or("none"),
            published.etag
        );

        let rules_removed = self.remove_previous(&previous).await?;
        let rules_added = self.apply_published(&published).await?;
        self.backend.commit().await?;

        let new_state = SyncState::new(
            published.etag.clone(),
            published.ipv4.cidrs().clone(),
            published.ipv6.cidrs().clone(),
        );
        self.store.write(&new_state)?;

        info!(
            "Replaced {} rules with {} rules for snapshot {}",
            rules_removed, rules_added, published.etag
        );

        Ok(Outcome::Updated {
            etag: published.etag,
            rules_removed,
            rules_added,
        })
    }

    /// Remove the rules derived from the previously applied snapshot.
    /// Skipped entirely on the first run: an absent fingerprint means there
    /// is no baseline to tear down.
    async fn remove_previous(&self, previous: &SyncState) -> Result<usize, SyncError> {
        if previous.is_first_run() {
            debug!("First run, no previous rules to remove");
            return Ok(0);
        }

        let v4 = previous.ipv4_ranges().expand(&self.ports);
        let v6 = previous.ipv6_ranges().expand(&self.ports);
        self.backend.remove_rules(&v4).await?;
        self.backend.remove_rules(&v6).await?;
        Ok(v4.len() + v6.len())
    }

    async fn apply_published(&self, published: &PublishedRanges) -> Result<usize, SyncError> {
        let v4 = published.ipv4.expand(&self.ports);
        let v6 = published.ipv6.expand(&self.ports);
        self.backend.add_rules(&v4).await?;
        self.backend.add_rules(&v6).await?;
        Ok(v4.len() + v6.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{BackendCall, FailOn, RecordingBackend};
    use crate::rules::{FirewallRule, IpVersion, RangeSet};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Source double returning a fixed snapshot or a fixed error.
    struct StaticSource {
        result: Result<PublishedRanges, SyncError>,
    }

    impl StaticSource {
        fn returning(ranges: PublishedRanges) -> Self {
            Self { result: Ok(ranges) }
        }

        fn failing(err: SyncError) -> Self {
            Self { result: Err(err) }
        }
    }

    #[async_trait]
    impl RangeSource for StaticSource {
        async fn fetch(&self) -> Result<PublishedRanges, SyncError> {
            match &self.result {
                Ok(ranges) => Ok(ranges.clone()),
                Err(SyncError::SourceUnavailable(msg)) => {
                    Err(SyncError::SourceUnavailable(msg.clone()))
                }
                Err(_) => Err(SyncError::SourceMalformed("test".to_string())),
            }
        }
    }

    /// In-memory store that counts reads and records writes.
    #[derive(Default)]
    struct MemoryStore {
        state: Mutex<SyncState>,
        writes: Mutex<Vec<SyncState>>,
    }

    impl MemoryStore {
        fn with_state(state: SyncState) -> Self {
            Self {
                state: Mutex::new(state),
                writes: Mutex::new(Vec::new()),
            }
        }

        fn writes(&self) -> Vec<SyncState> {
            self.writes.lock().unwrap().clone()
        }
    }

    impl StateStore for MemoryStore {
        fn read(&self) -> Result<SyncState, SyncError> {
            Ok(self.state.lock().unwrap().clone())
        }

        fn write(&self, state: &SyncState) -> Result<(), SyncError> {
            *self.state.lock().unwrap() = state.clone();
            self.writes.lock().unwrap().push(state.clone());
            Ok(())
        }
    }

    fn ports() -> BTreeSet<u16> {
        [443u16].into_iter().collect()
    }

    fn published(etag: &str, v4: &[&str], v6: &[&str]) -> PublishedRanges {
        PublishedRanges {
            etag: etag.to_string(),
            ipv4: RangeSet::new(IpVersion::V4, v4.iter().copied()),
            ipv6: RangeSet::new(IpVersion::V6, v6.iter().copied()),
        }
    }

    fn state(etag: &str, v4: &[&str], v6: &[&str]) -> SyncState {
        SyncState::new(
            etag.to_string(),
            v4.iter().map(|s| s.to_string()).collect(),
            v6.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn add(cidr: &str, version: IpVersion) -> BackendCall {
        BackendCall::Add(FirewallRule {
            cidr: cidr.to_string(),
            version,
            port: 443,
        })
    }

    fn remove(cidr: &str, version: IpVersion) -> BackendCall {
        BackendCall::Remove(FirewallRule {
            cidr: cidr.to_string(),
            version,
            port: 443,
        })
    }

    #[tokio::test]
    async fn test_first_run_adds_without_removing() {
        // Scenario A: empty store, one fetched v4 range
        let source = StaticSource::returning(published("abc", &["1.1.1.0/24"], &[]));
        let store = MemoryStore::default();
        let backend = RecordingBackend::new();

        let reconciler = Reconciler::new(&source, &store, &backend, ports());
        let outcome = reconciler.run().await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Updated {
                etag: "abc".to_string(),
                rules_removed: 0,
                rules_added: 1,
            }
        );
        assert_eq!(
            backend.calls(),
            vec![add("1.1.1.0/24", IpVersion::V4), BackendCall::Commit]
        );
        assert_eq!(store.writes(), vec![state("abc", &["1.1.1.0/24"], &[])]);
    }

    #[tokio::test]
    async fn test_matching_fingerprint_is_noop() {
        // Scenario B: cached and fetched fingerprints agree
        let source = StaticSource::returning(published("abc", &["1.1.1.0/24"], &[]));
        let store = MemoryStore::with_state(state("abc", &["1.1.1.0/24"], &[]));
        let backend = RecordingBackend::new();

        let reconciler = Reconciler::new(&source, &store, &backend, ports());
        let outcome = reconciler.run().await.unwrap();

        assert_eq!(outcome, Outcome::InSync);
        assert!(backend.calls().is_empty());
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_changed_fingerprint_replaces_rules() {
        // Scenario C: remove old, add new, commit, persist
        let source = StaticSource::returning(published("xyz", &["2.2.2.0/24"], &[]));
        let store = MemoryStore::with_state(state("abc", &["1.1.1.0/24"], &[]));
        let backend = RecordingBackend::new();

        let reconciler = Reconciler::new(&source, &store, &backend, ports());
        let outcome = reconciler.run().await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Updated {
                etag: "xyz".to_string(),
                rules_removed: 1,
                rules_added: 1,
            }
        );
        assert_eq!(
            backend.calls(),
            vec![
                remove("1.1.1.0/24", IpVersion::V4),
                add("2.2.2.0/24", IpVersion::V4),
                BackendCall::Commit,
            ]
        );
        assert_eq!(store.writes(), vec![state("xyz", &["2.2.2.0/24"], &[])]);
    }

    #[tokio::test]
    async fn test_removal_order_v4_then_v6_then_adds() {
        let source = StaticSource::returning(published(
            "new",
            &["3.3.3.0/24"],
            &["2606:4700::/32"],
        ));
        let store = MemoryStore::with_state(state(
            "old",
            &["1.1.1.0/24"],
            &["2400:cb00::/32"],
        ));
        let backend = RecordingBackend::new();

        let reconciler = Reconciler::new(&source, &store, &backend, ports());
        reconciler.run().await.unwrap();

        assert_eq!(
            backend.calls(),
            vec![
                remove("1.1.1.0/24", IpVersion::V4),
                remove("2400:cb00::/32", IpVersion::V6),
                add("3.3.3.0/24", IpVersion::V4),
                add("2606:4700::/32", IpVersion::V6),
                BackendCall::Commit,
            ]
        );
    }

    #[tokio::test]
    async fn test_port_set_expands_rules() {
        let source = StaticSource::returning(published("abc", &["1.1.1.0/24"], &[]));
        let store = MemoryStore::default();
        let backend = RecordingBackend::new();

        let reconciler = Reconciler::new(
            &source,
            &store,
            &backend,
            [80u16, 443u16].into_iter().collect(),
        );
        let outcome = reconciler.run().await.unwrap();

        assert!(matches!(outcome, Outcome::Updated { rules_added: 2, .. }));
        let calls = backend.calls();
        assert_eq!(calls.len(), 3); // two adds and a commit
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_untouched() {
        let source =
            StaticSource::failing(SyncError::SourceUnavailable("connection refused".into()));
        let store = MemoryStore::with_state(state("abc", &["1.1.1.0/24"], &[]));
        let backend = RecordingBackend::new();

        let reconciler = Reconciler::new(&source, &store, &backend, ports());
        let err = reconciler.run().await.unwrap_err();

        assert!(matches!(err, SyncError::SourceUnavailable(_)));
        assert!(backend.calls().is_empty());
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_add_failure_aborts_without_write() {
        let source = StaticSource::returning(published("xyz", &["2.2.2.0/24"], &[]));
        let store = MemoryStore::with_state(state("abc", &["1.1.1.0/24"], &[]));
        let backend = RecordingBackend::failing_on(FailOn::Add);

        let reconciler = Reconciler::new(&source, &store, &backend, ports());
        let err = reconciler.run().await.unwrap_err();

        assert!(matches!(err, SyncError::BackendRejected(_)));
        // The old rule was already removed; that mixed state is accepted
        // and healed by the next successful pass.
        assert_eq!(backend.calls(), vec![remove("1.1.1.0/24", IpVersion::V4)]);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_remove_failure_aborts_without_write() {
        let source = StaticSource::returning(published("xyz", &["2.2.2.0/24"], &[]));
        let store = MemoryStore::with_state(state("abc", &["1.1.1.0/24"], &[]));
        let backend = RecordingBackend::failing_on(FailOn::Remove);

        let reconciler = Reconciler::new(&source, &store, &backend, ports());
        let err = reconciler.run().await.unwrap_err();

        assert!(matches!(err, SyncError::BackendUnavailable(_)));
        assert!(backend.calls().is_empty());
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_commit_failure_aborts_without_write() {
        let source = StaticSource::returning(published("xyz", &["2.2.2.0/24"], &[]));
        let store = MemoryStore::with_state(state("abc", &["1.1.1.0/24"], &[]));
        let backend = RecordingBackend::failing_on(FailOn::Commit);

        let reconciler = Reconciler::new(&source, &store, &backend, ports());
        let err = reconciler.run().await.unwrap_err();

        assert!(matches!(err, SyncError::BackendUnavailable(_)));
        assert!(store.writes().is_empty());
        // Rules were replaced but the reload never happened
        assert_eq!(
            backend.calls(),
            vec![
                remove("1.1.1.0/24", IpVersion::V4),
                add("2.2.2.0/24", IpVersion::V4),
            ]
        );
    }

    #[tokio::test]
    async fn test_retry_after_failure_uses_same_baseline() {
        let store = MemoryStore::with_state(state("abc", &["1.1.1.0/24"], &[]));

        // First pass fails at commit, store keeps the old baseline
        {
            let source = StaticSource::returning(published("xyz", &["2.2.2.0/24"], &[]));
            let backend = RecordingBackend::failing_on(FailOn::Commit);
            let reconciler = Reconciler::new(&source, &store, &backend, ports());
            assert!(reconciler.run().await.is_err());
        }

        // Second pass sees the same mismatch and replays the transition
        let source = StaticSource::returning(published("xyz", &["2.2.2.0/24"], &[]));
        let backend = RecordingBackend::new();
        let reconciler = Reconciler::new(&source, &store, &backend, ports());
        let outcome = reconciler.run().await.unwrap();

        assert!(matches!(outcome, Outcome::Updated { .. }));
        assert_eq!(
            backend.calls(),
            vec![
                remove("1.1.1.0/24", IpVersion::V4),
                add("2.2.2.0/24", IpVersion::V4),
                BackendCall::Commit,
            ]
        );
        assert_eq!(store.writes(), vec![state("xyz", &["2.2.2.0/24"], &[])]);
    }

    #[tokio::test]
    async fn test_plan_in_sync_matches_noop_run() {
        let source = StaticSource::returning(published("abc", &["1.1.1.0/24"], &[]));
        let store = MemoryStore::with_state(state("abc", &["1.1.1.0/24"], &[]));
        let backend = RecordingBackend::new();

        let reconciler = Reconciler::new(&source, &store, &backend, ports());
        let plan = reconciler.plan().await.unwrap();

        assert_eq!(
            plan,
            Plan::InSync {
                etag: "abc".to_string()
            }
        );
        assert_eq!(reconciler.preview(&plan), (0, 0));
        assert!(backend.calls().is_empty());
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_plan_replace_previews_run_counts() {
        let source = StaticSource::returning(published(
            "xyz",
            &["2.2.2.0/24"],
            &["2606:4700::/32"],
        ));
        let store = MemoryStore::with_state(state("abc", &["1.1.1.0/24"], &[]));
        let backend = RecordingBackend::new();

        let reconciler = Reconciler::new(&source, &store, &backend, ports());
        let plan = reconciler.plan().await.unwrap();

        // Planning decides without mutating anything
        assert!(backend.calls().is_empty());
        assert!(store.writes().is_empty());
        assert_eq!(reconciler.preview(&plan), (1, 2));

        // The counts a real pass reports agree with the preview
        let outcome = reconciler.run().await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Updated {
                etag: "xyz".to_string(),
                rules_removed: 1,
                rules_added: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_plan_first_run_previews_no_removals() {
        let source = StaticSource::returning(published("abc", &["1.1.1.0/24"], &[]));
        let store = MemoryStore::default();
        let backend = RecordingBackend::new();

        let reconciler = Reconciler::new(&source, &store, &backend, ports());
        let plan = reconciler.plan().await.unwrap();

        assert!(matches!(plan, Plan::Replace { .. }));
        assert_eq!(reconciler.preview(&plan), (0, 1));
    }

    #[tokio::test]
    async fn test_empty_published_set_clears_rules() {
        // Provider publishing an empty list still replaces the baseline
        let source = StaticSource::returning(published("empty", &[], &[]));
        let store = MemoryStore::with_state(state("abc", &["1.1.1.0/24"], &[]));
        let backend = RecordingBackend::new();

        let reconciler = Reconciler::new(&source, &store, &backend, ports());
        let outcome = reconciler.run().await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Updated {
                etag: "empty".to_string(),
                rules_removed: 1,
                rules_added: 0,
            }
        );
        assert_eq!(
            backend.calls(),
            vec![remove("1.1.1.0/24", IpVersion::V4), BackendCall::Commit]
        );
        assert_eq!(store.writes(), vec![state("empty", &[], &[])]);
    }
}
