//! Incremental traversal.
//!
//! [`TraversalManager`] turns a checkpoint into the next batch of
//! documents. Each call runs a time-bounded loop:
//!
//! 1. Fetch up to `batch_size` insert candidates after the insert cursor,
//!    and (with delete tracking) as many delete events after the delete
//!    cursor.
//! 2. Nothing at all: caught up.
//! 3. Record the last candidate as the advance position, filter the
//!    candidates by location (ancestor-closure table or genealogist) and
//!    fetch full rows for the survivors.
//! 4. Anything to report: return it as a [`DocumentList`].
//! 5. Otherwise grow the batch tenfold (capped), commit the advance
//!    position and go again, unless the time budget is spent.
//!
//! ```text
//!   checkpoint ──► candidates ─┬─► filter ──► rows ─┬─► Documents
//!                 deletes ─────┘                    └─► grow, advance, loop
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::checkpoint::Checkpoint;
use crate::client::{ContentFetcher, RecordSet, Value};
use crate::config::LivelinkConfig;
use crate::date_format;
use crate::document::DocumentList;
use crate::error::ConnectorError;
use crate::genealogist::{Genealogist, SharedGenealogist};
use crate::metrics::TraversalMetrics;
use crate::repository::{CandidateFilter, LocationFilter, Repository};

/// Batch size used when no hint is given.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Largest batch size, for hints and for growth.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Batch size multiplier applied after a fully filtered round.
const GROWTH_FACTOR: usize = 10;

/// Result of one traversal call.
#[derive(Debug)]
pub enum TraversalOutcome {
    /// Documents to index, with the checkpoint that follows them.
    Documents(DocumentList),
    /// The time budget ran out while skipping filtered candidates. Commit
    /// the checkpoint and call again right away.
    Pending(String),
    /// Nothing new. `Some` carries a checkpoint that moved during the call
    /// and must be committed.
    CaughtUp(Option<String>),
}

impl TraversalOutcome {
    /// Whether the caller should wait before calling again.
    #[must_use]
    pub fn is_caught_up(&self) -> bool {
        matches!(self, TraversalOutcome::CaughtUp(_))
    }
}

/// How candidates are filtered by location.
enum LocationStrategy {
    /// No location filter configured.
    Unfiltered,
    /// Filter in the result query through the ancestor-closure table.
    AncestorTable(LocationFilter),
    /// Filter with the genealogist before fetching rows.
    Genealogist(SharedGenealogist),
}

/// Drives incremental traversal over a [`Repository`].
pub struct TraversalManager<R> {
    repo: R,
    config: LivelinkConfig,
    candidate_filter: CandidateFilter,
    location: LocationStrategy,
    result_columns: Vec<String>,
    batch_size: usize,
    time_budget: Duration,
    fetcher: Option<Arc<dyn ContentFetcher>>,
    metrics: Arc<TraversalMetrics>,
}

impl<R: Repository> TraversalManager<R> {
    /// Creates a manager.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConfigurationError` if the configuration is
    /// invalid, or `InvalidBatchSize` for a negative batch size.
    pub fn new(repo: R, config: LivelinkConfig) -> Result<Self, ConnectorError> {
        config.validate()?;
        let location = if !config.has_location_filter() {
            LocationStrategy::Unfiltered
        } else if config.use_dtree_ancestors {
            LocationStrategy::AncestorTable(config.location_filter())
        } else {
            LocationStrategy::Genealogist(Genealogist::from_config(&config).shared())
        };
        let mut manager = Self {
            repo,
            candidate_filter: config.candidate_filter(),
            location,
            result_columns: config.result_columns(),
            batch_size: DEFAULT_BATCH_SIZE,
            time_budget: config.batch_time,
            fetcher: None,
            metrics: Arc::new(TraversalMetrics::new()),
            config,
        };
        manager.set_batch_hint(manager.config.batch_size)?;
        Ok(manager)
    }

    /// Uses an existing genealogist instead of building one, when location
    /// filtering goes through the genealogist.
    #[must_use]
    pub fn with_genealogist(mut self, genealogist: SharedGenealogist) -> Self {
        if let LocationStrategy::Genealogist(ref mut shared) = self.location {
            *shared = genealogist;
        }
        self
    }

    /// Sets the content fetcher attached to add documents.
    #[must_use]
    pub fn with_content_fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Reports into existing metrics.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<TraversalMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Sets the batch size hint.
    ///
    /// Zero restores the default; values above [`MAX_BATCH_SIZE`] are
    /// clamped.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::InvalidBatchSize` for a negative hint.
    pub fn set_batch_hint(&mut self, hint: i64) -> Result<(), ConnectorError> {
        self.batch_size = match usize::try_from(hint) {
            Err(_) => return Err(ConnectorError::InvalidBatchSize(hint)),
            Ok(0) => DEFAULT_BATCH_SIZE,
            Ok(n) => n.min(MAX_BATCH_SIZE),
        };
        Ok(())
    }

    /// The current batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Sets the wall-clock budget for one traversal call.
    pub fn set_time_budget(&mut self, budget: Duration) {
        self.time_budget = budget;
    }

    /// The traversal metrics.
    #[must_use]
    pub fn metrics(&self) -> &Arc<TraversalMetrics> {
        &self.metrics
    }

    /// The genealogist, when location filtering uses one.
    #[must_use]
    pub fn genealogist(&self) -> Option<&SharedGenealogist> {
        match self.location {
            LocationStrategy::Genealogist(ref g) => Some(g),
            _ => None,
        }
    }

    /// The repository.
    #[must_use]
    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Starts a traversal from the configured start date.
    ///
    /// With delete tracking, the delete cursor starts at the most recent
    /// audit event so deletions that predate the first crawl are never
    /// reported.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if a repository query fails.
    pub fn start_traversal(&self) -> Result<TraversalOutcome, ConnectorError> {
        info!(start_date = ?self.config.start_date, "starting traversal");
        self.run(|| {
            let mut checkpoint = Checkpoint::new();
            if let Some(start) = self.config.start_date {
                checkpoint.set_insert_checkpoint(start, 0);
            }
            if self.config.track_deleted_items {
                self.seed_delete_checkpoint(&mut checkpoint)?;
            }
            Ok(checkpoint)
        })
    }

    /// Resumes a traversal from a checkpoint. An empty checkpoint starts
    /// over.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::MalformedCheckpoint` if the checkpoint does
    /// not parse, `ConnectionFailed` if the repository is unreachable, or
    /// any error from a repository query.
    pub fn resume_traversal(&self, checkpoint: &str) -> Result<TraversalOutcome, ConnectorError> {
        if checkpoint.trim().is_empty() {
            return self.start_traversal();
        }
        info!(checkpoint, "resuming traversal");
        self.run(|| {
            let mut parsed = Checkpoint::parse(checkpoint)?;
            self.repo.ping()?;
            if self.config.track_deleted_items && Checkpoint::is_old_style(checkpoint) {
                self.seed_delete_checkpoint(&mut parsed)?;
            }
            Ok(parsed)
        })
    }

    fn run(
        &self,
        init: impl FnOnce() -> Result<Checkpoint, ConnectorError>,
    ) -> Result<TraversalOutcome, ConnectorError> {
        self.metrics.inc_traversals();
        let result = init().and_then(|checkpoint| self.traverse(checkpoint));
        match &result {
            Ok(TraversalOutcome::Documents(list)) => {
                debug!(documents = list.len(), "traversal returned documents");
            }
            Ok(TraversalOutcome::Pending(checkpoint)) => {
                self.metrics.inc_pending();
                debug!(checkpoint, "traversal budget spent");
            }
            Ok(TraversalOutcome::CaughtUp(checkpoint)) => {
                self.metrics.inc_caught_up();
                debug!(checkpoint = ?checkpoint, "traversal caught up");
            }
            Err(_) => self.metrics.inc_errors(),
        }
        result
    }

    fn seed_delete_checkpoint(&self, checkpoint: &mut Checkpoint) -> Result<(), ConnectorError> {
        self.metrics.inc_queries(1);
        match self.repo.latest_delete_event()? {
            Some(event) => checkpoint.set_delete_checkpoint(event.audit_date, &event.event_id),
            None => checkpoint.set_delete_checkpoint(date_format::epoch(), &Value::Long(0)),
        }
        debug!(checkpoint = %checkpoint, "seeded delete checkpoint");
        Ok(())
    }

    fn traverse(&self, mut checkpoint: Checkpoint) -> Result<TraversalOutcome, ConnectorError> {
        let deadline = Instant::now() + self.time_budget;
        let mut batch_size = self.batch_size;

        loop {
            self.metrics.set_batch_size(batch_size as u64);
            let candidates = self.repo.candidates(
                checkpoint.insert_position(),
                batch_size,
                &self.candidate_filter,
            )?;
            let deletes = if self.config.track_deleted_items {
                self.metrics.inc_queries(2);
                self.repo.delete_events(
                    checkpoint.delete_position(),
                    batch_size,
                    &self.config.excluded_node_types,
                )?
            } else {
                self.metrics.inc_queries(1);
                Vec::new()
            };

            if candidates.is_empty() && deletes.is_empty() {
                let committed = if checkpoint.has_changed() {
                    checkpoint.serialize()
                } else {
                    None
                };
                return Ok(TraversalOutcome::CaughtUp(committed));
            }

            let mut rows = RecordSet::new(self.result_columns.iter().cloned());
            if let Some(last) = candidates.last() {
                checkpoint.set_advance_checkpoint(last.modify_date, last.id);
                let ids: Vec<i64> = candidates.iter().map(|c| c.id).collect();
                rows = self.fetch_rows(&ids)?;
            }
            debug!(
                batch_size,
                candidates = candidates.len(),
                deletes = deletes.len(),
                rows = rows.len(),
                "traversal round"
            );

            if !rows.is_empty() || !deletes.is_empty() {
                self.metrics
                    .record_batch(rows.len() as u64, deletes.len() as u64);
                let list = DocumentList::new(rows, deletes, checkpoint)
                    .with_display_url(self.config.display_url.clone())
                    .with_content_fetcher(self.fetcher.clone());
                return Ok(TraversalOutcome::Documents(list));
            }

            self.metrics.inc_empty_rounds();
            batch_size = (batch_size * GROWTH_FACTOR).min(MAX_BATCH_SIZE);
            checkpoint.advance_to_end();
            debug!(
                batch_size,
                checkpoint = %checkpoint,
                "every candidate filtered out; skipping ahead"
            );

            if Instant::now() >= deadline {
                return Ok(TraversalOutcome::Pending(
                    checkpoint.serialize().unwrap_or_default(),
                ));
            }
        }
    }

    /// Full rows for the candidates that pass the location filter.
    fn fetch_rows(&self, ids: &[i64]) -> Result<RecordSet, ConnectorError> {
        self.metrics.inc_queries(1);
        match self.location {
            LocationStrategy::Unfiltered => self.repo.documents(ids, &self.result_columns, None),
            LocationStrategy::AncestorTable(ref filter) => {
                self.repo.documents(ids, &self.result_columns, Some(filter))
            }
            LocationStrategy::Genealogist(ref genealogist) => {
                let matches = genealogist.lock().matching_descendants(&self.repo, ids)?;
                self.repo.documents(&matches, &self.result_columns, None)
            }
        }
    }
}

impl<R> std::fmt::Debug for TraversalManager<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraversalManager")
            .field("batch_size", &self.batch_size)
            .field("time_budget", &self.time_budget)
            .field("columns", &self.result_columns)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::ROOT_ID;
    use crate::testing::MockRepository;
    use chrono::NaiveDateTime;

    fn ts(s: &str) -> NaiveDateTime {
        date_format::parse(s).unwrap()
    }

    fn manager(repo: MockRepository, config: LivelinkConfig) -> TraversalManager<MockRepository> {
        TraversalManager::new(repo, config).unwrap()
    }

    fn no_deletes() -> LivelinkConfig {
        LivelinkConfig {
            track_deleted_items: false,
            ..LivelinkConfig::default()
        }
    }

    #[test]
    fn test_batch_hint_bounds() {
        let mut m = manager(MockRepository::new(), no_deletes());
        assert_eq!(m.batch_size(), DEFAULT_BATCH_SIZE);
        m.set_batch_hint(5000).unwrap();
        assert_eq!(m.batch_size(), MAX_BATCH_SIZE);
        m.set_batch_hint(0).unwrap();
        assert_eq!(m.batch_size(), DEFAULT_BATCH_SIZE);
        m.set_batch_hint(7).unwrap();
        assert_eq!(m.batch_size(), 7);
        assert!(matches!(
            m.set_batch_hint(-3),
            Err(ConnectorError::InvalidBatchSize(-3))
        ));
        assert_eq!(m.batch_size(), 7);

        let config = LivelinkConfig {
            batch_size: -2,
            ..no_deletes()
        };
        assert!(matches!(
            TraversalManager::new(MockRepository::new(), config),
            Err(ConnectorError::InvalidBatchSize(-2))
        ));
    }

    #[test]
    fn test_empty_repository_is_caught_up() {
        let m = manager(MockRepository::new(), no_deletes());
        let outcome = m.start_traversal().unwrap();
        assert!(matches!(outcome, TraversalOutcome::CaughtUp(None)));
    }

    #[test]
    fn test_start_date_is_committed_when_caught_up() {
        let config = LivelinkConfig {
            start_date: Some(ts("2021-01-01 00:00:00")),
            ..no_deletes()
        };
        let m = manager(MockRepository::new(), config);
        match m.start_traversal().unwrap() {
            TraversalOutcome::CaughtUp(Some(cp)) => assert_eq!(cp, "2021-01-01 00:00:00,0"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_start_date_skips_older_items() {
        let repo = MockRepository::new();
        repo.add_item(1, ROOT_ID, ts("2020-01-01 00:00:00"));
        repo.add_item(2, ROOT_ID, ts("2022-01-01 00:00:00"));
        let config = LivelinkConfig {
            start_date: Some(ts("2021-01-01 00:00:00")),
            ..no_deletes()
        };
        let m = manager(repo, config);
        let TraversalOutcome::Documents(list) = m.start_traversal().unwrap() else {
            panic!("expected documents");
        };
        let ids: Vec<i64> = list.map(|d| d.unwrap().id()).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_initial_delete_checkpoint_is_latest_event() {
        let repo = MockRepository::new();
        repo.add_delete(70, ts("2020-05-05 10:00:00"), Value::Long(800));
        repo.add_delete(71, ts("2020-05-06 10:00:00"), Value::Long(801));
        let m = manager(repo, LivelinkConfig::default());

        match m.start_traversal().unwrap() {
            TraversalOutcome::CaughtUp(Some(cp)) => {
                assert_eq!(cp, ",0,2020-05-06 10:00:00,801");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_initial_delete_checkpoint_without_events() {
        let m = manager(MockRepository::new(), LivelinkConfig::default());
        match m.start_traversal().unwrap() {
            TraversalOutcome::CaughtUp(Some(cp)) => {
                assert_eq!(cp, ",0,1970-01-01 00:00:00,0");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_deletes_after_checkpoint_are_reported() {
        let repo = MockRepository::new();
        repo.add_delete(70, ts("2020-05-05 10:00:00"), Value::Long(800));
        repo.add_delete(71, ts("2020-05-06 10:00:00"), Value::Integer(801));
        let m = manager(repo, LivelinkConfig::default());

        let outcome = m
            .resume_traversal("2020-01-01 00:00:00,0,2020-05-05 10:00:00,800")
            .unwrap();
        let TraversalOutcome::Documents(mut list) = outcome else {
            panic!("expected documents");
        };
        let doc = list.next_document().unwrap().unwrap();
        assert_eq!(doc.id(), 71);
        assert_eq!(doc.action(), crate::document::Action::Delete);
        assert!(list.next_document().unwrap().is_none());
        assert_eq!(
            list.checkpoint().as_deref(),
            Some("2020-01-01 00:00:00,0,2020-05-06 10:00:00,801")
        );
    }

    #[test]
    fn test_old_style_checkpoint_is_seeded() {
        let repo = MockRepository::new();
        repo.add_delete(70, ts("2020-05-05 10:00:00"), Value::Long(800));
        let m = manager(repo, LivelinkConfig::default());

        match m.resume_traversal("2020-01-01 00:00:00,5").unwrap() {
            TraversalOutcome::CaughtUp(Some(cp)) => {
                assert_eq!(cp, "2020-01-01 00:00:00,5,2020-05-05 10:00:00,800");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_resume_unchanged_is_caught_up_without_checkpoint() {
        let m = manager(MockRepository::new(), LivelinkConfig::default());
        let outcome = m
            .resume_traversal("2020-01-01 00:00:00,5,2020-01-01 00:00:00,3")
            .unwrap();
        assert!(matches!(outcome, TraversalOutcome::CaughtUp(None)));
    }

    #[test]
    fn test_malformed_checkpoint() {
        let m = manager(MockRepository::new(), no_deletes());
        let err = m.resume_traversal("garbage").unwrap_err();
        assert!(matches!(err, ConnectorError::MalformedCheckpoint { .. }));
        assert!(!err.is_retryable());
        assert_eq!(m.metrics().snapshot().errors, 1);
    }

    #[test]
    fn test_resume_pings() {
        let repo = MockRepository::new();
        repo.set_reachable(false);
        let m = manager(repo, no_deletes());
        let err = m.resume_traversal("2020-01-01 00:00:00,1").unwrap_err();
        assert!(matches!(err, ConnectorError::ConnectionFailed(_)));
    }

    #[test]
    fn test_empty_checkpoint_starts_over() {
        let repo = MockRepository::new();
        repo.add_item(1, ROOT_ID, ts("2020-01-01 00:00:00"));
        let m = manager(repo, no_deletes());
        assert!(matches!(
            m.resume_traversal("").unwrap(),
            TraversalOutcome::Documents(_)
        ));
    }

    #[test]
    fn test_query_failure_commits_nothing() {
        let repo = MockRepository::new();
        repo.add_item(1, ROOT_ID, ts("2020-01-01 00:00:00"));
        repo.fail_next(ConnectorError::ReadError("deadlock victim".into()));
        let m = manager(repo, no_deletes());
        let err = m.start_traversal().unwrap_err();
        assert!(err.is_retryable());

        let TraversalOutcome::Documents(list) = m.start_traversal().unwrap() else {
            panic!("expected documents");
        };
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_genealogist_filtering() {
        let repo = MockRepository::new();
        repo.add_folder(2000, ROOT_ID);
        repo.add_folder(3000, ROOT_ID);
        repo.add_item(1, 2000, ts("2020-01-01 00:00:01"));
        repo.add_item(2, 3000, ts("2020-01-01 00:00:02"));
        repo.add_item(3, 2000, ts("2020-01-01 00:00:03"));
        repo.add_item(4, 3000, ts("2020-01-01 00:00:04"));
        let config = LivelinkConfig {
            included_location_nodes: vec![2000],
            start_date: Some(ts("2020-01-01 00:00:00")),
            ..no_deletes()
        };
        let m = manager(repo, config);

        let TraversalOutcome::Documents(mut list) = m.start_traversal().unwrap() else {
            panic!("expected documents");
        };
        let ids: Vec<i64> = list.by_ref().map(|d| d.unwrap().id()).collect();
        assert_eq!(ids, vec![1, 3]);
        // Item 4 was filtered out but is still skipped.
        assert_eq!(
            list.checkpoint().as_deref(),
            Some("2020-01-01 00:00:04,4")
        );
        assert!(m.genealogist().is_some());
    }

    #[test]
    fn test_ancestor_table_filtering() {
        let repo = MockRepository::new();
        repo.add_folder(2000, ROOT_ID);
        repo.add_folder(10, 2000);
        repo.add_item(1, 10, ts("2020-01-01 00:00:01"));
        repo.add_item(2, ROOT_ID, ts("2020-01-01 00:00:02"));
        let config = LivelinkConfig {
            included_location_nodes: vec![2000],
            use_dtree_ancestors: true,
            start_date: Some(ts("2020-01-01 00:00:00")),
            ..no_deletes()
        };
        let m = manager(repo, config);
        assert!(m.genealogist().is_none());

        let TraversalOutcome::Documents(list) = m.start_traversal().unwrap() else {
            panic!("expected documents");
        };
        let ids: Vec<i64> = list.map(|d| d.unwrap().id()).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(m.repository().counts().parents, 0);
    }

    #[test]
    fn test_fully_filtered_round_grows_and_advances() {
        let repo = MockRepository::new();
        repo.add_folder(2000, ROOT_ID);
        repo.add_folder(3000, ROOT_ID);
        for id in 1..=5 {
            repo.add_item(id, 3000, ts(&format!("2020-01-01 00:00:0{id}")));
        }
        repo.add_item(6, 2000, ts("2020-01-01 00:00:06"));
        let config = LivelinkConfig {
            included_location_nodes: vec![2000],
            start_date: Some(ts("2020-01-01 00:00:00")),
            batch_size: 2,
            ..no_deletes()
        };
        let m = manager(repo, config);

        let TraversalOutcome::Documents(mut list) = m.start_traversal().unwrap() else {
            panic!("expected documents");
        };
        assert_eq!(list.next_document().unwrap().unwrap().id(), 6);
        assert_eq!(m.repository().candidate_limits(), vec![2, 20]);
        assert_eq!(m.metrics().snapshot().empty_rounds, 1);
        assert_eq!(
            list.checkpoint().as_deref(),
            Some("2020-01-01 00:00:06,6")
        );
    }

    #[test]
    fn test_fully_filtered_tail_is_caught_up_with_checkpoint() {
        let repo = MockRepository::new();
        repo.add_folder(3000, ROOT_ID);
        repo.add_item(1, 3000, ts("2020-01-01 00:00:01"));
        let config = LivelinkConfig {
            included_location_nodes: vec![2000],
            ..no_deletes()
        };
        let m = manager(repo, config);
        match m.resume_traversal("2020-01-01 00:00:00,0").unwrap() {
            TraversalOutcome::CaughtUp(Some(cp)) => assert_eq!(cp, "2020-01-01 00:00:01,1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_zero_budget_returns_pending() {
        let repo = MockRepository::new();
        repo.add_folder(3000, ROOT_ID);
        for id in 1..=3 {
            repo.add_item(id, 3000, ts(&format!("2020-01-01 00:00:0{id}")));
        }
        let config = LivelinkConfig {
            included_location_nodes: vec![2000],
            batch_size: 1,
            ..no_deletes()
        };
        let mut m = manager(repo, config);
        m.set_time_budget(Duration::ZERO);

        match m.resume_traversal("2020-01-01 00:00:00,0").unwrap() {
            TraversalOutcome::Pending(cp) => assert_eq!(cp, "2020-01-01 00:00:01,1"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(m.metrics().snapshot().pending, 1);
    }

    #[test]
    fn test_excluded_node_types_apply_to_candidates_and_deletes() {
        let repo = MockRepository::new();
        repo.add_node(1, ROOT_ID, 144, ts("2020-01-01 00:00:01"));
        repo.add_node(2, ROOT_ID, 136, ts("2020-01-01 00:00:02"));
        let config = LivelinkConfig {
            excluded_node_types: vec![136],
            start_date: Some(ts("2020-01-01 00:00:00")),
            ..no_deletes()
        };
        let m = manager(repo, config);
        let TraversalOutcome::Documents(list) = m.start_traversal().unwrap() else {
            panic!("expected documents");
        };
        let ids: Vec<i64> = list.map(|d| d.unwrap().id()).collect();
        assert_eq!(ids, vec![1]);
    }
}
