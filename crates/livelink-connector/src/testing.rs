//! Testing utilities for the traversal core.
//!
//! Provides an in-memory repository, a recording SQL client and a
//! collecting document sink, for unit tests, integration tests and dry
//! runs against a JSON fixture.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use fxhash::{FxHashMap, FxHashSet};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::checkpoint::Position;
use crate::client::{RecordSet, RepositoryClient, Value};
use crate::date_format;
use crate::document::Document;
use crate::error::ConnectorError;
use crate::queries::RenderedQuery;
use crate::repository::{
    Candidate, CandidateFilter, DeleteEvent, LocationFilter, ParentLink, Repository, ROOT_ID,
};
use crate::runtime::DocumentSink;

/// Subtype of a plain folder.
pub const FOLDER_SUBTYPE: i64 = 0;

/// Subtype of a document.
pub const DOCUMENT_SUBTYPE: i64 = 144;

/// One item in a [`MockRepository`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockNode {
    /// Item id.
    pub id: i64,
    /// Parent id; a negated volume id for the top of a volume.
    pub parent: i64,
    /// Item subtype.
    pub subtype: i64,
    /// Last modification time.
    pub modify_date: NaiveDateTime,
    /// Display name.
    pub name: String,
}

/// Calls made against a [`MockRepository`], by operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryCounts {
    /// `candidates` calls.
    pub candidates: usize,
    /// `delete_events` calls.
    pub deletes: usize,
    /// `latest_delete_event` calls.
    pub latest_delete: usize,
    /// `documents` calls.
    pub documents: usize,
    /// `parents` calls.
    pub parents: usize,
    /// `ping` calls.
    pub pings: usize,
}

#[derive(Debug)]
struct MockState {
    nodes: BTreeMap<i64, MockNode>,
    volume_rows: FxHashMap<i64, i64>,
    deletes: Vec<(DeleteEvent, i64)>,
    reachable: bool,
    failure: Option<ConnectorError>,
    counts: QueryCounts,
    candidate_limits: Vec<usize>,
}

impl MockState {
    /// Immediate parent row for `id`; negative ids are volume rows.
    fn parent(&self, id: i64) -> Option<i64> {
        if id < 0 {
            self.volume_rows.get(&id).copied()
        } else {
            self.nodes.get(&id).map(|n| n.parent)
        }
    }

    /// Parent after attaching a volume to the node that contains it.
    fn effective_parent(&self, id: i64) -> Option<i64> {
        let parent = self.parent(id)?;
        if parent == ROOT_ID {
            if let Some(step) = self.parent(-id).filter(|&p| p != ROOT_ID) {
                return Some(step);
            }
        }
        Some(parent)
    }

    /// The item and every ancestor below the root.
    fn ancestors(&self, id: i64) -> Vec<i64> {
        let mut chain = vec![id];
        let mut seen: FxHashSet<i64> = FxHashSet::default();
        seen.insert(id);
        let mut current = id;
        while let Some(parent) = self.effective_parent(current) {
            if parent == ROOT_ID || !seen.insert(parent) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// The volume an item lives in: the first negated parent, or the
    /// top-level node below the root.
    fn volume_of(&self, id: i64) -> Option<i64> {
        let mut seen: FxHashSet<i64> = FxHashSet::default();
        let mut current = id;
        while seen.insert(current) {
            let parent = self.parent(current)?;
            if parent == ROOT_ID {
                return Some(current);
            }
            if parent < 0 {
                return Some(-parent);
            }
            current = parent;
        }
        None
    }

    fn passes(&self, node: &MockNode, filter: &CandidateFilter) -> bool {
        if filter.excluded_node_types.contains(&node.subtype) {
            return false;
        }
        if filter.excluded_volume_types.is_empty() {
            return true;
        }
        let volume_type = self
            .volume_of(node.id)
            .and_then(|v| self.nodes.get(&v))
            .map(|v| v.subtype);
        !volume_type.is_some_and(|t| filter.excluded_volume_types.contains(&t))
    }

    /// Matches ancestor ids exactly, like the `DTreeAncestors` lookup.
    fn in_location(&self, id: i64, filter: &LocationFilter) -> bool {
        let ancestors = self.ancestors(id);
        let hits = |set: &[i64]| ancestors.iter().any(|a| set.contains(a));
        (filter.included.is_empty() || hits(&filter.included)) && !hits(&filter.excluded)
    }

    fn value(&self, node: &MockNode, column: &str) -> Value {
        match column {
            "DataID" => Value::Long(node.id),
            "ParentID" => Value::Long(node.parent),
            "OwnerID" => self
                .volume_of(node.id)
                .map_or(Value::Null, |v| Value::Long(-v)),
            "SubType" => Value::Long(node.subtype),
            "Name" => Value::Text(node.name.clone()),
            "ModifyDate" | "CreateDate" => Value::Date(node.modify_date),
            "MimeType" if node.subtype == DOCUMENT_SUBTYPE => {
                Value::Text("application/octet-stream".to_string())
            }
            "DataSize" => Value::Long(0),
            "UserID" => Value::Long(1000),
            _ => Value::Null,
        }
    }
}

fn fixture_date(text: &str) -> Result<NaiveDateTime, ConnectorError> {
    date_format::parse(text)
        .ok_or_else(|| ConnectorError::ConfigurationError(format!("fixture date '{text}'")))
}

fn event_position(event: &DeleteEvent) -> Position {
    Position::new(event.audit_date, event.event_id.as_i64().unwrap_or(0))
}

/// In-memory [`Repository`] over a hand-built hierarchy.
///
/// Volumes get two parent rows like the real hierarchy table: the volume
/// id under the node it is attached to, and the negated id under the root.
/// Items directly inside a volume use the negated id as their parent.
///
/// [`fail_next`](Self::fail_next) makes the next call of any operation
/// fail.
#[derive(Debug)]
pub struct MockRepository {
    state: Mutex<MockState>,
}

impl Default for MockRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                nodes: BTreeMap::new(),
                volume_rows: FxHashMap::default(),
                deletes: Vec::new(),
                reachable: true,
                failure: None,
                counts: QueryCounts::default(),
                candidate_limits: Vec::new(),
            }),
        }
    }

    /// Builds a repository from a fixture.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConfigurationError` if a fixture date does
    /// not parse.
    pub fn from_fixture(fixture: &MockFixture) -> Result<Self, ConnectorError> {
        let repo = Self::new();
        for node in &fixture.nodes {
            let modify_date = match node.modify_date {
                Some(ref s) => fixture_date(s)?,
                None => date_format::epoch(),
            };
            repo.add_node(node.id, node.parent, node.subtype, modify_date);
            if let Some(ref name) = node.name {
                repo.rename(node.id, name);
            }
            if node.volume {
                repo.state.lock().volume_rows.insert(-node.id, ROOT_ID);
            }
        }
        for delete in &fixture.deletes {
            repo.add_typed_delete(
                delete.data_id,
                delete.subtype.unwrap_or(DOCUMENT_SUBTYPE),
                fixture_date(&delete.audit_date)?,
                Value::Long(delete.event_id),
            );
        }
        Ok(repo)
    }

    /// Builds a repository from fixture JSON.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConfigurationError` if the JSON is invalid.
    pub fn from_json(json: &str) -> Result<Self, ConnectorError> {
        let fixture: MockFixture = serde_json::from_str(json)
            .map_err(|e| ConnectorError::ConfigurationError(format!("fixture: {e}")))?;
        Self::from_fixture(&fixture)
    }

    /// Adds an item of any subtype.
    pub fn add_node(&self, id: i64, parent: i64, subtype: i64, modify_date: NaiveDateTime) {
        self.state.lock().nodes.insert(
            id,
            MockNode {
                id,
                parent,
                subtype,
                modify_date,
                name: format!("item {id}"),
            },
        );
    }

    /// Adds a document.
    pub fn add_item(&self, id: i64, parent: i64, modify_date: NaiveDateTime) {
        self.add_node(id, parent, DOCUMENT_SUBTYPE, modify_date);
    }

    /// Adds a folder, last modified at the epoch.
    pub fn add_folder(&self, id: i64, parent: i64) {
        self.add_node(id, parent, FOLDER_SUBTYPE, date_format::epoch());
    }

    /// Adds a volume of `subtype` attached under `attached_to`.
    pub fn add_volume(&self, id: i64, attached_to: i64, subtype: i64) {
        self.add_node(id, attached_to, subtype, date_format::epoch());
        self.state.lock().volume_rows.insert(-id, ROOT_ID);
    }

    /// Renames an item.
    pub fn rename(&self, id: i64, name: &str) {
        if let Some(node) = self.state.lock().nodes.get_mut(&id) {
            node.name = name.to_string();
        }
    }

    /// Adds an audit-trail delete event for a document.
    pub fn add_delete(&self, data_id: i64, audit_date: NaiveDateTime, event_id: Value) {
        self.add_typed_delete(data_id, DOCUMENT_SUBTYPE, audit_date, event_id);
    }

    /// Adds an audit-trail delete event for an item of `subtype`.
    pub fn add_typed_delete(
        &self,
        data_id: i64,
        subtype: i64,
        audit_date: NaiveDateTime,
        event_id: Value,
    ) {
        let event = DeleteEvent {
            data_id,
            audit_date,
            event_id,
        };
        self.state.lock().deletes.push((event, subtype));
    }

    /// Makes `ping` fail while unreachable.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    /// Fails the next call of any operation with `error`.
    pub fn fail_next(&self, error: ConnectorError) {
        self.state.lock().failure = Some(error);
    }

    /// Calls made so far.
    #[must_use]
    pub fn counts(&self) -> QueryCounts {
        self.state.lock().counts
    }

    /// The `limit` of every `candidates` call, in order.
    #[must_use]
    pub fn candidate_limits(&self) -> Vec<usize> {
        self.state.lock().candidate_limits.clone()
    }

    fn call<T>(
        &self,
        counter: fn(&mut QueryCounts) -> &mut usize,
        op: impl FnOnce(&mut MockState) -> Result<T, ConnectorError>,
    ) -> Result<T, ConnectorError> {
        let mut state = self.state.lock();
        *counter(&mut state.counts) += 1;
        if let Some(error) = state.failure.take() {
            return Err(error);
        }
        op(&mut *state)
    }
}

impl Repository for MockRepository {
    fn candidates(
        &self,
        after: Option<Position>,
        limit: usize,
        filter: &CandidateFilter,
    ) -> Result<Vec<Candidate>, ConnectorError> {
        self.call(
            |c| &mut c.candidates,
            |state| {
                state.candidate_limits.push(limit);
                let mut found: Vec<Candidate> = state
                    .nodes
                    .values()
                    .filter(|n| state.passes(n, filter))
                    .map(|n| Candidate {
                        id: n.id,
                        modify_date: n.modify_date,
                    })
                    .filter(|c| after.map_or(true, |a| c.position() > a))
                    .collect();
                found.sort_by_key(Candidate::position);
                found.truncate(limit);
                Ok(found)
            },
        )
    }

    fn delete_events(
        &self,
        after: Option<Position>,
        limit: usize,
        excluded_node_types: &[i64],
    ) -> Result<Vec<DeleteEvent>, ConnectorError> {
        self.call(
            |c| &mut c.deletes,
            |state| {
                let mut found: Vec<DeleteEvent> = state
                    .deletes
                    .iter()
                    .filter(|(_, subtype)| !excluded_node_types.contains(subtype))
                    .map(|(e, _)| e)
                    .filter(|e| after.map_or(true, |a| event_position(e) > a))
                    .cloned()
                    .collect();
                found.sort_by_key(event_position);
                found.truncate(limit);
                Ok(found)
            },
        )
    }

    fn latest_delete_event(&self) -> Result<Option<DeleteEvent>, ConnectorError> {
        self.call(
            |c| &mut c.latest_delete,
            |state| {
                Ok(state
                    .deletes
                    .iter()
                    .map(|(e, _)| e)
                    .max_by_key(|e| event_position(e))
                    .cloned())
            },
        )
    }

    fn documents(
        &self,
        ids: &[i64],
        columns: &[String],
        ancestors: Option<&LocationFilter>,
    ) -> Result<RecordSet, ConnectorError> {
        self.call(
            |c| &mut c.documents,
            |state| {
                let mut nodes: Vec<&MockNode> = ids
                    .iter()
                    .filter_map(|id| state.nodes.get(id))
                    .filter(|n| ancestors.map_or(true, |f| state.in_location(n.id, f)))
                    .collect();
                nodes.sort_by_key(|n| (n.modify_date, n.id));
                nodes.dedup_by_key(|n| n.id);

                let mut rows = RecordSet::new(columns.iter().cloned());
                for node in nodes {
                    rows.push(columns.iter().map(|c| state.value(node, c)).collect());
                }
                Ok(rows)
            },
        )
    }

    fn parents(&self, ids: &[i64]) -> Result<Vec<ParentLink>, ConnectorError> {
        self.call(
            |c| &mut c.parents,
            |state| {
                Ok(ids
                    .iter()
                    .filter_map(|&id| state.parent(id).map(|parent| ParentLink { id, parent }))
                    .collect())
            },
        )
    }

    fn ping(&self) -> Result<(), ConnectorError> {
        self.call(
            |c| &mut c.pings,
            |state| {
                if state.reachable {
                    Ok(())
                } else {
                    Err(ConnectorError::ConnectionFailed(
                        "repository unreachable".to_string(),
                    ))
                }
            },
        )
    }
}

/// Serialized form of a [`MockRepository`].
///
/// ```json
/// {
///   "nodes": [
///     {"id": 2000, "parent": -1, "subtype": 141, "volume": true},
///     {"id": 1, "parent": 2000, "subtype": 144, "modify_date": "2020-01-01 00:00:00"}
///   ],
///   "deletes": [{"data_id": 9, "audit_date": "2020-02-01 00:00:00", "event_id": 1}]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockFixture {
    /// Items, in any order.
    #[serde(default)]
    pub nodes: Vec<FixtureNode>,
    /// Audit-trail delete events.
    #[serde(default)]
    pub deletes: Vec<FixtureDelete>,
}

/// A fixture item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureNode {
    /// Item id.
    pub id: i64,
    /// Parent id.
    pub parent: i64,
    /// Item subtype; defaults to a folder.
    #[serde(default)]
    pub subtype: i64,
    /// Last modification time; defaults to the epoch.
    #[serde(default)]
    pub modify_date: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Whether the item is a volume with its own negated-id row.
    #[serde(default)]
    pub volume: bool,
}

/// A fixture delete event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureDelete {
    /// Deleted item id.
    pub data_id: i64,
    /// Event time.
    pub audit_date: String,
    /// Event id.
    pub event_id: i64,
    /// Subtype of the deleted item; defaults to a document.
    #[serde(default)]
    pub subtype: Option<i64>,
}

#[derive(Debug, Default)]
struct RecordingState {
    results: VecDeque<RecordSet>,
    failure: Option<ConnectorError>,
    queries: Vec<RenderedQuery>,
}

/// [`RepositoryClient`] that records every query and answers from a
/// script.
///
/// Queries are answered in order from the results pushed with
/// [`push_result`](Self::push_result); once the script runs out, every
/// query matches nothing.
#[derive(Debug, Default)]
pub struct RecordingClient {
    state: Mutex<RecordingState>,
}

impl RecordingClient {
    /// Creates a client with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of a future query.
    pub fn push_result(&self, rows: RecordSet) {
        self.state.lock().results.push_back(rows);
    }

    /// Fails the next query with `error`.
    pub fn fail_next(&self, error: ConnectorError) {
        self.state.lock().failure = Some(error);
    }

    /// Every query received, in order.
    #[must_use]
    pub fn queries(&self) -> Vec<RenderedQuery> {
        self.state.lock().queries.clone()
    }
}

impl RepositoryClient for RecordingClient {
    fn query(
        &self,
        filter: &str,
        view: &str,
        columns: &[String],
    ) -> Result<RecordSet, ConnectorError> {
        let mut state = self.state.lock();
        state.queries.push(RenderedQuery {
            columns: columns.to_vec(),
            view: view.to_string(),
            filter: filter.to_string(),
        });
        if let Some(error) = state.failure.take() {
            return Err(error);
        }
        Ok(state
            .results
            .pop_front()
            .unwrap_or_else(|| RecordSet::new(columns.iter().cloned())))
    }

    fn ping(&self) -> Result<(), ConnectorError> {
        Ok(())
    }
}

/// [`DocumentSink`] that keeps every document it receives.
///
/// Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    documents: Arc<Mutex<Vec<Document>>>,
    batches: Arc<Mutex<usize>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every document received, in order.
    #[must_use]
    pub fn documents(&self) -> Vec<Document> {
        self.documents.lock().clone()
    }

    /// Ids of every document received, in order.
    #[must_use]
    pub fn ids(&self) -> Vec<i64> {
        self.documents.lock().iter().map(Document::id).collect()
    }

    /// Number of batches received.
    #[must_use]
    pub fn batches(&self) -> usize {
        *self.batches.lock()
    }
}

#[async_trait]
impl DocumentSink for MemorySink {
    async fn write_batch(&mut self, documents: Vec<Document>) -> Result<(), ConnectorError> {
        self.documents.lock().extend(documents);
        *self.batches.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        date_format::parse(s).unwrap()
    }

    #[test]
    fn test_volume_rows_and_stepparent() {
        let repo = MockRepository::new();
        repo.add_folder(2000, ROOT_ID);
        repo.add_volume(20, 2000, 202);
        repo.add_item(21, -20, ts("2020-01-01 00:00:00"));

        let links = repo.parents(&[20, -20, 21, 99]).unwrap();
        assert_eq!(
            links,
            vec![
                ParentLink { id: 20, parent: 2000 },
                ParentLink { id: -20, parent: ROOT_ID },
                ParentLink { id: 21, parent: -20 },
            ]
        );
        assert_eq!(repo.state.lock().ancestors(21), vec![21, -20, 2000]);
        assert_eq!(repo.counts().parents, 1);
    }

    #[test]
    fn test_excluded_volume_types() {
        let repo = MockRepository::new();
        repo.add_volume(20, 2000, 202);
        repo.add_item(21, -20, ts("2020-01-01 00:00:01"));
        repo.add_item(22, ROOT_ID, ts("2020-01-01 00:00:02"));
        let filter = CandidateFilter {
            excluded_node_types: vec![],
            excluded_volume_types: vec![202],
        };
        let after = Position::new(ts("2020-01-01 00:00:00"), 0);
        let ids: Vec<i64> = repo
            .candidates(Some(after), 10, &filter)
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![22]);
    }

    #[test]
    fn test_fixture() {
        let repo = MockRepository::from_json(
            r#"{
                "nodes": [
                    {"id": 2000, "parent": -1, "subtype": 141, "volume": true},
                    {"id": 1, "parent": 2000, "subtype": 144,
                     "modify_date": "2020-01-01 00:00:00", "name": "report.pdf"}
                ],
                "deletes": [{"data_id": 9, "audit_date": "2020-02-01 00:00:00", "event_id": 4}]
            }"#,
        )
        .unwrap();

        let columns = vec!["DataID".to_string(), "Name".to_string()];
        let rows = repo.documents(&[1], &columns, None).unwrap();
        assert_eq!(rows.row(0).unwrap().get("Name"), Some(&Value::Text("report.pdf".into())));

        let latest = repo.latest_delete_event().unwrap().unwrap();
        assert_eq!(latest.data_id, 9);
        assert_eq!(latest.event_id, Value::Long(4));
    }

    #[test]
    fn test_fixture_bad_date() {
        let err = MockRepository::from_json(
            r#"{"nodes": [{"id": 1, "parent": -1, "modify_date": "yesterday"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConnectorError::ConfigurationError(_)));
    }

    #[test]
    fn test_recording_client_script() {
        let client = RecordingClient::new();
        client.push_result(RecordSet::new(["a"]).with_row(vec![Value::Long(1)]));
        let columns = vec!["a".to_string()];
        assert_eq!(client.query("x=1", "T", &columns).unwrap().len(), 1);
        assert!(client.query("x=2", "T", &columns).unwrap().is_empty());
        client.fail_next(ConnectorError::ReadError("boom".into()));
        assert!(client.query("x=3", "T", &columns).is_err());
        let filters: Vec<String> = client.queries().into_iter().map(|q| q.filter).collect();
        assert_eq!(filters, vec!["x=1", "x=2", "x=3"]);
    }
}
