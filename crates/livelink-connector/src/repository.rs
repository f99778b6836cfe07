//! Typed repository operations.
//!
//! [`Repository`] is the set of queries the traversal core issues:
//! candidates and delete events after a position, full rows for a set of
//! ids, and immediate parents for the genealogist. [`SqlRepository`]
//! implements it over any [`RepositoryClient`] by rendering the
//! dialect's query templates.

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::checkpoint::Position;
use crate::client::{RecordSet, RepositoryClient, Row, Value};
use crate::config::DialectSetting;
use crate::error::ConnectorError;
use crate::queries::{keys, Dialect, RenderedQuery, SqlParam, SqlQueries};

/// Id of the repository root. Top-level volumes report it as their parent.
pub const ROOT_ID: i64 = -1;

/// An insert candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    /// Item id.
    pub id: i64,
    /// Last modification time.
    pub modify_date: NaiveDateTime,
}

impl Candidate {
    /// The candidate's cursor position.
    #[must_use]
    pub fn position(&self) -> Position {
        Position::new(self.modify_date, self.id)
    }
}

/// A delete event from the audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteEvent {
    /// Deleted item id.
    pub data_id: i64,
    /// Time of the event.
    pub audit_date: NaiveDateTime,
    /// Event id as returned by the backend; numeric kind varies.
    pub event_id: Value,
}

/// A child and its immediate parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentLink {
    /// Child id, possibly negated for a volume lookup.
    pub id: i64,
    /// Parent id.
    pub parent: i64,
}

/// Exclusions applied directly in the candidate query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateFilter {
    /// Subtypes never returned.
    pub excluded_node_types: Vec<i64>,
    /// Items inside volumes of these subtypes are never returned.
    pub excluded_volume_types: Vec<i64>,
}

/// Location filter evaluated against the ancestor-closure table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationFilter {
    /// An item must be, or descend from, one of these (empty = any).
    pub included: Vec<i64>,
    /// An item must not be, or descend from, any of these.
    pub excluded: Vec<i64>,
}

/// The repository queries the traversal core depends on.
///
/// Every listing is ordered ascending by its position and strictly after
/// `after` when one is given.
pub trait Repository: Send + Sync {
    /// Up to `limit` insert candidates ordered by `(ModifyDate, DataID)`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if the query fails.
    fn candidates(
        &self,
        after: Option<Position>,
        limit: usize,
        filter: &CandidateFilter,
    ) -> Result<Vec<Candidate>, ConnectorError>;

    /// Up to `limit` delete events ordered by `(AuditDate, EventID)`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if the query fails.
    fn delete_events(
        &self,
        after: Option<Position>,
        limit: usize,
        excluded_node_types: &[i64],
    ) -> Result<Vec<DeleteEvent>, ConnectorError>;

    /// The most recent delete event, if any.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if the query fails.
    fn latest_delete_event(&self) -> Result<Option<DeleteEvent>, ConnectorError>;

    /// Full rows for `ids` ordered by `(ModifyDate, DataID)`, optionally
    /// restricted by the ancestor-closure table.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if the query fails.
    fn documents(
        &self,
        ids: &[i64],
        columns: &[String],
        ancestors: Option<&LocationFilter>,
    ) -> Result<RecordSet, ConnectorError>;

    /// Immediate parents of `ids`. Ids with no row are absent.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if the query fails.
    fn parents(&self, ids: &[i64]) -> Result<Vec<ParentLink>, ConnectorError>;

    /// Verifies connectivity.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConnectionFailed` if the repository is
    /// unreachable.
    fn ping(&self) -> Result<(), ConnectorError>;
}

/// [`Repository`] over a SQL-speaking [`RepositoryClient`].
#[derive(Debug)]
pub struct SqlRepository<C> {
    client: C,
    queries: SqlQueries,
}

impl<C: RepositoryClient> SqlRepository<C> {
    /// Creates a repository for a known dialect.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Internal` if a built-in template is malformed.
    pub fn new(client: C, dialect: Dialect) -> Result<Self, ConnectorError> {
        Ok(Self {
            client,
            queries: SqlQueries::new(dialect)?,
        })
    }

    /// Creates a repository, probing the backend when the dialect is `auto`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Internal` if a built-in template is malformed.
    pub fn connect(client: C, setting: DialectSetting) -> Result<Self, ConnectorError> {
        let dialect = match setting {
            DialectSetting::Fixed(dialect) => dialect,
            DialectSetting::Auto => {
                let dialect = detect_dialect(&client);
                info!(%dialect, "detected SQL dialect");
                dialect
            }
        };
        Self::new(client, dialect)
    }

    /// The active dialect.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.queries.dialect()
    }

    /// The underlying client.
    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    fn run(&self, query: &RenderedQuery) -> Result<RecordSet, ConnectorError> {
        self.client.query(&query.filter, &query.view, &query.columns)
    }
}

/// Probes Oracle's `dual` view; any other backend is SQL Server.
pub fn detect_dialect<C: RepositoryClient + ?Sized>(client: &C) -> Dialect {
    match client.query_no_throw("1=1", "dual", &["sysdate".to_string()]) {
        Some(rows) if !rows.is_empty() => Dialect::Oracle,
        _ => Dialect::SqlServer,
    }
}

/// Position parameters: has-position flag, timestamp, id.
fn position_params(after: Option<Position>, millis: bool) -> [SqlParam; 3] {
    match after {
        Some(p) => [
            SqlParam::Flag(true),
            if millis {
                SqlParam::AuditDate(p.timestamp)
            } else {
                SqlParam::Date(p.timestamp)
            },
            SqlParam::Int(p.id),
        ],
        None => [SqlParam::Flag(false), SqlParam::Int(0), SqlParam::Int(0)],
    }
}

fn limit_param(limit: usize) -> SqlParam {
    SqlParam::Int(i64::try_from(limit).unwrap_or(i64::MAX))
}

fn delete_event(row: &Row<'_>) -> Result<DeleteEvent, ConnectorError> {
    Ok(DeleteEvent {
        data_id: row.i64("DataID")?,
        audit_date: row.date("AuditDate")?,
        event_id: row
            .get("EventID")
            .cloned()
            .ok_or_else(|| ConnectorError::ReadError("missing column EventID".to_string()))?,
    })
}

impl<C: RepositoryClient> Repository for SqlRepository<C> {
    fn candidates(
        &self,
        after: Option<Position>,
        limit: usize,
        filter: &CandidateFilter,
    ) -> Result<Vec<Candidate>, ConnectorError> {
        let mut params = vec![limit_param(limit)];
        params.extend(position_params(after, false));
        params.push(SqlParam::Flag(!filter.excluded_node_types.is_empty()));
        params.push(SqlParam::Ids(filter.excluded_node_types.clone()));
        params.push(SqlParam::Flag(!filter.excluded_volume_types.is_empty()));
        params.push(SqlParam::Ids(filter.excluded_volume_types.clone()));

        let rows = self.run(&self.queries.render(keys::CANDIDATES, &params)?)?;
        rows.rows()
            .map(|row| {
                Ok(Candidate {
                    id: row.i64("DataID")?,
                    modify_date: row.date("ModifyDate")?,
                })
            })
            .collect()
    }

    fn delete_events(
        &self,
        after: Option<Position>,
        limit: usize,
        excluded_node_types: &[i64],
    ) -> Result<Vec<DeleteEvent>, ConnectorError> {
        let mut params = vec![limit_param(limit)];
        params.extend(position_params(after, true));
        params.push(SqlParam::Flag(!excluded_node_types.is_empty()));
        params.push(SqlParam::Ids(excluded_node_types.to_vec()));

        let rows = self.run(&self.queries.render(keys::DELETES, &params)?)?;
        rows.rows().map(|row| delete_event(&row)).collect()
    }

    fn latest_delete_event(&self) -> Result<Option<DeleteEvent>, ConnectorError> {
        let rows = self.run(&self.queries.render(keys::LATEST_DELETE, &[])?)?;
        rows.row(0).map(|row| delete_event(&row)).transpose()
    }

    fn documents(
        &self,
        ids: &[i64],
        columns: &[String],
        ancestors: Option<&LocationFilter>,
    ) -> Result<RecordSet, ConnectorError> {
        if ids.is_empty() {
            return Ok(RecordSet::new(columns.iter().cloned()));
        }
        let fragment = match ancestors {
            Some(filter) => {
                let rendered = self.queries.render(
                    keys::ANCESTOR_FILTER,
                    &[
                        SqlParam::Flag(!filter.included.is_empty()),
                        SqlParam::Ids(filter.included.clone()),
                        SqlParam::Flag(!filter.excluded.is_empty()),
                        SqlParam::Ids(filter.excluded.clone()),
                    ],
                )?;
                rendered.filter
            }
            None => String::new(),
        };
        let query = self
            .queries
            .render(
                keys::RESULTS,
                &[
                    SqlParam::Ids(ids.to_vec()),
                    SqlParam::Flag(ancestors.is_some()),
                    SqlParam::Fragment(fragment),
                ],
            )?
            .with_columns(columns);
        self.run(&query)
    }

    fn parents(&self, ids: &[i64]) -> Result<Vec<ParentLink>, ConnectorError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = self
            .queries
            .render(keys::PARENTS, &[SqlParam::Ids(ids.to_vec())])?;
        let rows = self.run(&query)?;
        debug!(requested = ids.len(), found = rows.len(), "parent lookup");
        rows.rows()
            .map(|row| {
                Ok(ParentLink {
                    id: row.i64("DataID")?,
                    parent: row.i64("ParentID")?,
                })
            })
            .collect()
    }

    fn ping(&self) -> Result<(), ConnectorError> {
        self.client.ping()
    }
}
