//! Dialect-specific query templates.
//!
//! The logical queries issued by the traversal engine are the same on
//! every backend, but date literals, row limiting and millisecond audit
//! timestamps are not. Each [`Dialect`] registers a table of named
//! [`QueryTemplate`]s (select list, view expression, filter), written in
//! the small pattern language of [`template`], and [`SqlQueries::render`]
//! turns a template key plus positional [`SqlParam`]s into a
//! [`RenderedQuery`].
//!
//! # Module Structure
//!
//! - `template` - Pattern parsing and rendering
//! - `sqlserver` - `TOP n` template table
//! - `oracle` - `ROWNUM` template table

pub mod oracle;
pub mod sqlserver;
pub mod template;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::date_format;
use crate::error::ConnectorError;

use self::template::Pattern;

/// Template keys.
pub mod keys {
    /// Insert candidates after a position, ordered by `(ModifyDate, DataID)`.
    ///
    /// Parameters: `{0}` limit, `{1}` has-position flag, `{2}` modify date,
    /// `{3}` data id, `{4}` node-type filter flag, `{5}` excluded node
    /// types, `{6}` volume filter flag, `{7}` excluded volume types.
    pub const CANDIDATES: &str = "traversal.candidates";

    /// Delete events after a position, ordered by `(AuditDate, EventID)`.
    ///
    /// Parameters: `{0}` limit, `{1}` has-position flag, `{2}` audit date,
    /// `{3}` event id, `{4}` node-type filter flag, `{5}` excluded node types.
    pub const DELETES: &str = "traversal.deletes";

    /// The most recent delete event. No parameters.
    pub const LATEST_DELETE: &str = "traversal.latest_delete";

    /// Full rows for a set of ids.
    ///
    /// Parameters: `{0}` ids, `{1}` ancestor filter flag, `{2}` ancestor
    /// filter fragment (see [`ANCESTOR_FILTER`]). The select list is
    /// supplied by the caller.
    pub const RESULTS: &str = "traversal.results";

    /// Ancestor-closure-table predicate fragment.
    ///
    /// Parameters: `{0}` has-included flag, `{1}` included ids, `{2}`
    /// has-excluded flag, `{3}` excluded ids.
    pub const ANCESTOR_FILTER: &str = "hierarchy.ancestor_filter";

    /// Immediate parents of a set of nodes. Parameters: `{0}` ids.
    pub const PARENTS: &str = "hierarchy.parents";
}

/// SQL backend dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Microsoft SQL Server (`TOP n`).
    SqlServer,
    /// Oracle (`ROWNUM` over an ordered subquery).
    Oracle,
}

impl Dialect {
    /// Renders a second-resolution date literal.
    #[must_use]
    pub fn date_literal(self, ts: &NaiveDateTime) -> String {
        match self {
            Dialect::SqlServer => format!("'{}'", date_format::to_sql_string(ts)),
            Dialect::Oracle => format!(
                "TO_DATE('{}', 'YYYY-MM-DD\"T\"HH24:MI:SS')",
                date_format::to_sql_string(ts)
            ),
        }
    }

    /// Renders a literal for audit timestamps, keeping the full fraction.
    #[must_use]
    pub fn millis_literal(self, ts: &NaiveDateTime) -> String {
        match self {
            Dialect::SqlServer => format!("'{}'", date_format::to_sql_millis_string(ts)),
            Dialect::Oracle => format!(
                "TO_TIMESTAMP('{}', 'YYYY-MM-DD\"T\"HH24:MI:SS.FF')",
                date_format::to_sql_millis_string(ts)
            ),
        }
    }

    fn templates(self) -> &'static [(&'static str, QueryTemplate)] {
        match self {
            Dialect::SqlServer => sqlserver::TEMPLATES,
            Dialect::Oracle => oracle::TEMPLATES,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::SqlServer => write!(f, "SQL Server"),
            Dialect::Oracle => write!(f, "Oracle"),
        }
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlserver" | "mssql" | "sql-server" => Ok(Dialect::SqlServer),
            "oracle" => Ok(Dialect::Oracle),
            other => Err(format!("unknown SQL dialect: {other}")),
        }
    }
}

/// A positional template parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// Integer literal.
    Int(i64),
    /// Comma-separated integer list, for `in (...)`.
    Ids(Vec<i64>),
    /// Second-resolution date literal.
    Date(NaiveDateTime),
    /// Millisecond-resolution audit date literal.
    AuditDate(NaiveDateTime),
    /// Choice selector; renders as `0`/`1` when used directly.
    Flag(bool),
    /// Trusted SQL fragment, inserted verbatim.
    Fragment(String),
}

impl SqlParam {
    /// Renders the parameter for a dialect.
    #[must_use]
    pub fn render(&self, dialect: Dialect) -> String {
        match self {
            SqlParam::Int(v) => v.to_string(),
            SqlParam::Ids(ids) => join_ids(ids),
            SqlParam::Date(ts) => dialect.date_literal(ts),
            SqlParam::AuditDate(ts) => dialect.millis_literal(ts),
            SqlParam::Flag(b) => u8::from(*b).to_string(),
            SqlParam::Fragment(s) => s.clone(),
        }
    }

    /// Interprets the parameter as a choice selector.
    #[must_use]
    pub fn selector(&self) -> Option<bool> {
        match self {
            SqlParam::Flag(b) => Some(*b),
            SqlParam::Int(0) => Some(false),
            SqlParam::Int(1) => Some(true),
            _ => None,
        }
    }
}

/// Joins ids as `1,2,3`.
#[must_use]
pub fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// A named query: select list, view expression and filter, each a pattern.
///
/// An empty select list means the caller supplies the columns.
#[derive(Debug, Clone, Copy)]
pub struct QueryTemplate {
    /// Select-list column patterns.
    pub select: &'static [&'static str],
    /// View or subquery pattern.
    pub view: &'static str,
    /// Filter (`where` clause body) pattern.
    pub filter: &'static str,
}

/// A rendered query, ready for [`RepositoryClient::query`](crate::client::RepositoryClient::query).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedQuery {
    /// Select-list columns.
    pub columns: Vec<String>,
    /// View expression.
    pub view: String,
    /// Filter expression.
    pub filter: String,
}

impl RenderedQuery {
    /// Replaces the select list.
    #[must_use]
    pub fn with_columns(mut self, columns: &[String]) -> Self {
        self.columns = columns.to_vec();
        self
    }
}

impl fmt::Display for RenderedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "select {} from {} where {}",
            self.columns.join(", "),
            self.view,
            self.filter
        )
    }
}

#[derive(Debug)]
struct CompiledTemplate {
    select: Vec<Pattern>,
    view: Pattern,
    filter: Pattern,
}

/// The template registry for one dialect.
#[derive(Debug)]
pub struct SqlQueries {
    dialect: Dialect,
    templates: HashMap<&'static str, CompiledTemplate>,
}

impl SqlQueries {
    /// Builds the registry for a dialect, parsing every pattern.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Internal` if a built-in pattern is malformed.
    pub fn new(dialect: Dialect) -> Result<Self, ConnectorError> {
        Self::with_templates(dialect, dialect.templates())
    }

    /// Builds a registry from an explicit template table.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Internal` if a pattern is malformed.
    pub fn with_templates(
        dialect: Dialect,
        table: &[(&'static str, QueryTemplate)],
    ) -> Result<Self, ConnectorError> {
        let compile = |key: &str, text: &str| {
            Pattern::parse(text)
                .map_err(|e| ConnectorError::Internal(format!("template {key}: {e}")))
        };
        let mut templates = HashMap::with_capacity(table.len());
        for &(key, t) in table {
            let compiled = CompiledTemplate {
                select: t
                    .select
                    .iter()
                    .map(|&c| compile(key, c))
                    .collect::<Result<_, _>>()?,
                view: compile(key, t.view)?,
                filter: compile(key, t.filter)?,
            };
            templates.insert(key, compiled);
        }
        Ok(Self { dialect, templates })
    }

    /// The active dialect.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Whether a template is registered under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.templates.contains_key(key)
    }

    /// Renders a template.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::UnknownTemplate` if `key` is not registered
    /// for the active dialect, or `ConnectorError::TemplateParameter` if a
    /// pattern references a parameter beyond `params` or a choice selector
    /// is not `0`/`1`.
    pub fn render(&self, key: &str, params: &[SqlParam]) -> Result<RenderedQuery, ConnectorError> {
        let template = self
            .templates
            .get(key)
            .ok_or_else(|| ConnectorError::UnknownTemplate {
                key: key.to_string(),
                dialect: self.dialect.to_string(),
            })?;

        let param_err = |message: String| ConnectorError::TemplateParameter {
            key: key.to_string(),
            message,
        };
        let columns = template
            .select
            .iter()
            .map(|p| p.render(params, self.dialect))
            .collect::<Result<Vec<_>, _>>()
            .map_err(param_err)?;
        let view = template
            .view
            .render(params, self.dialect)
            .map_err(param_err)?;
        let filter = template
            .filter
            .render(params, self.dialect)
            .map_err(param_err)?;

        let query = RenderedQuery {
            columns,
            view,
            filter,
        };
        debug!(key, query = %query, "rendered query");
        Ok(query)
    }
}
