//! Document batches handed to the indexing pipeline.
//!
//! A [`DocumentList`] interleaves result rows (adds) and audit events
//! (deletes) in timestamp order and moves its [`Checkpoint`] forward as
//! each [`Document`] is handed out, so the checkpoint read after a partial
//! or complete pass covers exactly what was consumed.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::warn;

use crate::checkpoint::Checkpoint;
use crate::client::{ContentFetcher, RecordSet};
use crate::date_format;
use crate::error::ConnectorError;
use crate::repository::DeleteEvent;

/// Property names.
pub mod property {
    /// Item id.
    pub const DOCID: &str = "docid";
    /// `add` or `delete`.
    pub const ACTION: &str = "action";
    /// Modification or deletion time, RFC 822.
    pub const LAST_MODIFIED: &str = "lastmodified";
    /// Display URL, when configured.
    pub const DISPLAY_URL: &str = "displayurl";
}

/// What the pipeline should do with a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Index or re-index.
    Add,
    /// Remove from the index.
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Add => write!(f, "add"),
            Action::Delete => write!(f, "delete"),
        }
    }
}

/// A document with multi-valued properties.
#[derive(Clone, Serialize)]
pub struct Document {
    id: i64,
    action: Action,
    last_modified: NaiveDateTime,
    properties: BTreeMap<String, Vec<String>>,
    #[serde(skip)]
    fetcher: Option<Arc<dyn ContentFetcher>>,
}

impl Document {
    fn new(id: i64, action: Action, last_modified: NaiveDateTime) -> Self {
        let mut doc = Self {
            id,
            action,
            last_modified,
            properties: BTreeMap::new(),
            fetcher: None,
        };
        doc.add_property(property::DOCID, id.to_string());
        doc.add_property(property::ACTION, action.to_string());
        doc.add_property(property::LAST_MODIFIED, date_format::to_rfc822(&last_modified));
        doc
    }

    /// Item id.
    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Add or delete.
    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    /// Modification time for adds, event time for deletes.
    #[must_use]
    pub fn last_modified(&self) -> NaiveDateTime {
        self.last_modified
    }

    /// All values of a property.
    #[must_use]
    pub fn property(&self, name: &str) -> &[String] {
        self.properties.get(name).map_or(&[], Vec::as_slice)
    }

    /// First value of a property.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.property(name).first().map(String::as_str)
    }

    /// Property names, sorted.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Fetches the content. Deletes and documents without a fetcher have
    /// none.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if the fetcher fails.
    pub fn content(&self) -> Result<Option<Vec<u8>>, ConnectorError> {
        match (&self.fetcher, self.action) {
            (Some(fetcher), Action::Add) => fetcher.fetch(self.id),
            _ => Ok(None),
        }
    }

    fn add_property(&mut self, name: &str, value: String) {
        self.properties
            .entry(name.to_string())
            .or_default()
            .push(value);
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("action", &self.action)
            .field("last_modified", &self.last_modified)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// An ordered batch of documents plus the checkpoint that follows it.
pub struct DocumentList {
    rows: RecordSet,
    deletes: Vec<DeleteEvent>,
    row_index: usize,
    delete_index: usize,
    checkpoint: Checkpoint,
    has_failed_row: bool,
    display_url: Option<String>,
    fetcher: Option<Arc<dyn ContentFetcher>>,
}

impl DocumentList {
    /// Creates a batch from result rows and delete events, both already
    /// in position order.
    #[must_use]
    pub fn new(rows: RecordSet, deletes: Vec<DeleteEvent>, checkpoint: Checkpoint) -> Self {
        Self {
            rows,
            deletes,
            row_index: 0,
            delete_index: 0,
            checkpoint,
            has_failed_row: false,
            display_url: None,
            fetcher: None,
        }
    }

    /// Sets the display URL pattern; `{id}` is replaced by the item id.
    #[must_use]
    pub fn with_display_url(mut self, pattern: Option<String>) -> Self {
        self.display_url = pattern;
        self
    }

    /// Sets the content fetcher handed to add documents.
    #[must_use]
    pub fn with_content_fetcher(mut self, fetcher: Option<Arc<dyn ContentFetcher>>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Total documents in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len() + self.deletes.len()
    }

    /// Whether the batch has no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Documents not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.len() - self.row_index - self.delete_index
    }

    /// Hands out the next document, moving the checkpoint past it.
    ///
    /// Adds and deletes are merged by timestamp; an add wins a tie.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ReadError` if a result row lacks a usable
    /// `DataID` or `ModifyDate`. The row is skipped, so the next call
    /// moves on, but the checkpoint is left where it was before it.
    pub fn next_document(&mut self) -> Result<Option<Document>, ConnectorError> {
        let next_row = self.rows.row(self.row_index);
        let next_delete = self.deletes.get(self.delete_index);

        let take_row = match (next_row, next_delete) {
            (None, None) => return Ok(None),
            (Some(_), None) => true,
            (None, Some(_)) => false,
            // An unusable row goes first and fails in `next_add`.
            (Some(row), Some(delete)) => row
                .date("ModifyDate")
                .map_or(true, |modified| modified <= delete.audit_date),
        };

        if take_row {
            let doc = self.next_add();
            self.row_index += 1;
            if doc.is_err() {
                self.has_failed_row = true;
            }
            doc.map(Some)
        } else {
            let doc = self.next_delete();
            self.delete_index += 1;
            Ok(doc)
        }
    }

    /// The checkpoint covering every document handed out so far.
    ///
    /// Once all adds are consumed the candidate batch is finished with,
    /// so the insert cursor jumps to the last candidate fetched even if
    /// trailing candidates were filtered out. It never jumps past a row
    /// that failed.
    pub fn checkpoint(&mut self) -> Option<String> {
        if self.row_index >= self.rows.len() && !self.has_failed_row {
            self.checkpoint.advance_to_end();
        }
        self.checkpoint.serialize()
    }

    /// The checkpoint as a value, without applying the advance position.
    #[must_use]
    pub fn current_checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    fn next_add(&mut self) -> Result<Document, ConnectorError> {
        let Some(row) = self.rows.row(self.row_index) else {
            return Err(ConnectorError::Internal("result row out of range".into()));
        };
        let (id, modified) = match (row.i64("DataID"), row.date("ModifyDate")) {
            (Ok(id), Ok(modified)) => (id, modified),
            (Err(e), _) | (_, Err(e)) => {
                warn!(row = self.row_index, error = %e, "could not build document");
                return Err(e);
            }
        };
        self.checkpoint.set_insert_checkpoint(modified, id);

        let mut doc = Document::new(id, Action::Add, modified);
        if let Some(ref pattern) = self.display_url {
            doc.add_property(property::DISPLAY_URL, pattern.replace("{id}", &id.to_string()));
        }
        for (column, value) in row.iter() {
            if !value.is_null() {
                doc.add_property(column, value.to_string());
            }
        }
        doc.fetcher.clone_from(&self.fetcher);
        Ok(doc)
    }

    fn next_delete(&mut self) -> Option<Document> {
        let event = self.deletes.get(self.delete_index)?;
        self.checkpoint
            .set_delete_checkpoint(event.audit_date, &event.event_id);
        Some(Document::new(event.data_id, Action::Delete, event.audit_date))
    }
}

impl Iterator for DocumentList {
    type Item = Result<Document, ConnectorError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_document().transpose()
    }
}

impl fmt::Debug for DocumentList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentList")
            .field("rows", &self.rows.len())
            .field("deletes", &self.deletes.len())
            .field("remaining", &self.remaining())
            .field("checkpoint", &self.checkpoint)
            .finish_non_exhaustive()
    }
}
