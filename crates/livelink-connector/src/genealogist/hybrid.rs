//! Batched first-hop resolution.
//!
//! Shallow hierarchies resolve most candidates one level up. Fetching that
//! level for the whole batch in a single query, and walking node by node
//! only from there, trades one wide query for many narrow ones.

use fxhash::FxHashMap;

use super::{effective_parent, orphaned, parent_map, Genealogist};
use crate::error::ConnectorError;
use crate::repository::Repository;

impl Genealogist {
    pub(super) fn classify_batch<R: Repository + ?Sized>(
        &mut self,
        repo: &R,
        candidates: &[i64],
    ) -> Result<Vec<i64>, ConnectorError> {
        let mut verdicts: FxHashMap<i64, bool> = FxHashMap::default();
        let mut pending: Vec<i64> = Vec::new();
        for &id in candidates {
            if verdicts.contains_key(&id) || pending.contains(&id) {
                continue;
            }
            match self.lookup(id) {
                Some(verdict) => {
                    verdicts.insert(id, verdict);
                }
                None => pending.push(id),
            }
        }

        if !pending.is_empty() {
            let ids: Vec<i64> = pending.iter().flat_map(|&id| [id, -id]).collect();
            let parents = parent_map(&self.fetch_parents(repo, &ids)?);
            for id in pending {
                let verdict = match effective_parent(&parents, id) {
                    Some(parent) => self.walk(repo, id, parent)?,
                    None => orphaned(id, id),
                };
                verdicts.insert(id, verdict);
            }
        }

        Ok(candidates
            .iter()
            .copied()
            .filter(|id| verdicts.get(id).copied().unwrap_or(false))
            .collect())
    }
}
