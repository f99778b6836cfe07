//! Ancestor-chain classification.
//!
//! A [`Genealogist`] decides which candidate items descend from an
//! included location node and from no excluded one, by walking parent
//! links upward until it reaches a node whose verdict is known.
//!
//! ## Sign convention
//!
//! Container nodes (projects, discussions and other volumes) are stored
//! twice in the hierarchy table: once under their own id and once under
//! the negated id, and their children report the negated id as parent.
//! Every configured location id `n` is therefore matched as both `n` and
//! `-n`. A negated volume row has the repository root as its parent; its
//! real location is the parent of the positive row, the stepparent.
//!
//! ## Memoization
//!
//! Two bounded LRU caches remember the verdict for every intermediate
//! ancestor visited on the way to a known node. Orphaned chains (a node
//! with no hierarchy row) are excluded and never cached.
//!
//! ## Strategies
//!
//! - [`GenealogistKind::PerNode`]: one parent query per hop per candidate
//! - [`GenealogistKind::Batch`]: resolve what the sets and caches can, then
//!   fetch the first hop for every remaining candidate in one query (see
//!   `hybrid`)
//!
//! The genealogist is not synchronized. Share it as a
//! [`SharedGenealogist`] and hold the lock for a whole
//! [`matching_descendants`](Genealogist::matching_descendants) call.

mod hybrid;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use fxhash::{FxHashMap, FxHashSet};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::{CacheStatistics, LruCache};
use crate::config::LivelinkConfig;
use crate::error::ConnectorError;
use crate::repository::{ParentLink, Repository, ROOT_ID};

/// A genealogist shared between traversal calls.
pub type SharedGenealogist = Arc<Mutex<Genealogist>>;

/// Resolution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenealogistKind {
    /// One parent query per hop.
    PerNode,
    /// Batched first hop, then per-node for deeper chains.
    #[default]
    Batch,
}

impl fmt::Display for GenealogistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenealogistKind::PerNode => write!(f, "per-node"),
            GenealogistKind::Batch => write!(f, "hybrid"),
        }
    }
}

impl FromStr for GenealogistKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "per-node" | "pernode" | "genealogist" => Ok(GenealogistKind::PerNode),
            "hybrid" | "batch" | "hybridgenealogist" => Ok(GenealogistKind::Batch),
            other => Err(format!("unknown genealogist: {other}")),
        }
    }
}

/// Cache and query counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenealogistStatistics {
    /// Included-verdict cache.
    pub included: CacheStatistics,
    /// Excluded-verdict cache.
    pub excluded: CacheStatistics,
    /// Parent queries issued.
    pub parent_queries: u64,
}

/// Ancestor-chain classifier with memoized verdicts.
#[derive(Debug)]
pub struct Genealogist {
    kind: GenealogistKind,
    included: FxHashSet<i64>,
    excluded: FxHashSet<i64>,
    included_cache: LruCache<i64>,
    excluded_cache: LruCache<i64>,
    parent_queries: u64,
}

impl Genealogist {
    /// Creates a genealogist.
    ///
    /// With no included locations, a chain that reaches the repository
    /// root is included; otherwise it is excluded.
    #[must_use]
    pub fn new(
        kind: GenealogistKind,
        included_nodes: &[i64],
        excluded_nodes: &[i64],
        cache_min: usize,
        cache_max: usize,
    ) -> Self {
        let mut included = signed_set(included_nodes);
        let mut excluded = signed_set(excluded_nodes);
        if included.is_empty() {
            included.insert(ROOT_ID);
        } else {
            excluded.insert(ROOT_ID);
        }
        Self {
            kind,
            included,
            excluded,
            included_cache: LruCache::new(cache_min, cache_max),
            excluded_cache: LruCache::new(cache_min, cache_max),
            parent_queries: 0,
        }
    }

    /// Creates a genealogist from the typed configuration.
    #[must_use]
    pub fn from_config(config: &LivelinkConfig) -> Self {
        Self::new(
            config.genealogist,
            &config.included_location_nodes,
            &config.excluded_location_nodes,
            config.cache_min,
            config.cache_max,
        )
    }

    /// Wraps the genealogist for sharing.
    #[must_use]
    pub fn shared(self) -> SharedGenealogist {
        Arc::new(Mutex::new(self))
    }

    /// The resolution strategy.
    #[must_use]
    pub fn kind(&self) -> GenealogistKind {
        self.kind
    }

    /// Whether `id` is in the effective included set.
    #[must_use]
    pub fn is_included_node(&self, id: i64) -> bool {
        self.included.contains(&id)
    }

    /// Whether `id` is in the effective excluded set.
    #[must_use]
    pub fn is_excluded_node(&self, id: i64) -> bool {
        self.excluded.contains(&id)
    }

    /// Returns cache and query counters.
    #[must_use]
    pub fn statistics(&self) -> GenealogistStatistics {
        GenealogistStatistics {
            included: self.included_cache.statistics(),
            excluded: self.excluded_cache.statistics(),
            parent_queries: self.parent_queries,
        }
    }

    /// Returns the ids in `candidates` that descend from an included node
    /// and from no excluded node, in input order.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if a parent query fails. Verdicts reached
    /// before the failure stay cached.
    pub fn matching_descendants<R: Repository + ?Sized>(
        &mut self,
        repo: &R,
        candidates: &[i64],
    ) -> Result<Vec<i64>, ConnectorError> {
        let matches = match self.kind {
            GenealogistKind::PerNode => {
                let mut matches = Vec::with_capacity(candidates.len());
                for &id in candidates {
                    if self.classify(repo, id)? {
                        matches.push(id);
                    }
                }
                matches
            }
            GenealogistKind::Batch => self.classify_batch(repo, candidates)?,
        };

        let stats = self.statistics();
        debug!(
            strategy = %self.kind,
            candidates = candidates.len(),
            matches = matches.len(),
            included_cache_size = stats.included.size,
            included_cache_hits = stats.included.hits,
            included_cache_misses = stats.included.misses,
            excluded_cache_size = stats.excluded.size,
            excluded_cache_hits = stats.excluded.hits,
            excluded_cache_misses = stats.excluded.misses,
            parent_queries = stats.parent_queries,
            "genealogist resolved batch"
        );
        Ok(matches)
    }

    // ── Resolution ──

    /// Known verdict for a node: excluded cache, excluded set, included
    /// cache, included set, in that order.
    fn lookup(&mut self, id: i64) -> Option<bool> {
        if self.excluded_cache.contains(&id) || self.excluded.contains(&id) {
            Some(false)
        } else if self.included_cache.contains(&id) || self.included.contains(&id) {
            Some(true)
        } else {
            None
        }
    }

    /// Classifies one candidate, one parent query per hop.
    fn classify<R: Repository + ?Sized>(
        &mut self,
        repo: &R,
        candidate: i64,
    ) -> Result<bool, ConnectorError> {
        if let Some(verdict) = self.lookup(candidate) {
            return Ok(verdict);
        }
        match self.parent_of(repo, candidate)? {
            Some(parent) => self.walk(repo, candidate, parent),
            None => Ok(orphaned(candidate, candidate)),
        }
    }

    /// Walks up from `start`, the first ancestor of `candidate`, until a
    /// verdict is known, then caches it for every ancestor visited.
    fn walk<R: Repository + ?Sized>(
        &mut self,
        repo: &R,
        candidate: i64,
        start: i64,
    ) -> Result<bool, ConnectorError> {
        let mut visited: Vec<i64> = Vec::new();
        let mut seen = FxHashSet::default();
        seen.insert(candidate);
        let mut node = start;

        loop {
            if let Some(verdict) = self.lookup(node) {
                self.memoize(&visited, verdict);
                return Ok(verdict);
            }
            if !seen.insert(node) {
                warn!(data_id = candidate, node, "cycle in ancestor chain; excluding");
                return Ok(false);
            }
            visited.push(node);
            match self.parent_of(repo, node)? {
                Some(parent) => node = parent,
                None => return Ok(orphaned(candidate, node)),
            }
        }
    }

    fn memoize(&mut self, nodes: &[i64], verdict: bool) {
        if verdict {
            self.included_cache.add_all(nodes.iter().copied());
        } else {
            self.excluded_cache.add_all(nodes.iter().copied());
        }
    }

    /// The effective parent of a single node.
    fn parent_of<R: Repository + ?Sized>(
        &mut self,
        repo: &R,
        id: i64,
    ) -> Result<Option<i64>, ConnectorError> {
        let links = self.fetch_parents(repo, &[id, -id])?;
        Ok(effective_parent(&parent_map(&links), id))
    }

    fn fetch_parents<R: Repository + ?Sized>(
        &mut self,
        repo: &R,
        ids: &[i64],
    ) -> Result<Vec<ParentLink>, ConnectorError> {
        self.parent_queries += 1;
        repo.parents(ids)
    }
}

fn signed_set(nodes: &[i64]) -> FxHashSet<i64> {
    nodes.iter().flat_map(|&n| [n, -n]).collect()
}

fn parent_map(links: &[ParentLink]) -> FxHashMap<i64, i64> {
    links.iter().map(|l| (l.id, l.parent)).collect()
}

/// The parent of `id`, substituting the stepparent when the direct parent
/// is the root and the negated row has a real parent. `None` when `id`
/// has no row.
fn effective_parent(parents: &FxHashMap<i64, i64>, id: i64) -> Option<i64> {
    let parent = *parents.get(&id)?;
    if parent == ROOT_ID {
        if let Some(&step) = parents.get(&-id) {
            if step != ROOT_ID {
                return Some(step);
            }
        }
    }
    Some(parent)
}

fn orphaned(candidate: i64, node: i64) -> bool {
    warn!(data_id = candidate, node, "no hierarchy row for ancestor; excluding");
    false
}
