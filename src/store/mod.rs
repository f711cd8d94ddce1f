//! Durable state contracts.
//!
//! The workflows never keep session state in memory: everything they need to
//! resume lives behind these traits. Production deployments implement them
//! over their database; [`MemoryStore`] implements all of them for the demo
//! binary and tests.
//!
//! Every `save_*` of a mutable row is a compare-and-set on the row's
//! `revision`. A writer holding a stale copy gets [`StoreError::Conflict`],
//! which is how two workers racing on the same row are kept apart.

mod memory;

pub use memory::MemoryStore;

use crate::lottery::{Lottery, Selection};
use crate::oracle::EntropyDecision;
use crate::selection::{SelectError, Selector};
use crate::unity::{Unity, UnityMask};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Identifier of a leaf record.
pub type LeafId = u64;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The row does not exist.
    #[error("{0} not found")]
    NotFound(String),
    /// A row with this key already exists.
    #[error("{0} already exists")]
    AlreadyExists(String),
    /// The row changed since it was read.
    #[error("{entity} was modified concurrently (expected revision {expected}, found {found})")]
    Conflict {
        /// Key of the row.
        entity: String,
        /// Revision of the stale copy.
        expected: u64,
        /// Revision currently stored.
        found: u64,
    },
    /// The storage backend failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Failure of an entropy-backed draw over stored leaves.
#[derive(Debug, Error)]
pub enum RangeDrawError {
    /// Listing the range failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The selector could not produce a draw.
    #[error(transparent)]
    Select(#[from] SelectError),
}

/// A leaf record as seen by this core. Leaf CRUD belongs to another service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafRecord {
    /// Sequential identifier, starting at 1.
    pub id: LeafId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Encoded leaf image (binary PGM in the built-in pipeline).
    pub image: Vec<u8>,
}

/// Read-only queries over leaf records.
pub trait LeafStore: Send + Sync {
    /// Number of leaves with identifiers in `start..=end`.
    fn count_in_range(&self, start: LeafId, end: LeafId) -> Result<u64, StoreError>;

    /// Identifiers in `start..=end`, ascending.
    fn identifiers_in_range(&self, start: LeafId, end: LeafId) -> Result<Vec<LeafId>, StoreError>;

    /// Identifiers of leaves created within `from..=to`, ascending.
    fn identifiers_created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LeafId>, StoreError>;

    /// Largest identifier, or `None` when there are no leaves.
    fn max_identifier(&self) -> Result<Option<LeafId>, StoreError>;

    /// Picks any existing leaf in `start..=end` with one selector draw.
    ///
    /// Returns `None` when the range holds no leaves.
    fn any_identifier_in_range(
        &self,
        start: LeafId,
        end: LeafId,
        selector: &dyn Selector,
    ) -> Result<Option<LeafId>, RangeDrawError> {
        let ids = self.identifiers_in_range(start, end)?;
        if ids.is_empty() {
            return Ok(None);
        }
        let index = selector.select(ids.len() as u64)?;
        Ok(Some(ids[index as usize]))
    }
}

/// Access to leaf images for composites.
pub trait LeafImages: Send + Sync {
    /// Loads the encoded image of one leaf.
    fn load_image(&self, id: LeafId) -> Result<Vec<u8>, StoreError>;
}

/// Persistence of rendered composites.
pub trait CompositeStore: Send + Sync {
    /// Stores the composite of `mask` at `version`, replacing older ones.
    fn store_composite(&self, mask: &str, version: u32, image: Vec<u8>) -> Result<(), StoreError>;
}

/// Append-only decision log.
pub trait DecisionStore: Send + Sync {
    /// Appends a decision and returns it with its assigned id.
    fn save_decision(&self, decision: EntropyDecision) -> Result<EntropyDecision, StoreError>;
}

/// Lottery rows and their selections.
pub trait LotteryStore: Send + Sync {
    /// Inserts a new lottery, assigning its id.
    fn create_lottery(&self, lottery: Lottery) -> Result<Lottery, StoreError>;

    /// Fetches one lottery.
    fn get_lottery(&self, id: u64) -> Result<Option<Lottery>, StoreError>;

    /// Compare-and-set save; returns the row with its new revision.
    fn save_lottery(&self, lottery: &Lottery) -> Result<Lottery, StoreError>;

    /// Saves the lottery and appends its selection atomically.
    fn save_winner(
        &self,
        lottery: &Lottery,
        selection: Selection,
    ) -> Result<(Lottery, Selection), StoreError>;

    /// Oldest waiting or running lottery whose start time has passed.
    fn active_lottery(&self, now: DateTime<Utc>) -> Result<Option<Lottery>, StoreError>;

    /// Lottery of `kind` collecting exactly the given window, if any.
    fn find_lottery(
        &self,
        kind: &str,
        collect_period_start: DateTime<Utc>,
        collect_period_end: DateTime<Utc>,
    ) -> Result<Option<Lottery>, StoreError>;

    /// Selections of one lottery in creation order.
    fn selections(&self, lottery_id: u64) -> Result<Vec<Selection>, StoreError>;
}

/// Unity rows, keyed by mask.
pub trait UnityStore: Send + Sync {
    /// Fetches one unity by mask.
    fn get_unity(&self, mask: &str) -> Result<Option<Unity>, StoreError>;

    /// Inserts a new row; fails with `AlreadyExists` if the mask is taken.
    fn create_unity(&self, unity: Unity) -> Result<Unity, StoreError>;

    /// Compare-and-set save; returns the row with its new revision.
    fn save_unity(&self, unity: &Unity) -> Result<Unity, StoreError>;

    /// Oldest row (by creation) that still needs work.
    fn next_for_work(&self) -> Result<Option<Unity>, StoreError>;

    /// Highest leaf id the planner has already processed.
    fn planner_cursor(&self) -> Result<LeafId, StoreError>;

    /// Persists the planner cursor.
    fn set_planner_cursor(&self, cursor: LeafId) -> Result<(), StoreError>;

    /// Fetches the row for `mask`, creating an empty one if missing.
    ///
    /// The boolean is true when the row was created by this call.
    fn get_or_create(&self, mask: &UnityMask) -> Result<(Unity, bool), StoreError> {
        let key = mask.to_string();
        if let Some(existing) = self.get_unity(&key)? {
            return Ok((existing, false));
        }
        match self.create_unity(Unity::new(mask)) {
            Ok(created) => Ok((created, true)),
            // lost a creation race
            Err(StoreError::AlreadyExists(_)) => self
                .get_unity(&key)?
                .map(|u| (u, false))
                .ok_or(StoreError::NotFound(key)),
            Err(e) => Err(e),
        }
    }
}
