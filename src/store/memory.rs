//! In-memory implementation of every store contract.

use super::{
    CompositeStore, DecisionStore, LeafId, LeafImages, LeafRecord, LeafStore, LotteryStore,
    StoreError, UnityStore,
};
use crate::lottery::{Lottery, LotteryState, Selection};
use crate::oracle::EntropyDecision;
use crate::unity::{Unity, UnityState};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    leaves: BTreeMap<LeafId, LeafRecord>,
    lotteries: BTreeMap<u64, Lottery>,
    selections: Vec<Selection>,
    decisions: Vec<EntropyDecision>,
    unities: HashMap<String, Unity>,
    /// Masks in creation order.
    unity_order: Vec<String>,
    composites: HashMap<String, (u32, Vec<u8>)>,
    planner_cursor: LeafId,
}

/// Thread-safe in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))
    }

    /// Adds a leaf with the next identifier (starting at 1).
    pub fn insert_leaf(
        &self,
        created_at: DateTime<Utc>,
        image: Vec<u8>,
    ) -> Result<LeafId, StoreError> {
        let mut inner = self.lock()?;
        let id = inner.leaves.keys().next_back().map_or(1, |last| last + 1);
        inner.leaves.insert(
            id,
            LeafRecord {
                id,
                created_at,
                image,
            },
        );
        Ok(id)
    }

    /// All recorded decisions in insertion order.
    pub fn decisions(&self) -> Result<Vec<EntropyDecision>, StoreError> {
        Ok(self.lock()?.decisions.clone())
    }

    /// Stored composite of `mask` with its version.
    pub fn composite(&self, mask: &str) -> Result<Option<(u32, Vec<u8>)>, StoreError> {
        Ok(self.lock()?.composites.get(mask).cloned())
    }

    /// All unity rows in creation order.
    pub fn unities(&self) -> Result<Vec<Unity>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .unity_order
            .iter()
            .filter_map(|mask| inner.unities.get(mask).cloned())
            .collect())
    }
}

impl LeafStore for MemoryStore {
    fn count_in_range(&self, start: LeafId, end: LeafId) -> Result<u64, StoreError> {
        if start > end {
            return Ok(0);
        }
        Ok(self.lock()?.leaves.range(start..=end).count() as u64)
    }

    fn identifiers_in_range(&self, start: LeafId, end: LeafId) -> Result<Vec<LeafId>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self.lock()?.leaves.range(start..=end).map(|(id, _)| *id).collect())
    }

    fn identifiers_created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LeafId>, StoreError> {
        Ok(self
            .lock()?
            .leaves
            .values()
            .filter(|leaf| leaf.created_at >= from && leaf.created_at <= to)
            .map(|leaf| leaf.id)
            .collect())
    }

    fn max_identifier(&self) -> Result<Option<LeafId>, StoreError> {
        Ok(self.lock()?.leaves.keys().next_back().copied())
    }
}

impl LeafImages for MemoryStore {
    fn load_image(&self, id: LeafId) -> Result<Vec<u8>, StoreError> {
        self.lock()?
            .leaves
            .get(&id)
            .map(|leaf| leaf.image.clone())
            .ok_or_else(|| StoreError::NotFound(format!("leaf {}", id)))
    }
}

impl CompositeStore for MemoryStore {
    fn store_composite(&self, mask: &str, version: u32, image: Vec<u8>) -> Result<(), StoreError> {
        self.lock()?
            .composites
            .insert(mask.to_string(), (version, image));
        Ok(())
    }
}

impl DecisionStore for MemoryStore {
    fn save_decision(&self, mut decision: EntropyDecision) -> Result<EntropyDecision, StoreError> {
        let mut inner = self.lock()?;
        decision.id = inner.decisions.len() as u64 + 1;
        inner.decisions.push(decision.clone());
        Ok(decision)
    }
}

impl LotteryStore for MemoryStore {
    fn create_lottery(&self, mut lottery: Lottery) -> Result<Lottery, StoreError> {
        let mut inner = self.lock()?;
        lottery.id = inner.lotteries.keys().next_back().map_or(1, |last| last + 1);
        lottery.revision = 1;
        inner.lotteries.insert(lottery.id, lottery.clone());
        Ok(lottery)
    }

    fn get_lottery(&self, id: u64) -> Result<Option<Lottery>, StoreError> {
        Ok(self.lock()?.lotteries.get(&id).cloned())
    }

    fn save_lottery(&self, lottery: &Lottery) -> Result<Lottery, StoreError> {
        let mut inner = self.lock()?;
        save_lottery_locked(&mut inner, lottery)
    }

    fn save_winner(
        &self,
        lottery: &Lottery,
        mut selection: Selection,
    ) -> Result<(Lottery, Selection), StoreError> {
        let mut inner = self.lock()?;
        let saved = save_lottery_locked(&mut inner, lottery)?;
        selection.id = inner.selections.len() as u64 + 1;
        inner.selections.push(selection.clone());
        Ok((saved, selection))
    }

    fn active_lottery(&self, now: DateTime<Utc>) -> Result<Option<Lottery>, StoreError> {
        Ok(self
            .lock()?
            .lotteries
            .values()
            .filter(|l| l.state != LotteryState::Finished && l.start_time <= now)
            .min_by_key(|l| (l.start_time, l.id))
            .cloned())
    }

    fn find_lottery(
        &self,
        kind: &str,
        collect_period_start: DateTime<Utc>,
        collect_period_end: DateTime<Utc>,
    ) -> Result<Option<Lottery>, StoreError> {
        Ok(self
            .lock()?
            .lotteries
            .values()
            .find(|l| {
                l.kind == kind
                    && l.collect_period_start == collect_period_start
                    && l.collect_period_end == collect_period_end
            })
            .cloned())
    }

    fn selections(&self, lottery_id: u64) -> Result<Vec<Selection>, StoreError> {
        Ok(self
            .lock()?
            .selections
            .iter()
            .filter(|s| s.lottery_id == lottery_id)
            .cloned()
            .collect())
    }
}

fn save_lottery_locked(inner: &mut Inner, lottery: &Lottery) -> Result<Lottery, StoreError> {
    let stored = inner
        .lotteries
        .get_mut(&lottery.id)
        .ok_or_else(|| StoreError::NotFound(format!("lottery {}", lottery.id)))?;
    if stored.revision != lottery.revision {
        return Err(StoreError::Conflict {
            entity: format!("lottery {}", lottery.id),
            expected: lottery.revision,
            found: stored.revision,
        });
    }
    *stored = lottery.clone();
    stored.revision += 1;
    Ok(stored.clone())
}

impl UnityStore for MemoryStore {
    fn get_unity(&self, mask: &str) -> Result<Option<Unity>, StoreError> {
        Ok(self.lock()?.unities.get(mask).cloned())
    }

    fn create_unity(&self, mut unity: Unity) -> Result<Unity, StoreError> {
        let mut inner = self.lock()?;
        if inner.unities.contains_key(&unity.mask) {
            return Err(StoreError::AlreadyExists(format!("unity {}", unity.mask)));
        }
        unity.revision = 1;
        inner.unity_order.push(unity.mask.clone());
        inner.unities.insert(unity.mask.clone(), unity.clone());
        Ok(unity)
    }

    fn save_unity(&self, unity: &Unity) -> Result<Unity, StoreError> {
        let mut inner = self.lock()?;
        let stored = inner
            .unities
            .get_mut(&unity.mask)
            .ok_or_else(|| StoreError::NotFound(format!("unity {}", unity.mask)))?;
        if stored.revision != unity.revision {
            return Err(StoreError::Conflict {
                entity: format!("unity {}", unity.mask),
                expected: unity.revision,
                found: stored.revision,
            });
        }
        *stored = unity.clone();
        stored.revision += 1;
        Ok(stored.clone())
    }

    fn next_for_work(&self) -> Result<Option<Unity>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .unity_order
            .iter()
            .filter_map(|mask| inner.unities.get(mask))
            .find(|u| !u.state.is_terminal())
            .cloned())
    }

    fn planner_cursor(&self) -> Result<LeafId, StoreError> {
        Ok(self.lock()?.planner_cursor)
    }

    fn set_planner_cursor(&self, cursor: LeafId) -> Result<(), StoreError> {
        self.lock()?.planner_cursor = cursor;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unity::UnityMask;
    use chrono::Duration;

    #[test]
    fn test_leaf_ids_are_sequential() {
        let store = MemoryStore::new();
        let now = Utc::now();
        assert_eq!(store.insert_leaf(now, vec![]).unwrap(), 1);
        assert_eq!(store.insert_leaf(now, vec![]).unwrap(), 2);
        assert_eq!(store.max_identifier().unwrap(), Some(2));
        assert_eq!(store.count_in_range(0, 99).unwrap(), 2);
        assert_eq!(store.count_in_range(3, 99).unwrap(), 0);
    }

    #[test]
    fn test_created_between_is_inclusive() {
        let store = MemoryStore::new();
        let start = Utc::now();
        let end = start + Duration::hours(1);
        store.insert_leaf(start - Duration::seconds(1), vec![]).unwrap();
        let a = store.insert_leaf(start, vec![]).unwrap();
        let b = store.insert_leaf(end, vec![]).unwrap();

        assert_eq!(store.identifiers_created_between(start, end).unwrap(), vec![a, b]);
    }

    #[test]
    fn test_stale_unity_save_conflicts() {
        let store = MemoryStore::new();
        let created = store
            .create_unity(Unity::new(&UnityMask::parse("12XXX").unwrap()))
            .unwrap();

        let mut first = created.clone();
        first.state = UnityState::CollectingChildren;
        store.save_unity(&first).unwrap();

        let mut second = created;
        second.state = UnityState::Skipped;
        assert!(matches!(
            store.save_unity(&second),
            Err(StoreError::Conflict { .. })
        ));
    }

    #[test]
    fn test_next_for_work_is_fifo_and_skips_terminal() {
        let store = MemoryStore::new();
        let first = store
            .create_unity(Unity::new(&UnityMask::parse("01XXXX").unwrap()))
            .unwrap();
        store
            .create_unity(Unity::new(&UnityMask::parse("02XXXX").unwrap()))
            .unwrap();

        assert_eq!(store.next_for_work().unwrap().unwrap().mask, "01XXXX");

        let mut done = first;
        done.state = UnityState::Unified;
        store.save_unity(&done).unwrap();
        assert_eq!(store.next_for_work().unwrap().unwrap().mask, "02XXXX");
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let store = MemoryStore::new();
        let mask = UnityMask::parse("120XX").unwrap();

        let (_, created) = store.get_or_create(&mask).unwrap();
        assert!(created);
        let (_, created) = store.get_or_create(&mask).unwrap();
        assert!(!created);
        assert_eq!(store.unities().unwrap().len(), 1);
    }

    #[test]
    fn test_active_lottery_respects_start_time() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .create_lottery(Lottery::new("daily", now + Duration::hours(1), now, now))
            .unwrap();
        assert!(store.active_lottery(now).unwrap().is_none());
        assert!(store
            .active_lottery(now + Duration::hours(2))
            .unwrap()
            .is_some());
    }
}
