//! Creation and re-unification triggers for unities.

use super::{Rank, UnifyError, UnityMask, UnityState};
use crate::store::{LeafId, LeafStore, UnityStore};
use chrono::Utc;
use std::sync::Arc;

/// Leaves required before any top-level unity is seeded.
const MIN_LEAVES: LeafId = 100;

/// Keeps the unity table in step with new leaves.
pub struct UnityPlanner {
    unities: Arc<dyn UnityStore>,
    leaves: Arc<dyn LeafStore>,
    mask_width: usize,
}

impl UnityPlanner {
    /// `mask_width` is the rendered width of every mask, e.g. 6 for `"01XXXX"`.
    pub fn new(unities: Arc<dyn UnityStore>, leaves: Arc<dyn LeafStore>, mask_width: usize) -> Self {
        Self {
            unities,
            leaves,
            mask_width,
        }
    }

    /// First leaf id the configured mask width cannot address.
    fn addressable_leaves(&self) -> LeafId {
        10u64.saturating_pow(self.mask_width as u32)
    }

    /// Ensures a rank-10000 unity exists for every block up to the newest
    /// leaf, stopping at the last block the mask width can address.
    /// Returns the number of unities created.
    pub fn seed_top_level(&self) -> Result<usize, UnifyError> {
        let max = match self.leaves.max_identifier()? {
            Some(max) if max >= MIN_LEAVES => max,
            other => {
                tracing::debug!(max = ?other, "Not enough leaves to seed unities");
                return Ok(0);
            }
        };

        let top = Rank::TenThousand;
        let last_block = self.addressable_leaves() / top.span() - 1;
        let newest_block = max / top.span();
        if newest_block > last_block {
            tracing::warn!(
                max,
                mask_width = self.mask_width,
                "Leaves beyond the addressable range are not planned"
            );
        }

        let mut created = 0;
        for prefix in 0..=newest_block.min(last_block) {
            let mask = UnityMask::new(top, prefix, self.mask_width - top.placeholders())?;
            if self.unities.get_or_create(&mask)?.1 {
                tracing::info!(mask = %mask, "Top-level unity created");
                created += 1;
            }
        }
        Ok(created)
    }

    /// Reacts to a new leaf: for every rank whose re-unification period is
    /// crossed between `previous` and `leaf`, the unity containing `previous`
    /// is created or queued for re-unification.
    ///
    /// Returns the number of unities touched.
    pub fn on_new_leaf(&self, previous: LeafId, leaf: LeafId) -> Result<usize, UnifyError> {
        if previous >= self.addressable_leaves() {
            tracing::debug!(previous, mask_width = self.mask_width, "Leaf outside addressable range");
            return Ok(0);
        }

        let mut touched = 0;
        for rank in Rank::all().into_iter().rev() {
            let period = rank.reunify_period();
            if previous / period == leaf / period {
                continue;
            }

            let mask = UnityMask::containing(previous, rank, self.mask_width)?;
            let (mut unity, created) = self.unities.get_or_create(&mask)?;
            if created {
                tracing::info!(mask = %mask, previous, leaf, "Unity created for new leaves");
                touched += 1;
            } else if unity.state.is_terminal() {
                unity.state = UnityState::Reunification;
                unity.updated_at = Utc::now();
                self.unities.save_unity(&unity)?;
                tracing::info!(mask = %mask, previous, leaf, "Unity queued for re-unification");
                touched += 1;
            }
        }
        Ok(touched)
    }

    /// Runs [`on_new_leaf`](Self::on_new_leaf) for every leaf added since the
    /// persisted cursor, advancing the cursor as it goes.
    pub fn catch_up(&self) -> Result<usize, UnifyError> {
        let cursor = self.unities.planner_cursor()?;
        let Some(max) = self.leaves.max_identifier()? else {
            return Ok(0);
        };
        if max <= cursor {
            return Ok(0);
        }

        let mut touched = 0;
        let mut previous = cursor;
        for leaf in self.leaves.identifiers_in_range(cursor + 1, max)? {
            if previous > 0 {
                touched += self.on_new_leaf(previous, leaf)?;
            }
            previous = leaf;
            self.unities.set_planner_cursor(leaf)?;
        }
        tracing::debug!(from = cursor, to = previous, touched, "Planner caught up");
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::unity::Unity;

    fn store_with_leaves(count: usize) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for _ in 0..count {
            store.insert_leaf(Utc::now(), Vec::new()).unwrap();
        }
        store
    }

    fn planner(store: &Arc<MemoryStore>) -> UnityPlanner {
        UnityPlanner::new(store.clone(), store.clone(), 6)
    }

    /// Leaf store reporting a fixed newest id without holding any leaves.
    struct NewestLeaf(LeafId);

    impl LeafStore for NewestLeaf {
        fn count_in_range(&self, _: LeafId, _: LeafId) -> Result<u64, crate::store::StoreError> {
            Ok(0)
        }

        fn identifiers_in_range(
            &self,
            _: LeafId,
            _: LeafId,
        ) -> Result<Vec<LeafId>, crate::store::StoreError> {
            Ok(Vec::new())
        }

        fn identifiers_created_between(
            &self,
            _: chrono::DateTime<Utc>,
            _: chrono::DateTime<Utc>,
        ) -> Result<Vec<LeafId>, crate::store::StoreError> {
            Ok(Vec::new())
        }

        fn max_identifier(&self) -> Result<Option<LeafId>, crate::store::StoreError> {
            Ok(Some(self.0))
        }
    }

    fn masks(store: &MemoryStore) -> Vec<String> {
        store.unities().unwrap().into_iter().map(|u| u.mask).collect()
    }

    #[test]
    fn test_seed_needs_enough_leaves() {
        let store = store_with_leaves(99);
        assert_eq!(planner(&store).seed_top_level().unwrap(), 0);
        assert!(masks(&store).is_empty());
    }

    #[test]
    fn test_seed_creates_each_block_once() {
        let store = store_with_leaves(250);
        let planner = planner(&store);
        assert_eq!(planner.seed_top_level().unwrap(), 1);
        assert_eq!(planner.seed_top_level().unwrap(), 0);
        assert_eq!(masks(&store), vec!["00XXXX"]);
    }

    #[test]
    fn test_seed_stops_at_last_addressable_block() {
        let store = Arc::new(MemoryStore::new());
        let planner = UnityPlanner::new(store.clone(), Arc::new(NewestLeaf(1_000_000)), 6);

        assert_eq!(planner.seed_top_level().unwrap(), 100);
        assert_eq!(planner.seed_top_level().unwrap(), 0);
        let seeded = masks(&store);
        assert_eq!(seeded.first().map(String::as_str), Some("00XXXX"));
        assert_eq!(seeded.last().map(String::as_str), Some("99XXXX"));
    }

    #[test]
    fn test_new_leaf_outside_addressable_range_is_ignored() {
        let store = store_with_leaves(0);
        let planner = planner(&store);
        assert_eq!(planner.on_new_leaf(1_000_009, 1_000_010).unwrap(), 0);
        assert!(masks(&store).is_empty());

        assert_eq!(planner.on_new_leaf(999_999, 1_000_000).unwrap(), 3);
        assert_eq!(masks(&store), vec!["99XXXX", "999XXX", "9999XX"]);
    }

    #[test]
    fn test_new_leaf_inside_period_does_nothing() {
        let store = store_with_leaves(0);
        assert_eq!(planner(&store).on_new_leaf(11, 12).unwrap(), 0);
        assert!(masks(&store).is_empty());
    }

    #[test]
    fn test_period_crossings_create_unities() {
        let store = store_with_leaves(0);
        let planner = planner(&store);

        assert_eq!(planner.on_new_leaf(9, 10).unwrap(), 1);
        assert_eq!(masks(&store), vec!["0000XX"]);

        assert_eq!(planner.on_new_leaf(149, 150).unwrap(), 2);
        assert_eq!(masks(&store), vec!["0000XX", "000XXX", "0001XX"]);
    }

    #[test]
    fn test_terminal_unity_is_queued_again() {
        let store = store_with_leaves(0);
        let planner = planner(&store);
        let mut unity = store
            .create_unity(Unity::new(&UnityMask::parse("0001XX").unwrap()))
            .unwrap();
        unity.state = UnityState::Unified;
        store.save_unity(&unity).unwrap();

        assert_eq!(planner.on_new_leaf(119, 120).unwrap(), 1);
        assert_eq!(
            store.get_unity("0001XX").unwrap().unwrap().state,
            UnityState::Reunification
        );

        // already pending: left alone
        assert_eq!(planner.on_new_leaf(129, 130).unwrap(), 0);
    }

    #[test]
    fn test_catch_up_advances_cursor() {
        let store = store_with_leaves(25);
        let planner = planner(&store);

        assert_eq!(planner.catch_up().unwrap(), 1);
        assert_eq!(store.planner_cursor().unwrap(), 25);
        assert_eq!(masks(&store), vec!["0000XX"]);

        store.insert_leaf(Utc::now(), Vec::new()).unwrap();
        assert_eq!(planner.catch_up().unwrap(), 0);
        assert_eq!(store.planner_cursor().unwrap(), 26);
    }
}
