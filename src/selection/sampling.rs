//! Sampling algorithms over a [`Selector`].

use super::{SelectError, Selector};

/// Picks one item from `pool`, which stays intact; repeats are possible
/// across calls.
pub fn sample_with_replacement<T: Copy>(
    pool: &[T],
    selector: &dyn Selector,
) -> Result<T, SelectError> {
    let index = selector.select(pool.len() as u64)?;
    Ok(pool[index as usize])
}

/// Draws without replacement within one pass over a pool.
///
/// Every draw removes the chosen item. When a pass is exhausted before the
/// caller has enough, [`DrawPool::draw`] starts a new pass over the original
/// items, so a small pool can still fill a larger quota.
#[derive(Debug, Clone)]
pub struct DrawPool<T> {
    original: Vec<T>,
    remaining: Vec<T>,
    passes: u32,
}

impl<T: Copy> DrawPool<T> {
    /// Creates a pool over `items`, starting the first pass.
    pub fn new(items: Vec<T>) -> Self {
        Self {
            remaining: items.clone(),
            original: items,
            passes: 1,
        }
    }

    /// Whether the pool has no items at all.
    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    /// Items left in the current pass.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// Number of passes started so far.
    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Draws one item; `None` when the pool holds no items at all.
    pub fn draw(&mut self, selector: &dyn Selector) -> Result<Option<T>, SelectError> {
        if self.original.is_empty() {
            return Ok(None);
        }
        if self.remaining.is_empty() {
            self.remaining = self.original.clone();
            self.passes += 1;
        }
        let index = selector.select(self.remaining.len() as u64)?;
        Ok(Some(self.remaining.swap_remove(index as usize)))
    }

    /// Draws `count` items.
    pub fn draw_many(
        &mut self,
        count: usize,
        selector: &dyn Selector,
    ) -> Result<Vec<T>, SelectError> {
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            match self.draw(selector)? {
                Some(item) => out.push(item),
                None => break,
            }
        }
        Ok(out)
    }
}
