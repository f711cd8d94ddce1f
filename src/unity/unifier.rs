//! Recursive, resumable unification.
//!
//! A unification walks five phases, committing the row before each one:
//!
//! ```text
//! empty / reunification
//!   → collecting_children   fetch-or-create the ten child rows
//!   → unifying_children     unify every non-terminal child (post-order)
//!   → promoting_leads       draw leads, or reuse a complete stored list
//!   → preparing_thumb       render the composite (failures only logged)
//!   → unified / skipped     grace countdown
//! ```
//!
//! Every commit is a compare-and-set on the row revision; the first one
//! doubles as the claim on the row.

use super::{Rank, Unity, UnifyError, UnityMask, UnityState};
use crate::composite::Thumbnailer;
use crate::notify::{Notifier, UnityProgress};
use crate::scheduler::{countdown, CancellationToken};
use crate::selection::{DrawPool, Selector};
use crate::store::{LeafId, LeafStore, UnityStore};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// How a unification ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnifyOutcome {
    /// Leads drawn or already complete.
    Unified,
    /// No leaves under the mask.
    Skipped,
    /// Stopped at a phase boundary; state is as last committed.
    Cancelled,
}

/// Phase order used to skip commits on resume.
fn phase(state: UnityState) -> u8 {
    match state {
        UnityState::Empty | UnityState::Reunification => 0,
        UnityState::CollectingChildren => 1,
        UnityState::UnifyingChildren => 2,
        UnityState::PromotingLeads => 3,
        UnityState::PreparingThumb => 4,
        UnityState::Unified | UnityState::Skipped => 5,
    }
}

/// Drives unities from `empty` to `unified`.
pub struct Unifier {
    unities: Arc<dyn UnityStore>,
    leaves: Arc<dyn LeafStore>,
    selector: Arc<dyn Selector>,
    thumbnailer: Option<Thumbnailer>,
    notifier: Notifier,
    grace: Duration,
}

impl Unifier {
    /// Creates a unifier without thumbnails and with a 10 second grace period.
    pub fn new(
        unities: Arc<dyn UnityStore>,
        leaves: Arc<dyn LeafStore>,
        selector: Arc<dyn Selector>,
        notifier: Notifier,
    ) -> Self {
        Self {
            unities,
            leaves,
            selector,
            thumbnailer: None,
            notifier,
            grace: Duration::from_secs(10),
        }
    }

    /// Renders a composite after leads are committed.
    pub fn with_thumbnailer(mut self, thumbnailer: Thumbnailer) -> Self {
        self.thumbnailer = Some(thumbnailer);
        self
    }

    /// Sets the post-unification countdown.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Unifies the oldest row that still needs work.
    pub fn work_once(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<(String, UnifyOutcome)>, UnifyError> {
        let Some(unity) = self.unities.next_for_work()? else {
            return Ok(None);
        };
        let mask = unity.mask.clone();
        tracing::info!(mask = %mask, state = %unity.state, "Unity picked for work");
        let outcome = self.unify_row(unity, 0, cancel)?;
        Ok(Some((mask, outcome)))
    }

    /// Unifies `mask`, which must already exist.
    ///
    /// A row that is already unified and consistent is not touched; its
    /// progress is re-published.
    pub fn unify(&self, mask: &str, cancel: &CancellationToken) -> Result<UnifyOutcome, UnifyError> {
        let unity = self
            .unities
            .get_unity(mask)?
            .ok_or_else(|| UnifyError::NotFound(mask.to_string()))?;
        self.unify_row(unity, 0, cancel)
    }

    fn unify_row(
        &self,
        mut unity: Unity,
        depth: usize,
        cancel: &CancellationToken,
    ) -> Result<UnifyOutcome, UnifyError> {
        let address = unity.address()?;

        if unity.state.is_terminal() {
            if self.is_complete(&unity)? {
                self.publish(&unity, depth, 0, 0);
                return Ok(terminal_outcome(unity.state));
            }
            tracing::warn!(mask = %unity.mask, "Unified row has wrong lead count, redrawing");
            unity.state = UnityState::Reunification;
        }

        if cancel.is_cancelled() {
            return Ok(UnifyOutcome::Cancelled);
        }

        // phase 1: children rows
        let first = if address.children().is_some() {
            UnityState::CollectingChildren
        } else {
            UnityState::PromotingLeads
        };
        if unity.state == UnityState::Reunification {
            unity.clear_leads();
        }
        unity = self.advance(unity, first, depth)?;

        let children = match address.children() {
            Some(masks) => Some(self.ensure_children(&unity, &masks, depth)?),
            None => None,
        };
        if cancel.is_cancelled() {
            return Ok(UnifyOutcome::Cancelled);
        }

        // phase 2: recursion
        let mut child_rows = Vec::new();
        if let Some(children) = children {
            unity = self.advance(unity, UnityState::UnifyingChildren, depth)?;
            for (i, child) in children.into_iter().enumerate() {
                if cancel.is_cancelled() {
                    return Ok(UnifyOutcome::Cancelled);
                }
                self.publish_phase(&unity, UnityState::UnifyingChildren, depth, i as u64 + 1, 10);

                let child = if self.is_complete(&child)? {
                    child
                } else {
                    tracing::debug!(parent = %unity.mask, child = %child.mask, "Unifying child");
                    let mask = child.mask.clone();
                    if self.unify_row(child, depth + 1, cancel)? == UnifyOutcome::Cancelled {
                        return Ok(UnifyOutcome::Cancelled);
                    }
                    self.unities
                        .get_unity(&mask)?
                        .ok_or(UnifyError::NotFound(mask))?
                };
                child_rows.push(child);
            }
        }
        if cancel.is_cancelled() {
            return Ok(UnifyOutcome::Cancelled);
        }

        // phase 3: leads
        unity = self.advance(unity, UnityState::PromotingLeads, depth)?;
        let leads = match self.promote(&mut unity, &address, &child_rows, depth, cancel)? {
            Some(leads) => leads,
            None if cancel.is_cancelled() => return Ok(UnifyOutcome::Cancelled),
            None => return self.finish(unity, UnityState::Skipped, depth, cancel),
        };
        if cancel.is_cancelled() {
            return Ok(UnifyOutcome::Cancelled);
        }

        // phase 4: thumbnail
        self.publish_phase(&unity, UnityState::PreparingThumb, depth, 0, 1);
        if let Some(thumbnailer) = &self.thumbnailer {
            let side = address.rank().grid_side();
            if let Err(e) = thumbnailer.render(&unity.mask, unity.version, &leads, side) {
                tracing::error!(mask = %unity.mask, version = unity.version, error = %e, "Thumbnail failed");
            }
        }
        self.publish_phase(&unity, UnityState::PreparingThumb, depth, 1, 1);
        if cancel.is_cancelled() {
            return Ok(UnifyOutcome::Cancelled);
        }

        // phase 5
        self.finish(unity, UnityState::Unified, depth, cancel)
    }

    /// Fetches or creates every child row, in digit order.
    fn ensure_children(
        &self,
        unity: &Unity,
        masks: &[UnityMask; 10],
        depth: usize,
    ) -> Result<Vec<Unity>, UnifyError> {
        let mut children = Vec::with_capacity(masks.len());
        for (i, mask) in masks.iter().enumerate() {
            let (child, created) = self.unities.get_or_create(mask)?;
            if created {
                tracing::debug!(parent = %unity.mask, child = %child.mask, "Child unity created");
            }
            children.push(child);
            self.publish_phase(unity, UnityState::CollectingChildren, depth, i as u64 + 1, 10);
        }
        Ok(children)
    }

    /// Draws or reuses leads and commits them with state `preparing_thumb`.
    ///
    /// Returns `None` when there is nothing to draw from, or when cancelled
    /// mid-draw (nothing committed in that case).
    fn promote(
        &self,
        unity: &mut Unity,
        address: &UnityMask,
        children: &[Unity],
        depth: usize,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<LeafId>>, UnifyError> {
        let rank = address.rank();
        let count = rank.leads_count();

        let stored = parse_leads(unity)?;
        if stored.len() == count {
            tracing::debug!(mask = %unity.mask, "Reusing stored leads");
            self.publish_phase(unity, UnityState::PromotingLeads, depth, count as u64, count as u64);
            *unity = self.advance(unity.clone(), UnityState::PreparingThumb, depth)?;
            return Ok(Some(stored));
        }

        let mut leads = Vec::with_capacity(count);
        match rank {
            Rank::Hundred => {
                if self.leaves.count_in_range(address.start(), address.end())? == 0 {
                    return Ok(None);
                }
                while leads.len() < count {
                    if cancel.is_cancelled() {
                        return Ok(None);
                    }
                    let Some(lead) = self.leaves.any_identifier_in_range(
                        address.start(),
                        address.end(),
                        self.selector.as_ref(),
                    )?
                    else {
                        return Ok(None);
                    };
                    leads.push(lead);
                    self.publish_drawn(unity, &leads, depth, count);
                }
            }
            Rank::Thousand | Rank::TenThousand => {
                let mut pooled = Vec::new();
                for child in children {
                    pooled.extend(parse_leads(child)?);
                }
                let mut pool = DrawPool::new(pooled);
                if pool.is_empty() {
                    return Ok(None);
                }
                while leads.len() < count {
                    if cancel.is_cancelled() {
                        return Ok(None);
                    }
                    match pool.draw(self.selector.as_ref())? {
                        Some(lead) => leads.push(lead),
                        None => break,
                    }
                    self.publish_drawn(unity, &leads, depth, count);
                }
                if pool.passes() > 1 {
                    tracing::debug!(mask = %unity.mask, passes = pool.passes(), "Lead pool refilled");
                }
            }
        }

        unity.set_leads(&leads).map_err(|source| UnifyError::MalformedLeads {
            mask: unity.mask.clone(),
            source,
        })?;
        unity.version += 1;
        unity.state = UnityState::PreparingThumb;
        unity.updated_at = Utc::now();
        *unity = self.unities.save_unity(unity)?;

        tracing::info!(mask = %unity.mask, version = unity.version, leads = leads.len(), "Leads promoted");
        Ok(Some(leads))
    }

    fn finish(
        &self,
        mut unity: Unity,
        state: UnityState,
        depth: usize,
        cancel: &CancellationToken,
    ) -> Result<UnifyOutcome, UnifyError> {
        if state == UnityState::Skipped {
            unity.clear_leads();
        }
        unity.state = state;
        unity.updated_at = Utc::now();
        let unity = self.unities.save_unity(&unity)?;
        tracing::info!(mask = %unity.mask, state = %unity.state, version = unity.version, "Unity finished");

        let total = self.grace.as_secs();
        let completed = countdown(self.grace, cancel, |elapsed| {
            self.publish(&unity, depth, elapsed, total);
        });
        if completed {
            self.publish(&unity, depth, total, total);
        }
        Ok(terminal_outcome(state))
    }

    /// Commits `state` if the row has not reached that phase yet.
    fn advance(&self, mut unity: Unity, state: UnityState, depth: usize) -> Result<Unity, UnifyError> {
        if phase(unity.state) >= phase(state) {
            return Ok(unity);
        }
        unity.state = state;
        unity.updated_at = Utc::now();
        let saved = self.unities.save_unity(&unity)?;
        self.publish(&saved, depth, 0, 0);
        Ok(saved)
    }

    /// Unified rows must hold exactly the rank's lead count.
    fn is_complete(&self, unity: &Unity) -> Result<bool, UnifyError> {
        Ok(match unity.state {
            UnityState::Skipped => true,
            UnityState::Unified => parse_leads(unity)?.len() == unity.rank.leads_count(),
            _ => false,
        })
    }

    fn publish_drawn(&self, unity: &Unity, leads: &[LeafId], depth: usize, count: usize) {
        self.notifier.unity(UnityProgress {
            mask: unity.mask.clone(),
            rank: unity.rank.into(),
            phase: UnityState::PromotingLeads.to_string(),
            depth,
            current: leads.len() as u64,
            total: count as u64,
            leads: leads.to_vec(),
            version: unity.version,
        });
    }

    fn publish_phase(&self, unity: &Unity, phase: UnityState, depth: usize, current: u64, total: u64) {
        self.notifier.unity(UnityProgress {
            mask: unity.mask.clone(),
            rank: unity.rank.into(),
            phase: phase.to_string(),
            depth,
            current,
            total,
            leads: unity.leads().unwrap_or_default(),
            version: unity.version,
        });
    }

    fn publish(&self, unity: &Unity, depth: usize, current: u64, total: u64) {
        self.publish_phase(unity, unity.state, depth, current, total);
    }
}

fn parse_leads(unity: &Unity) -> Result<Vec<LeafId>, UnifyError> {
    unity.leads().map_err(|source| UnifyError::MalformedLeads {
        mask: unity.mask.clone(),
        source,
    })
}

fn terminal_outcome(state: UnityState) -> UnifyOutcome {
    if state == UnityState::Skipped {
        UnifyOutcome::Skipped
    } else {
        UnifyOutcome::Unified
    }
}
