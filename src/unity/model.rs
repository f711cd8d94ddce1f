//! Unity rows.

use super::mask::{MaskError, UnityMask};
use crate::store::LeafId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Span of a unity in leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum Rank {
    /// 100 leaves, 16 leads.
    Hundred,
    /// 1000 leaves, 36 leads.
    Thousand,
    /// 10000 leaves, 64 leads.
    TenThousand,
}

impl Rank {
    /// Number of leaves covered.
    pub fn span(self) -> u64 {
        match self {
            Self::Hundred => 100,
            Self::Thousand => 1_000,
            Self::TenThousand => 10_000,
        }
    }

    /// Placeholder characters in the rendered mask.
    pub fn placeholders(self) -> usize {
        match self {
            Self::Hundred => 2,
            Self::Thousand => 3,
            Self::TenThousand => 4,
        }
    }

    /// Rank with `count` placeholder digits.
    pub fn from_placeholders(count: usize) -> Option<Self> {
        match count {
            2 => Some(Self::Hundred),
            3 => Some(Self::Thousand),
            4 => Some(Self::TenThousand),
            _ => None,
        }
    }

    /// Rank of the child unities; `None` at rank 100.
    pub fn child(self) -> Option<Self> {
        match self {
            Self::Hundred => None,
            Self::Thousand => Some(Self::Hundred),
            Self::TenThousand => Some(Self::Thousand),
        }
    }

    /// Next rank up, if any.
    pub fn parent(self) -> Option<Self> {
        match self {
            Self::Hundred => Some(Self::Thousand),
            Self::Thousand => Some(Self::TenThousand),
            Self::TenThousand => None,
        }
    }

    /// Side of the composite grid.
    pub fn grid_side(self) -> usize {
        match self {
            Self::Hundred => 4,
            Self::Thousand => 6,
            Self::TenThousand => 8,
        }
    }

    /// Number of leads a unified row holds.
    pub fn leads_count(self) -> usize {
        self.grid_side() * self.grid_side()
    }

    /// New leaves between re-unifications of a unity of this rank.
    pub fn reunify_period(self) -> u64 {
        match self {
            Self::Hundred => 10,
            Self::Thousand => 50,
            Self::TenThousand => 100,
        }
    }

    /// All ranks, smallest first.
    pub fn all() -> [Rank; 3] {
        [Self::Hundred, Self::Thousand, Self::TenThousand]
    }
}

impl From<Rank> for u32 {
    fn from(rank: Rank) -> u32 {
        rank.span() as u32
    }
}

impl TryFrom<u32> for Rank {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            100 => Ok(Self::Hundred),
            1_000 => Ok(Self::Thousand),
            10_000 => Ok(Self::TenThousand),
            other => Err(format!("unsupported rank {}", other)),
        }
    }
}

/// Persisted phase of a unity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnityState {
    /// Created, nothing done yet.
    Empty,
    /// Ensuring child rows exist.
    CollectingChildren,
    /// Recursing into unfinished children.
    UnifyingChildren,
    /// Drawing leads.
    PromotingLeads,
    /// Leads committed, composite being rendered.
    PreparingThumb,
    /// Done with a full set of leads.
    Unified,
    /// Done; no leaves under the mask.
    Skipped,
    /// Queued to redraw after new leaves arrived.
    Reunification,
}

impl UnityState {
    /// Unified or skipped: nothing left to do until re-unification.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Unified | Self::Skipped)
    }

    /// Stored form of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::CollectingChildren => "collecting_children",
            Self::UnifyingChildren => "unifying_children",
            Self::PromotingLeads => "promoting_leads",
            Self::PreparingThumb => "preparing_thumb",
            Self::Unified => "unified",
            Self::Skipped => "skipped",
            Self::Reunification => "reunification",
        }
    }
}

impl std::fmt::Display for UnityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One group of leaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unity {
    /// Rendered address; primary key.
    pub mask: String,
    /// Rank of the mask.
    pub rank: Rank,
    /// Phase reached by the last commit.
    pub state: UnityState,
    /// Leads as a JSON array; empty string when none were drawn.
    pub leads: String,
    /// Incremented whenever leads are redrawn.
    pub version: u32,
    /// Optimistic-concurrency counter maintained by the store.
    pub revision: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last commit.
    pub updated_at: DateTime<Utc>,
}

impl Unity {
    /// Creates an unsaved row in the `empty` state.
    pub fn new(mask: &UnityMask) -> Self {
        let now = Utc::now();
        Self {
            mask: mask.to_string(),
            rank: mask.rank(),
            state: UnityState::Empty,
            leads: String::new(),
            version: 0,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Parses the row's mask.
    pub fn address(&self) -> Result<UnityMask, MaskError> {
        UnityMask::parse(&self.mask)
    }

    /// Decodes the leads column.
    pub fn leads(&self) -> Result<Vec<LeafId>, serde_json::Error> {
        if self.leads.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&self.leads)
    }

    /// Encodes `leads` into the leads column.
    pub fn set_leads(&mut self, leads: &[LeafId]) -> Result<(), serde_json::Error> {
        self.leads = serde_json::to_string(leads)?;
        Ok(())
    }

    /// Empties the leads column.
    pub fn clear_leads(&mut self) {
        self.leads.clear();
    }
}

impl std::fmt::Display for Unity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.mask, self.state)
    }
}
