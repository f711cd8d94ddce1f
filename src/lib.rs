//! Optical Oracle Library
//!
//! Turns camera frames into uniform draws and uses them to drive two
//! resumable workflows over a growing, numbered population of leaves:
//! periodic lotteries and a hierarchical "unity" selection tree.
//!
//! # Architecture
//!
//! ```text
//! capture → oracle → selection ─┬→ lottery (runner, daily planning)
//!              ↓                └→ unity (planner, unifier) → composite
//!        decision audit
//!
//! store: persistence contracts, optimistic concurrency on `revision`
//! scheduler: named periodic jobs, shared cancellation
//! notify: bounded outbound progress queue
//! metrics: Prometheus counters for all of the above
//! ```
//!
//! # Design Principles
//!
//! - **Resumable**: every workflow step commits its phase before moving on,
//!   so a crashed or cancelled run continues where it stopped
//! - **Single writer per row**: stale copies are rejected by the store
//! - **Auditable**: each draw can be recorded together with the frame it
//!   was taken from
//!
//! # Example
//!
//! ```no_run
//! use optical_oracle::{
//!     capture::MockCamera,
//!     oracle::EntropyOracle,
//!     selection::{EntropySelector, Selector},
//! };
//! use optical_oracle::capture::{Camera, CaptureConfig};
//!
//! let mut camera = MockCamera::with_seed(7);
//! camera.open(&CaptureConfig::with_dimensions(64, 48)).unwrap();
//!
//! let selector = EntropySelector::new(camera, EntropyOracle::new());
//! let index = selector.select(1_000).unwrap();
//! assert!(index < 1_000);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod composite;
pub mod lottery;
pub mod metrics;
pub mod notify;
pub mod oracle;
pub mod scheduler;
pub mod selection;
pub mod store;
pub mod unity;

// Re-export commonly used types at crate root
pub use capture::{Camera, CaptureConfig, FileConfig, Frame, MockCamera};
pub use lottery::{Lottery, LotteryError, LotteryRunner, LotteryState};
pub use oracle::{EntropyDecision, EntropyOracle};
pub use scheduler::{CancellationToken, Scheduler};
pub use selection::{EntropySelector, ReplaySelector, SelectError, Selector};
pub use store::{MemoryStore, StoreError};
pub use unity::{Rank, Unifier, UnifyError, Unity, UnityMask, UnityPlanner, UnityState};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
