//! Decision audit records and their background recorder.

use crate::store::DecisionStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Audit record of one oracle draw. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntropyDecision {
    /// Store-assigned identifier (0 until persisted).
    pub id: u64,
    /// The draw value in `[0, 1)`.
    pub output: f64,
    /// Compressed input the value was derived from.
    pub artifact: Vec<u8>,
    /// MIME type of `artifact`.
    pub content_type: String,
    /// BLAKE3 hex digest of `artifact`.
    pub digest: String,
    /// When the draw was made.
    pub created_at: DateTime<Utc>,
}

impl EntropyDecision {
    /// Creates an unsaved decision, computing the artifact digest.
    pub fn new(output: f64, artifact: Vec<u8>, content_type: impl Into<String>) -> Self {
        let digest = blake3::hash(&artifact).to_hex().to_string();
        Self {
            id: 0,
            output,
            artifact,
            content_type: content_type.into(),
            digest,
            created_at: Utc::now(),
        }
    }

    /// Returns true if the artifact still matches the recorded digest.
    pub fn verify(&self) -> bool {
        blake3::hash(&self.artifact).to_hex().as_str() == self.digest
    }
}

/// Persists decisions off the draw path.
///
/// `record` never blocks: when the queue is full or the writer is gone the
/// decision is dropped and a warning logged.
#[derive(Clone)]
pub struct DecisionRecorder {
    sender: SyncSender<EntropyDecision>,
    dropped: Arc<AtomicU64>,
}

impl DecisionRecorder {
    /// Starts the writer thread. It exits once every recorder clone is dropped.
    pub fn spawn(
        store: Arc<dyn DecisionStore>,
        capacity: usize,
    ) -> std::io::Result<(Self, JoinHandle<()>)> {
        let (sender, receiver) = mpsc::sync_channel::<EntropyDecision>(capacity.max(1));
        let handle = thread::Builder::new()
            .name("decision-recorder".into())
            .spawn(move || {
                for decision in receiver {
                    match store.save_decision(decision) {
                        Ok(saved) => tracing::trace!(id = saved.id, "Decision recorded"),
                        Err(e) => tracing::warn!(error = %e, "Failed to persist decision"),
                    }
                }
                tracing::debug!("Decision recorder stopped");
            })?;

        Ok((
            Self {
                sender,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            handle,
        ))
    }

    /// Queues a decision for persistence.
    pub fn record(&self, decision: EntropyDecision) {
        match self.sender.try_send(decision) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Decision queue full, dropping decision");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Decision recorder stopped, dropping decision");
            }
        }
    }

    /// Returns how many decisions were dropped.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_digest_verifies() {
        let mut decision = EntropyDecision::new(0.25, vec![1, 2, 3], "application/octet-stream");
        assert!(decision.verify());

        decision.artifact[0] = 9;
        assert!(!decision.verify());
    }

    #[test]
    fn test_recorder_persists_in_background() {
        let store = Arc::new(MemoryStore::new());
        let (recorder, handle) = DecisionRecorder::spawn(store.clone(), 4).unwrap();

        recorder.record(EntropyDecision::new(0.5, vec![7], "application/octet-stream"));
        drop(recorder);
        handle.join().unwrap();

        let decisions = store.decisions().unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].output, 0.5);
        assert!(decisions[0].id > 0);
    }
}
