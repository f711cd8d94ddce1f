//! Progress notifications.
//!
//! Workflows publish flat progress snapshots into a bounded queue and never
//! block on it: when the queue is full the event is dropped and counted. A
//! dispatcher thread drains the queue into a [`NotificationSink`].

mod sink;

pub use sink::{LogSink, NotificationSink, SinkError};

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Outbound channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Unity phase and lead updates.
    UnityProgress,
    /// Lottery draw and countdown updates.
    LotteryProgress,
}

impl Channel {
    /// Wire name of the channel.
    pub fn name(self) -> &'static str {
        match self {
            Self::UnityProgress => "unity-progress",
            Self::LotteryProgress => "lottery-progress",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot of a unity being worked on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnityProgress {
    /// Address of the unity.
    pub mask: String,
    /// Rank as a leaf count (100, 1000 or 10000).
    pub rank: u32,
    /// Current phase state of the unity.
    pub phase: String,
    /// Recursion depth (0 for the unity picked by the worker).
    pub depth: usize,
    /// Progress within the phase, e.g. grace seconds elapsed.
    pub current: u64,
    /// Size of the phase, in the same unit as `current`.
    pub total: u64,
    /// Leads drawn so far.
    pub leads: Vec<u64>,
    /// Lead version of the unity.
    pub version: u32,
}

/// Snapshot of a lottery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotteryProgress {
    /// Identifier of the lottery.
    pub lottery_id: u64,
    /// Lifecycle state.
    pub state: String,
    /// Winner target (0 while waiting).
    pub total_winners: u64,
    /// Winners in draw order.
    pub winners: Vec<u64>,
    /// Winner drawn by this step, if any.
    pub last_winner: Option<u64>,
    /// Length of the enjoy countdown in seconds (0 outside it).
    pub enjoy_total: u64,
    /// Seconds of the enjoy countdown elapsed.
    pub enjoy_current: u64,
}

/// One outbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Published on [`Channel::UnityProgress`].
    Unity(UnityProgress),
    /// Published on [`Channel::LotteryProgress`].
    Lottery(LotteryProgress),
}

impl Notification {
    /// Channel the event is published on.
    pub fn channel(&self) -> Channel {
        match self {
            Self::Unity(_) => Channel::UnityProgress,
            Self::Lottery(_) => Channel::LotteryProgress,
        }
    }

    /// JSON payload sent on the channel.
    pub fn payload(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Unity(p) => serde_json::to_string(p),
            Self::Lottery(p) => serde_json::to_string(p),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    dropped: AtomicU64,
}

/// Producer side of the outbound queue.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: Option<SyncSender<Notification>>,
    counters: Arc<Counters>,
}

impl Notifier {
    /// Creates a queue holding at most `capacity` pending events.
    pub fn channel(capacity: usize) -> (Self, Receiver<Notification>) {
        let (sender, receiver) = mpsc::sync_channel(capacity);
        (
            Self {
                sender: Some(sender),
                counters: Arc::default(),
            },
            receiver,
        )
    }

    /// A notifier that discards everything.
    pub fn disabled() -> Self {
        Self {
            sender: None,
            counters: Arc::default(),
        }
    }

    /// Queues an event without blocking.
    pub fn publish(&self, notification: Notification) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(notification) {
            Ok(()) => {
                self.counters.published.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(n)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(channel = %n.channel(), "Notification queue full, dropping event");
            }
            Err(TrySendError::Disconnected(n)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(channel = %n.channel(), "Notification dispatcher gone");
            }
        }
    }

    /// Publishes unity progress.
    pub fn unity(&self, progress: UnityProgress) {
        self.publish(Notification::Unity(progress));
    }

    /// Publishes lottery progress.
    pub fn lottery(&self, progress: LotteryProgress) {
        self.publish(Notification::Lottery(progress));
    }

    /// Events accepted by the queue.
    pub fn published(&self) -> u64 {
        self.counters.published.load(Ordering::Relaxed)
    }

    /// Events dropped because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }
}

/// Drains `receiver` into `sink` until every [`Notifier`] is dropped.
pub fn spawn_dispatcher(
    receiver: Receiver<Notification>,
    mut sink: Box<dyn NotificationSink>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("notify-dispatch".into())
        .spawn(move || {
            for notification in receiver {
                let channel = notification.channel();
                let payload = match notification.payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::error!(%channel, error = %e, "Failed to encode notification");
                        continue;
                    }
                };
                if let Err(e) = sink.publish(channel, &payload) {
                    tracing::warn!(%channel, error = %e, "Notification sink failed");
                }
            }
            tracing::debug!("Notification dispatcher stopped");
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Collecting(Arc<Mutex<Vec<(Channel, String)>>>);

    impl NotificationSink for Collecting {
        fn publish(&mut self, channel: Channel, payload: &str) -> Result<(), SinkError> {
            self.0.lock().unwrap().push((channel, payload.to_string()));
            Ok(())
        }
    }

    fn lottery_event(id: u64) -> LotteryProgress {
        LotteryProgress {
            lottery_id: id,
            state: "running".into(),
            total_winners: 12,
            winners: vec![3],
            last_winner: Some(3),
            enjoy_total: 0,
            enjoy_current: 0,
        }
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (notifier, _receiver) = Notifier::channel(1);
        notifier.lottery(lottery_event(1));
        notifier.lottery(lottery_event(2));

        assert_eq!(notifier.published(), 1);
        assert_eq!(notifier.dropped(), 1);
    }

    #[test]
    fn test_disabled_notifier_is_silent() {
        let notifier = Notifier::disabled();
        notifier.lottery(lottery_event(1));
        assert_eq!(notifier.published(), 0);
        assert_eq!(notifier.dropped(), 0);
    }

    #[test]
    fn test_dispatcher_delivers_json() {
        let (notifier, receiver) = Notifier::channel(8);
        let sink = Collecting::default();
        let handle = spawn_dispatcher(receiver, Box::new(sink.clone())).unwrap();

        notifier.lottery(lottery_event(7));
        drop(notifier);
        handle.join().unwrap();

        let delivered = sink.0.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0.name(), "lottery-progress");
        let decoded: LotteryProgress = serde_json::from_str(&delivered[0].1).unwrap();
        assert_eq!(decoded, lottery_event(7));
    }
}
