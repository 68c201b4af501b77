//! Generic streaming plumbing: the egress-side state machine and the
//! keepalive watchdog the policy orchestrator's drainer consults.
//!
//! Grounds "bounded channels with explicit close/shutdown" (Design Notes
//! §9) on `tokio::sync::mpsc`, and the watchdog on `tokio::time::Instant`
//! reset-on-activity, the idiomatic Rust reading of a per-chunk idle timer.

use crate::api::Api;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

/// How often the drainer polls the egress queue for a new chunk while
/// waiting to observe `feed_complete`.
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The egress-side state machine named in the streaming orchestrator
/// design. Advisory — callers may track it for logging/metrics; the
/// drainer's actual control flow is driven by `feed_complete` and the
/// egress channel directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EgressState {
    Producing,
    Finishing,
    Draining,
    Closed,
}

/// Resets on every forwarded chunk; the drainer checks this against the
/// configured idle window whenever a poll times out with no activity and
/// `feed_complete` not yet set.
pub struct Watchdog {
    last_activity: Mutex<Instant>,
    idle_window: Duration,
    expired: AtomicBool,
}

impl Watchdog {
    pub fn new(idle_window: Duration) -> Self {
        Self {
            last_activity: Mutex::new(Instant::now()),
            idle_window,
            expired: AtomicBool::new(false),
        }
    }

    /// Reset the idle clock. Called by the drainer on every forwarded
    /// chunk, and by policies doing long work via
    /// [`crate::policy::StreamingContext::keepalive`].
    pub async fn touch(&self) {
        *self.last_activity.lock().await = Instant::now();
    }

    /// True once no activity has been observed for the configured idle
    /// window. Sticky: once expired, stays expired for the life of this
    /// watchdog.
    pub async fn is_expired(&self) -> bool {
        if self.expired.load(Ordering::SeqCst) {
            return true;
        }
        let elapsed = self.last_activity.lock().await.elapsed();
        if elapsed >= self.idle_window {
            self.expired.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }
}

/// The two channels a streaming transaction's feeder/drainer pair hands
/// off through: `egress` is fed by policy hooks (via
/// [`crate::policy::StreamingContext`]), `outgoing` is what the orchestrator
/// hands back to the caller as a [`crate::backend::ChunkStream`]-shaped
/// stream of finished chunks. Two channels rather than one so the drainer
/// can keep forwarding whatever the feeder already queued even after the
/// feeder task itself has exited.
pub struct StreamingChannels<A: Api> {
    pub egress_tx: mpsc::Sender<A::Chunk>,
    pub egress_rx: mpsc::Receiver<A::Chunk>,
    pub outgoing_tx: mpsc::Sender<Result<A::Chunk, crate::error::Error>>,
    pub outgoing_rx: mpsc::Receiver<Result<A::Chunk, crate::error::Error>>,
}

impl<A: Api> StreamingChannels<A> {
    pub fn new(capacity: usize) -> Self {
        let (egress_tx, egress_rx) = mpsc::channel(capacity);
        let (outgoing_tx, outgoing_rx) = mpsc::channel(capacity);
        Self {
            egress_tx,
            egress_rx,
            outgoing_tx,
            outgoing_rx,
        }
    }
}

/// Drains `egress_rx` into `outgoing_tx` until `feed_complete` is observed
/// with the queue empty, touching `watchdog` on every forwarded chunk.
///
/// Two-phase termination: the feeder task sets `feed_complete` only after
/// its own `on_stream_complete` hook has returned, so any tail chunk a
/// policy emits from that hook is already queued by the time this loop
/// notices completion — `flush_remaining` then drains it before the
/// `outgoing` channel is closed. This runs as an independent task so a
/// feeder error never starves a client of chunks already queued.
///
/// Also owns watchdog enforcement: on every poll timeout where
/// `feed_complete` is not yet set, it checks `watchdog.is_expired()`. If the
/// idle window has elapsed with no forwarded chunk and no keepalive, it
/// aborts the feeder via `feeder_abort` (the backend chunk source may be
/// blocked indefinitely on I/O, so the feeder can't be expected to notice
/// on its own), then flushes whatever is already queued and returns — the
/// client sees a clean end, not a hang.
pub async fn run_drainer<A: Api>(
    mut egress_rx: mpsc::Receiver<A::Chunk>,
    outgoing_tx: mpsc::Sender<Result<A::Chunk, crate::error::Error>>,
    feed_complete: Arc<AtomicBool>,
    watchdog: Arc<Watchdog>,
    feeder_abort: tokio::task::AbortHandle,
) {
    loop {
        match tokio::time::timeout(DRAIN_POLL_INTERVAL, egress_rx.recv()).await {
            Ok(Some(chunk)) => {
                watchdog.touch().await;
                if outgoing_tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
            Ok(None) => {
                flush_remaining(&mut egress_rx, &outgoing_tx).await;
                return;
            }
            Err(_) => {
                if feed_complete.load(Ordering::SeqCst) {
                    flush_remaining(&mut egress_rx, &outgoing_tx).await;
                    return;
                }
                if watchdog.is_expired().await {
                    feeder_abort.abort();
                    flush_remaining(&mut egress_rx, &outgoing_tx).await;
                    return;
                }
            }
        }
    }
}

/// Drains every chunk already queued in `egress_rx` without waiting for
/// more, via `try_recv` — called once the feeder is known to be done, so
/// the remaining queue is finite.
async fn flush_remaining<A: Api>(
    egress_rx: &mut mpsc::Receiver<A::Chunk>,
    outgoing_tx: &mpsc::Sender<Result<A::Chunk, crate::error::Error>>,
) {
    while let Ok(chunk) = egress_rx.try_recv() {
        if outgoing_tx.send(Ok(chunk)).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_watchdog_is_not_expired() {
        let watchdog = Watchdog::new(Duration::from_secs(30));
        assert!(!watchdog.is_expired().await);
    }

    #[tokio::test]
    async fn test_watchdog_expires_after_idle_window_elapses() {
        let watchdog = Watchdog::new(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(watchdog.is_expired().await);
    }

    #[tokio::test]
    async fn test_touch_resets_the_idle_clock() {
        let watchdog = Watchdog::new(Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(20)).await;
        watchdog.touch().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!watchdog.is_expired().await);
    }

    use crate::api::OpenAiApi;
    use crate::wire::openai::{OpenAiChoice, OpenAiChunk, OpenAiDelta};

    fn chunk(text: &str) -> OpenAiChunk {
        OpenAiChunk {
            id: "c".into(),
            choices: vec![OpenAiChoice {
                index: 0,
                delta: OpenAiDelta {
                    role: None,
                    content: Some(text.to_string()),
                    tool_calls: None,
                },
                finish_reason: None,
            }],
        }
    }

    fn spawn_noop_task() -> tokio::task::AbortHandle {
        tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
        .abort_handle()
    }

    #[tokio::test]
    async fn test_drainer_forwards_queued_chunks_then_closes_after_feed_complete() {
        let channels = StreamingChannels::<OpenAiApi>::new(8);
        let feed_complete = Arc::new(AtomicBool::new(false));
        let watchdog = Arc::new(Watchdog::new(Duration::from_secs(30)));

        channels.egress_tx.send(chunk("a")).await.unwrap();
        channels.egress_tx.send(chunk("b")).await.unwrap();

        let drainer = tokio::spawn(run_drainer::<OpenAiApi>(
            channels.egress_rx,
            channels.outgoing_tx,
            feed_complete.clone(),
            watchdog,
            spawn_noop_task(),
        ));

        feed_complete.store(true, Ordering::SeqCst);
        drop(channels.egress_tx);

        let mut outgoing_rx = channels.outgoing_rx;
        let first = outgoing_rx.recv().await.unwrap().unwrap();
        let second = outgoing_rx.recv().await.unwrap().unwrap();
        assert_eq!(first.choices[0].delta.content.as_deref(), Some("a"));
        assert_eq!(second.choices[0].delta.content.as_deref(), Some("b"));
        assert!(outgoing_rx.recv().await.is_none());

        drainer.await.unwrap();
    }

    #[tokio::test]
    async fn test_drainer_flushes_tail_chunk_queued_after_feed_complete_is_set() {
        let channels = StreamingChannels::<OpenAiApi>::new(8);
        let feed_complete = Arc::new(AtomicBool::new(false));
        let watchdog = Arc::new(Watchdog::new(Duration::from_secs(30)));

        let drainer = tokio::spawn(run_drainer::<OpenAiApi>(
            channels.egress_rx,
            channels.outgoing_tx,
            feed_complete.clone(),
            watchdog,
            spawn_noop_task(),
        ));

        // Simulate a tail chunk emitted from `on_stream_complete` right
        // before the feeder marks itself done.
        channels.egress_tx.send(chunk("tail")).await.unwrap();
        feed_complete.store(true, Ordering::SeqCst);
        drop(channels.egress_tx);

        let mut outgoing_rx = channels.outgoing_rx;
        let tail = outgoing_rx.recv().await.unwrap().unwrap();
        assert_eq!(tail.choices[0].delta.content.as_deref(), Some("tail"));

        drainer.await.unwrap();
    }

    #[tokio::test]
    async fn test_drainer_aborts_feeder_and_closes_when_watchdog_expires() {
        let channels = StreamingChannels::<OpenAiApi>::new(8);
        let feed_complete = Arc::new(AtomicBool::new(false));
        let watchdog = Arc::new(Watchdog::new(Duration::from_millis(1)));

        let stuck_feeder = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let feeder_abort = stuck_feeder.abort_handle();

        let drainer = tokio::spawn(run_drainer::<OpenAiApi>(
            channels.egress_rx,
            channels.outgoing_tx,
            feed_complete.clone(),
            watchdog,
            feeder_abort,
        ));

        // `egress_tx` stays open with nothing sent: the drainer must time
        // out on its own idle poll (not on channel closure) and notice the
        // expired watchdog.
        drainer.await.unwrap();
        drop(channels.egress_tx);
        assert!(stuck_feeder.await.unwrap_err().is_cancelled());

        let mut outgoing_rx = channels.outgoing_rx;
        assert!(outgoing_rx.recv().await.is_none());
    }
}
