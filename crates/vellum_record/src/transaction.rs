//! Transaction batching and replay
//!
//! A transaction is a bounded batch of target queues whose replay is fired
//! and awaited as a unit. The manager keeps a ring of [`MAX_IN_FLIGHT`]
//! slots; transactions are begun, fired, and drained strictly in ring order,
//! which bounds the paint pipeline depth and gives transactions a total
//! order even on the asynchronous path.
//!
//! Replay runs either inline on the calling thread
//! ([`TransactionManager::apply_last_sync`]) or on the single dedicated
//! painter thread ([`TransactionManager::post_apply_last_async`]). There is
//! no painter pool: bounding concurrency to producer + one painter keeps
//! backend access trivially serializable per target.
//!
//! The manager is an explicitly constructed value the owning subsystem
//! creates and passes around. It defends against accidental misuse with
//! asserts, not against hostile callers: double-firing, appending outside a
//! begin/end window, and reusing an undrained slot are all bugs, and all
//! panic.

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;

use crate::recording::TargetQueueHandle;

/// Maximum transactions in flight before a drain is required.
pub const MAX_IN_FLIGHT: usize = 8;

/// How long a completion wait may go silent before it logs.
const WAIT_WARN_INTERVAL: Duration = Duration::from_secs(10);

// ─────────────────────────────────────────────────────────────────────────────
// Completion events
// ─────────────────────────────────────────────────────────────────────────────

struct EventInner {
    done: Mutex<bool>,
    cond: Condvar,
}

/// A reusable waitable flag: signaled once per transaction generation, reset
/// when the slot is reused.
#[derive(Clone)]
pub struct CompletionEvent {
    inner: Arc<EventInner>,
}

impl Default for CompletionEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionEvent {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EventInner {
                done: Mutex::new(false),
                cond: Condvar::new(),
            }),
        }
    }

    pub fn signal(&self) {
        *self.inner.done.lock() = true;
        self.inner.cond.notify_all();
    }

    pub fn reset(&self) {
        *self.inner.done.lock() = false;
    }

    pub fn is_signaled(&self) -> bool {
        *self.inner.done.lock()
    }

    /// Block until signaled. Deliberately has no timeout (a fired
    /// transaction always eventually completes), but logs a warning every
    /// [`WAIT_WARN_INTERVAL`] so a stuck painter is diagnosable.
    pub fn wait(&self) {
        let start = Instant::now();
        let mut done = self.inner.done.lock();
        while !*done {
            let timed_out = self
                .inner
                .cond
                .wait_for(&mut done, WAIT_WARN_INTERVAL)
                .timed_out();
            if timed_out && !*done {
                tracing::warn!(
                    elapsed_secs = start.elapsed().as_secs(),
                    "still waiting for transaction completion"
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reply channel
// ─────────────────────────────────────────────────────────────────────────────

/// An external message boundary whose reply can be held open until
/// asynchronous replay completes.
///
/// `start_deferring` runs on the producer thread before the paint job is
/// posted; `end_deferring` runs on the painter thread after the last
/// participant has replayed.
pub trait ReplyChannel: Send {
    fn start_deferring(&self);
    fn end_deferring(&self);
}

pub type ReplyHandle = Box<dyn ReplyChannel>;

// ─────────────────────────────────────────────────────────────────────────────
// Painter thread
// ─────────────────────────────────────────────────────────────────────────────

struct PaintJob {
    participants: SmallVec<[TargetQueueHandle; 4]>,
    reply: Option<ReplyHandle>,
    done: CompletionEvent,
}

/// The single dedicated off-main paint worker, shared by all transactions.
struct PainterThread {
    sender: Option<Sender<PaintJob>>,
    join: Option<JoinHandle<()>>,
}

impl PainterThread {
    fn spawn() -> Self {
        let (sender, receiver) = mpsc::channel::<PaintJob>();
        let join = thread::Builder::new()
            .name("vellum-painter".into())
            .spawn(move || {
                tracing::debug!("painter thread started");
                while let Ok(job) = receiver.recv() {
                    for queue in &job.participants {
                        queue.replay();
                    }
                    if let Some(reply) = &job.reply {
                        reply.end_deferring();
                    }
                    job.done.signal();
                }
                tracing::debug!("painter thread stopped");
            })
            .expect("failed to spawn painter thread");
        Self {
            sender: Some(sender),
            join: Some(join),
        }
    }

    fn post(&self, job: PaintJob) {
        self.sender
            .as_ref()
            .and_then(|sender| sender.send(job).ok())
            .expect("painter thread is gone");
    }
}

impl Drop for PainterThread {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        drop(self.sender.take());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// The transaction ring
// ─────────────────────────────────────────────────────────────────────────────

struct TransactionSlot {
    participants: SmallVec<[TargetQueueHandle; 4]>,
    done: CompletionEvent,
    fired: bool,
}

impl TransactionSlot {
    fn new() -> Self {
        Self {
            participants: SmallVec::new(),
            done: CompletionEvent::new(),
            fired: false,
        }
    }

    /// Fully drained and ready for reuse by a later generation.
    fn drained(&self) -> bool {
        !self.fired && self.participants.is_empty()
    }
}

/// Batches target queues into transactions and fires them sync or async.
///
/// Single well-behaved caller assumed: the producer thread owns the manager
/// and is the only thread that begins, fires, and waits.
pub struct TransactionManager {
    slots: Vec<TransactionSlot>,
    /// Slot of the most recently begun transaction; `None` when no
    /// transactions are outstanding.
    current: Option<usize>,
    open: bool,
    painter: PainterThread,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_IN_FLIGHT).map(|_| TransactionSlot::new()).collect(),
            current: None,
            open: false,
            painter: PainterThread::spawn(),
        }
    }

    /// Open the next ring slot for appends.
    ///
    /// Panics if a transaction is already open, or if the slot coming up for
    /// reuse has not been drained — more than [`MAX_IN_FLIGHT`] transactions
    /// in flight is a pipeline bug, not a condition to absorb silently.
    pub fn begin_transaction(&mut self) {
        assert!(!self.open, "begin_transaction with a transaction open");
        let next = self.current.map_or(0, |c| (c + 1) % MAX_IN_FLIGHT);
        let slot = &mut self.slots[next];
        assert!(
            slot.drained(),
            "transaction ring full: slot {} has not been drained",
            next
        );
        slot.done.reset();
        self.current = Some(next);
        self.open = true;
        tracing::trace!(slot = next, "transaction begun");
    }

    /// Enroll a target queue in the open transaction.
    pub fn append_queue(&mut self, queue: TargetQueueHandle) {
        assert!(self.open, "append_queue outside an open transaction");
        let slot = self.current.expect("open transaction with no slot");
        self.slots[slot].participants.push(queue);
    }

    /// Close the open transaction to further appends.
    pub fn end_transaction(&mut self) {
        assert!(self.open, "end_transaction without an open transaction");
        self.open = false;
    }

    /// Replay the last transaction on the calling thread.
    ///
    /// Participants replay in append order: work requested earlier must be
    /// visible no later than work requested after it. The slot is drained
    /// immediately and never counts against the ring depth.
    pub fn apply_last_sync(&mut self) {
        assert!(!self.open, "apply_last_sync inside begin/end");
        let index = self.current.expect("apply_last_sync with no transaction");
        let slot = &mut self.slots[index];
        assert!(!slot.fired, "transaction fired twice");
        for queue in &slot.participants {
            queue.replay();
        }
        slot.participants.clear();
        slot.done.signal();
        tracing::trace!(slot = index, "transaction applied synchronously");
    }

    /// Fire the last transaction on the painter thread.
    ///
    /// If a reply channel is supplied, its response is deferred before the
    /// job is posted and resumed by the painter after the last participant
    /// replays, so the original caller is not unblocked until the pixels
    /// exist. Posting itself never blocks the producer.
    pub fn post_apply_last_async(&mut self, reply: Option<ReplyHandle>) {
        assert!(!self.open, "post_apply_last_async inside begin/end");
        let index = self
            .current
            .expect("post_apply_last_async with no transaction");
        let slot = &mut self.slots[index];
        assert!(!slot.fired, "transaction fired twice");
        slot.fired = true;
        if let Some(reply) = &reply {
            reply.start_deferring();
        }
        let job = PaintJob {
            participants: std::mem::take(&mut slot.participants),
            reply,
            done: slot.done.clone(),
        };
        tracing::debug!(slot = index, "transaction posted to painter");
        self.painter.post(job);
    }

    /// Drain every fired transaction, oldest first, then reset the ring.
    ///
    /// This is the producer's one blocking point. Waits have no timeout;
    /// see [`CompletionEvent::wait`].
    pub fn wait_all(&mut self) {
        assert!(!self.open, "wait_all inside begin/end");
        let Some(current) = self.current else {
            return;
        };
        // Oldest outstanding slot first, ending at the most recent.
        for step in 1..=MAX_IN_FLIGHT {
            let index = (current + step) % MAX_IN_FLIGHT;
            let slot = &mut self.slots[index];
            if !slot.fired {
                continue;
            }
            slot.done.wait();
            slot.done.reset();
            slot.fired = false;
            tracing::trace!(slot = index, "transaction drained");
        }
        self.current = None;
    }

    /// Whether any transaction has been begun and not yet drained.
    pub fn has_outstanding(&self) -> bool {
        self.current.is_some()
    }
}

impl Drop for TransactionManager {
    fn drop(&mut self) {
        if self.open {
            tracing::warn!("transaction manager dropped with an open transaction");
            self.open = false;
        }
        self.wait_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::DrawCommand;
    use crate::recording::TargetQueue;
    use crate::testing::TestHost;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vellum_core::{Color, DrawOptions, Rect};

    fn fill(rect: Rect) -> DrawCommand {
        DrawCommand::FillRect {
            rect,
            pattern: Color::RED.into(),
            options: DrawOptions::default(),
        }
    }

    #[test]
    fn test_sync_apply_replays_in_participant_order() {
        let host_a = TestHost::trace();
        let host_b = TestHost::trace();
        let queue_a = TargetQueue::new(host_a.clone());
        let queue_b = TargetQueue::new(host_b.clone());
        queue_a.append(fill(Rect::new(0.0, 0.0, 1.0, 1.0)));
        queue_b.append(fill(Rect::new(2.0, 2.0, 1.0, 1.0)));

        let mut manager = TransactionManager::new();
        manager.begin_transaction();
        manager.append_queue(queue_a.clone());
        manager.append_queue(queue_b.clone());
        manager.end_transaction();
        manager.apply_last_sync();

        assert_eq!(queue_a.pending(), 0);
        assert_eq!(queue_b.pending(), 0);
        assert_eq!(host_a.trace_calls().len(), 1);
        assert_eq!(host_b.trace_calls().len(), 1);
    }

    #[test]
    fn test_async_apply_completes_on_wait_all() {
        let host = TestHost::trace();
        let queue = TargetQueue::new(host.clone());
        queue.append(fill(Rect::new(0.0, 0.0, 1.0, 1.0)));

        let mut manager = TransactionManager::new();
        manager.begin_transaction();
        manager.append_queue(queue.clone());
        manager.end_transaction();
        manager.post_apply_last_async(None);
        manager.wait_all();

        assert_eq!(queue.pending(), 0);
        assert_eq!(host.trace_calls().len(), 1);
        assert!(!manager.has_outstanding());
    }

    #[test]
    fn test_reply_deferred_until_replay_completes() {
        struct CountingReply {
            starts: Arc<AtomicUsize>,
            ends: Arc<AtomicUsize>,
        }
        impl ReplyChannel for CountingReply {
            fn start_deferring(&self) {
                self.starts.fetch_add(1, Ordering::SeqCst);
            }
            fn end_deferring(&self) {
                self.ends.fetch_add(1, Ordering::SeqCst);
            }
        }

        let starts = Arc::new(AtomicUsize::new(0));
        let ends = Arc::new(AtomicUsize::new(0));
        let host = TestHost::trace();
        let queue = TargetQueue::new(host);
        queue.append(fill(Rect::new(0.0, 0.0, 1.0, 1.0)));

        let mut manager = TransactionManager::new();
        manager.begin_transaction();
        manager.append_queue(queue);
        manager.end_transaction();

        manager.post_apply_last_async(Some(Box::new(CountingReply {
            starts: starts.clone(),
            ends: ends.clone(),
        })));
        // Deferral starts on this thread, before the painter runs.
        assert_eq!(starts.load(Ordering::SeqCst), 1);

        manager.wait_all();
        assert_eq!(ends.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "ring full")]
    fn test_ring_capacity_overflow_panics() {
        let host = TestHost::trace();
        let mut manager = TransactionManager::new();
        for _ in 0..MAX_IN_FLIGHT + 1 {
            manager.begin_transaction();
            manager.append_queue(TargetQueue::new(host.clone()));
            manager.end_transaction();
            manager.post_apply_last_async(None);
        }
    }

    #[test]
    #[should_panic(expected = "fired twice")]
    fn test_double_fire_panics() {
        let host = TestHost::trace();
        let mut manager = TransactionManager::new();
        manager.begin_transaction();
        manager.append_queue(TargetQueue::new(host));
        manager.end_transaction();
        manager.post_apply_last_async(None);
        manager.post_apply_last_async(None);
    }

    #[test]
    #[should_panic(expected = "outside an open transaction")]
    fn test_append_after_end_panics() {
        let host = TestHost::trace();
        let mut manager = TransactionManager::new();
        manager.begin_transaction();
        manager.end_transaction();
        manager.append_queue(TargetQueue::new(host));
    }

    #[test]
    #[should_panic(expected = "transaction open")]
    fn test_nested_begin_panics() {
        let mut manager = TransactionManager::new();
        manager.begin_transaction();
        manager.begin_transaction();
    }

    #[test]
    fn test_wait_all_without_transactions_is_noop() {
        let mut manager = TransactionManager::new();
        manager.wait_all();
        assert!(!manager.has_outstanding());
    }

    #[test]
    fn test_event_signal_reset_cycle() {
        let event = CompletionEvent::new();
        assert!(!event.is_signaled());
        event.signal();
        assert!(event.is_signaled());
        event.wait(); // already signaled, returns immediately
        event.reset();
        assert!(!event.is_signaled());
    }

    #[test]
    fn test_sync_slot_is_immediately_reusable() {
        let host = TestHost::trace();
        let mut manager = TransactionManager::new();
        // More sync transactions than ring slots: none of them consume depth.
        for _ in 0..MAX_IN_FLIGHT * 2 {
            manager.begin_transaction();
            manager.append_queue(TargetQueue::new(host.clone()));
            manager.end_transaction();
            manager.apply_last_sync();
        }
    }
}
