//! Per-target recording buffers
//!
//! A [`RecordingBuffer`] owns one [`CommandArena`] and the ordered offsets of
//! every pending command for a single logical draw target. Insertion order is
//! execution order. The buffer itself is not thread-safe; [`TargetQueue`]
//! wraps it in a lock and pairs it with the owner hooks needed to reach the
//! backend, forming the unit that transactions share across threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{MappedMutexGuard, Mutex};

use vellum_core::{Backend, Matrix};

use crate::arena::{CommandArena, CommandOffset};
use crate::command::DrawCommand;

/// Exclusive access to a live backend, held for the duration of a replay.
///
/// Dropping the guard is the unlock.
pub type BackendGuard<'a> = MappedMutexGuard<'a, dyn Backend>;

/// Hooks the owner of a concrete draw target must supply.
///
/// The recording side never assumes it may touch the backend without the
/// owner's synchronization: all backend access goes through [`lock`].
///
/// [`lock`]: TargetHost::lock
pub trait TargetHost: Send + Sync {
    /// Acquire the owner's lock and return the live backend, or `None` if
    /// the target has been torn down.
    fn lock(&self) -> Option<BackendGuard<'_>>;
}

/// Ordered pending commands for one logical draw target.
#[derive(Default)]
pub struct RecordingBuffer {
    arena: CommandArena,
    order: Vec<CommandOffset>,
}

impl RecordingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a command. Execution order is append order.
    pub fn append(&mut self, command: DrawCommand) {
        let offset = self.arena.alloc(command);
        self.order.push(offset);
    }

    /// The most recently appended command, if any.
    pub fn last(&self) -> Option<&DrawCommand> {
        self.order.last().map(|&offset| self.arena.get(offset))
    }

    /// Record a transform change, collapsing runs of consecutive
    /// `SetTransform`s into one command.
    ///
    /// This is the single sanctioned post-construction mutation: only the
    /// matrix of the immediately preceding `SetTransform` is rewritten, and
    /// append and rewrite happen on the same writer thread.
    pub fn coalesce_transform(&mut self, transform: Matrix) {
        if let Some(&offset) = self.order.last() {
            if let DrawCommand::SetTransform { transform: prior } = self.arena.get_mut(offset) {
                *prior = transform;
                return;
            }
        }
        self.append(DrawCommand::SetTransform { transform });
    }

    /// Execute every pending command in order, then reset for the next
    /// generation. A buffer with nothing pending is a no-op.
    ///
    /// The caller must already hold exclusive access to `backend`.
    pub fn replay(&mut self, backend: &mut dyn Backend) {
        if self.order.is_empty() {
            return;
        }
        tracing::trace!(commands = self.order.len(), "replaying buffer");
        for &offset in &self.order {
            self.arena.get(offset).execute(backend, None);
        }
        self.order.clear();
        self.arena.clear();
    }

    pub fn pending(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// The shareable per-target unit: one locked [`RecordingBuffer`] plus the
/// owner hooks that gate backend access.
///
/// Producers append through it; transactions hold `Arc`s to it and replay it
/// from whichever thread fires. The buffer lock makes the handoff
/// whole-buffer: appends and replay serialize, they never interleave
/// per-command.
pub struct TargetQueue {
    buffer: Mutex<RecordingBuffer>,
    host: Arc<dyn TargetHost>,
    /// Set once any replay of this queue has executed commands; gates the
    /// facade's voluntary flush.
    replayed: AtomicBool,
}

pub type TargetQueueHandle = Arc<TargetQueue>;

impl TargetQueue {
    pub fn new(host: Arc<dyn TargetHost>) -> TargetQueueHandle {
        Arc::new(Self {
            buffer: Mutex::new(RecordingBuffer::new()),
            host,
            replayed: AtomicBool::new(false),
        })
    }

    pub fn host(&self) -> &Arc<dyn TargetHost> {
        &self.host
    }

    pub fn append(&self, command: DrawCommand) {
        self.buffer.lock().append(command);
    }

    /// See [`RecordingBuffer::coalesce_transform`].
    pub fn set_transform(&self, transform: Matrix) {
        self.buffer.lock().coalesce_transform(transform);
    }

    pub fn pending(&self) -> usize {
        self.buffer.lock().pending()
    }

    /// Replay all pending commands against the owner's backend.
    ///
    /// Panics if commands are pending but the host no longer has a live
    /// backend: a buffer must never be asked to replay without one.
    pub fn replay(&self) {
        let mut buffer = self.buffer.lock();
        if buffer.is_empty() {
            return;
        }
        let mut backend = self.host.lock().unwrap_or_else(|| {
            panic!(
                "replay requested with {} pending commands but no live backend",
                buffer.pending()
            )
        });
        buffer.replay(&mut *backend);
        self.replayed.store(true, Ordering::Release);
    }

    /// Whether any replay of this queue has ever executed commands.
    pub fn has_replayed(&self) -> bool {
        self.replayed.load(Ordering::Acquire)
    }

    /// Run `f` with the buffer locked. For owner-side inspection and
    /// recording; replay still goes through [`replay`](Self::replay).
    pub fn with_buffer<R>(&self, f: impl FnOnce(&mut RecordingBuffer) -> R) -> R {
        f(&mut self.buffer.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BackendCall, TestHost, TraceBackend};
    use vellum_core::{Color, DrawOptions, Rect};

    fn fill(rect: Rect) -> DrawCommand {
        DrawCommand::FillRect {
            rect,
            pattern: Color::RED.into(),
            options: DrawOptions::default(),
        }
    }

    #[test]
    fn test_replay_preserves_append_order() {
        let mut buffer = RecordingBuffer::new();
        buffer.append(fill(Rect::new(0.0, 0.0, 1.0, 1.0)));
        buffer.append(DrawCommand::PushClipRect {
            rect: Rect::new(0.0, 0.0, 2.0, 2.0),
        });
        buffer.append(fill(Rect::new(3.0, 3.0, 1.0, 1.0)));

        let mut backend = TraceBackend::new();
        buffer.replay(&mut backend);

        assert_eq!(
            backend.calls(),
            &[
                BackendCall::FillRect(Rect::new(0.0, 0.0, 1.0, 1.0)),
                BackendCall::PushClipRect(Rect::new(0.0, 0.0, 2.0, 2.0)),
                BackendCall::FillRect(Rect::new(3.0, 3.0, 1.0, 1.0)),
            ]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_empty_replay_is_noop() {
        let mut buffer = RecordingBuffer::new();
        let mut backend = TraceBackend::new();
        buffer.replay(&mut backend);
        buffer.replay(&mut backend);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_consecutive_transforms_coalesce() {
        let mut buffer = RecordingBuffer::new();
        buffer.coalesce_transform(Matrix::IDENTITY);
        buffer.coalesce_transform(Matrix::scale(2.0, 2.0));
        assert_eq!(buffer.pending(), 1);

        let mut backend = TraceBackend::new();
        buffer.replay(&mut backend);
        assert_eq!(backend.transforms(), &[Matrix::scale(2.0, 2.0)]);
    }

    #[test]
    fn test_transform_after_draw_does_not_coalesce() {
        let mut buffer = RecordingBuffer::new();
        buffer.coalesce_transform(Matrix::IDENTITY);
        buffer.append(fill(Rect::new(0.0, 0.0, 1.0, 1.0)));
        buffer.coalesce_transform(Matrix::scale(2.0, 2.0));
        assert_eq!(buffer.pending(), 3);
    }

    #[test]
    fn test_queue_replay_through_host() {
        let host = TestHost::trace();
        let queue = TargetQueue::new(host.clone());
        queue.append(fill(Rect::new(1.0, 1.0, 1.0, 1.0)));
        queue.replay();
        assert_eq!(queue.pending(), 0);
        assert_eq!(host.trace_calls().len(), 1);
    }

    #[test]
    #[should_panic(expected = "no live backend")]
    fn test_replay_without_backend_panics() {
        let host = TestHost::trace();
        let queue = TargetQueue::new(host.clone());
        queue.append(fill(Rect::new(0.0, 0.0, 1.0, 1.0)));
        host.tear_down();
        queue.replay();
    }

    #[test]
    fn test_empty_queue_ignores_dead_host() {
        let host = TestHost::trace();
        let queue = TargetQueue::new(host.clone());
        host.tear_down();
        // Nothing pending, so the missing backend is not an error.
        queue.replay();
    }
}
