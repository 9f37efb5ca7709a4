//! Vellum Recording Engine
//!
//! Decouples issuing 2D drawing operations from executing them against a
//! real rendering backend. The producer thread records operations without
//! stalling on pixel work; the pixel work happens later, inline or on one
//! dedicated painter thread.
//!
//! The pipeline:
//!
//! 1. [`RecordingTarget`] intercepts every drawing call and turns it into a
//!    [`DrawCommand`] appended to its per-target [`TargetQueue`].
//! 2. A [`TransactionManager`] batches the queues touched within one
//!    begin/end window and fires them as a unit.
//! 3. Replay executes every command against the live backend in record
//!    order, then resets the queue's storage for the next generation.
//!
//! # Example
//!
//! ```ignore
//! let mut manager = TransactionManager::new();
//! let target = RecordingTarget::new(host.clone());
//!
//! manager.begin_transaction();
//! target.fill_rect(rect, &Color::RED.into(), &DrawOptions::default());
//! manager.append_queue(target.queue());
//! manager.end_transaction();
//!
//! manager.post_apply_last_async(None);
//! manager.wait_all();
//! ```

pub mod arena;
pub mod command;
pub mod recording;
pub mod target;
pub mod testing;
pub mod transaction;

pub use arena::{CommandArena, CommandOffset};
pub use command::{CommandKind, DrawCommand};
pub use recording::{BackendGuard, RecordingBuffer, TargetHost, TargetQueue, TargetQueueHandle};
pub use target::RecordingTarget;
pub use testing::{BackendCall, PixelBackend, TestHost, TraceBackend};
pub use transaction::{
    CompletionEvent, ReplyChannel, ReplyHandle, TransactionManager, MAX_IN_FLIGHT,
};
