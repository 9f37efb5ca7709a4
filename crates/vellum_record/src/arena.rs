//! The command arena
//!
//! A growable, contiguous pool of [`DrawCommand`]s addressed by opaque
//! offsets. Commands are placed at the end of the pool and never move or
//! compact within a generation, so an offset stays valid exactly until the
//! next [`CommandArena::clear`]. Clearing drops every live command in append
//! order and keeps the allocation, so storage is reused across transactions
//! without per-command heap churn.
//!
//! Offsets carry the generation they were minted in; resolving a stale
//! offset is a contract violation and panics.
//!
//! Single-thread mutation only. Cross-thread handoff happens at the
//! granularity of the whole owning buffer, never per command.

use crate::command::DrawCommand;

/// Opaque, generation-stamped address of a command inside an arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandOffset {
    index: u32,
    generation: u32,
}

/// Append-only command pool with bulk destruction.
#[derive(Default)]
pub struct CommandArena {
    commands: Vec<DrawCommand>,
    generation: u32,
}

impl CommandArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            commands: Vec::with_capacity(capacity),
            generation: 0,
        }
    }

    /// Place a command and return its offset. Infallible: running out of
    /// memory mid-paint aborts, because a partially recorded frame cannot
    /// be unwound safely.
    pub fn alloc(&mut self, command: DrawCommand) -> CommandOffset {
        let index = u32::try_from(self.commands.len()).expect("command arena exceeded u32 range");
        self.commands.push(command);
        CommandOffset {
            index,
            generation: self.generation,
        }
    }

    /// Resolve an offset minted by [`alloc`](Self::alloc) this generation.
    pub fn get(&self, offset: CommandOffset) -> &DrawCommand {
        self.check_generation(offset);
        &self.commands[offset.index as usize]
    }

    pub fn get_mut(&mut self, offset: CommandOffset) -> &mut DrawCommand {
        self.check_generation(offset);
        &mut self.commands[offset.index as usize]
    }

    /// Drop every live command in append order, keep the allocation, and
    /// invalidate all outstanding offsets.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.commands.capacity()
    }

    fn check_generation(&self, offset: CommandOffset) {
        assert_eq!(
            offset.generation, self.generation,
            "command offset from generation {} used in generation {}",
            offset.generation, self.generation
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::Rect;

    fn clear_cmd() -> DrawCommand {
        DrawCommand::ClearRect {
            rect: Rect::new(0.0, 0.0, 1.0, 1.0),
        }
    }

    #[test]
    fn test_alloc_and_get() {
        let mut arena = CommandArena::new();
        let a = arena.alloc(clear_cmd());
        let b = arena.alloc(DrawCommand::PopClip);
        assert_eq!(arena.len(), 2);
        assert!(matches!(arena.get(a), DrawCommand::ClearRect { .. }));
        assert!(matches!(arena.get(b), DrawCommand::PopClip));
    }

    #[test]
    fn test_clear_retains_capacity() {
        let mut arena = CommandArena::with_capacity(16);
        for _ in 0..10 {
            arena.alloc(clear_cmd());
        }
        let capacity = arena.capacity();
        arena.clear();
        assert!(arena.is_empty());
        assert_eq!(arena.capacity(), capacity);
    }

    #[test]
    #[should_panic(expected = "generation")]
    fn test_stale_offset_panics() {
        let mut arena = CommandArena::new();
        let offset = arena.alloc(clear_cmd());
        arena.clear();
        arena.alloc(clear_cmd());
        // Offset outlived its generation.
        arena.get(offset);
    }
}
