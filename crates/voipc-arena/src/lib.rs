//! Bump allocator over a single `mmap`-backed region.
//!
//! Each pipeline stage owns one [`Arena`] sized for its worst case (an encoder
//! packet arena, a reassembly arena, ...). There is no per-allocation free —
//! only whole-arena [`Arena::reset`] or scoped rewind via [`Arena::begin_temporary`].
//! Arenas are not `Send`/`Sync`; each stage's thread owns its own.

use std::ptr::NonNull;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("arena exhausted: requested {requested} bytes, {remaining} remaining")]
    Exhausted { requested: usize, remaining: usize },
    #[error("mmap failed for {size} bytes")]
    MmapFailed { size: usize },
}

/// A bump allocator backed by one anonymous `mmap` region.
pub struct Arena {
    base: NonNull<u8>,
    size: usize,
    used: usize,
}

// SAFETY: Arena owns its mmap'd region exclusively; callers never move it across
// threads without synchronization of their own. We don't implement Send/Sync —
// each pipeline stage keeps its arena on the thread that created it.

impl Arena {
    /// Reserve a new arena of `size` bytes via anonymous `mmap`.
    pub fn new(size: usize) -> Result<Self, ArenaError> {
        if size == 0 {
            return Err(ArenaError::MmapFailed { size });
        }
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(ArenaError::MmapFailed { size });
        }
        Ok(Self {
            // SAFETY: mmap returned a non-null, non-MAP_FAILED pointer above.
            base: unsafe { NonNull::new_unchecked(ptr as *mut u8) },
            size,
            used: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.size
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn remaining(&self) -> usize {
        self.size - self.used
    }

    /// Bump-allocate `size` bytes and return a mutable slice into the arena.
    ///
    /// Panics on exhaustion — callers must size arenas for their worst case.
    /// Use [`Arena::try_allocate`] for a call site that wants to check first.
    pub fn allocate(&mut self, size: usize) -> &mut [u8] {
        self.try_allocate(size)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    /// Fallible variant of [`Arena::allocate`]. Never allocates partially.
    pub fn try_allocate(&mut self, size: usize) -> Result<&mut [u8], ArenaError> {
        if size > self.remaining() {
            return Err(ArenaError::Exhausted {
                requested: size,
                remaining: self.remaining(),
            });
        }
        let offset = self.used;
        self.used += size;
        // SAFETY: offset + size <= self.size, checked above; base is valid for self.size bytes.
        let slice = unsafe {
            std::slice::from_raw_parts_mut(self.base.as_ptr().add(offset), size)
        };
        Ok(slice)
    }

    /// Bump-allocate `size` zeroed bytes.
    pub fn allocate_zeroed(&mut self, size: usize) -> &mut [u8] {
        let slice = self.allocate(size);
        slice.fill(0);
        slice
    }

    /// Begin a scoped temporary region. Dropping the guard (or calling
    /// [`TemporaryMemory::end`] explicitly) rewinds `used` back to this point.
    pub fn begin_temporary(&mut self) -> TemporaryMemory<'_> {
        let checkpoint = self.used;
        TemporaryMemory {
            arena: self,
            checkpoint,
            ended: false,
        }
    }

    /// Reset the whole arena; all prior allocations become invalid to use.
    pub fn reset(&mut self) {
        self.used = 0;
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.size);
        }
    }
}

/// RAII checkpoint/rewind guard returned by [`Arena::begin_temporary`].
pub struct TemporaryMemory<'a> {
    arena: &'a mut Arena,
    checkpoint: usize,
    ended: bool,
}

impl<'a> TemporaryMemory<'a> {
    /// Rewind the arena to the checkpoint now, rather than on drop.
    pub fn end(mut self) {
        self.rewind();
    }

    fn rewind(&mut self) {
        if !self.ended {
            debug_assert!(self.arena.used >= self.checkpoint);
            self.arena.used = self.checkpoint;
            self.ended = true;
        }
    }
}

impl<'a> Drop for TemporaryMemory<'a> {
    fn drop(&mut self) {
        self.rewind();
    }
}

impl<'a> std::ops::Deref for TemporaryMemory<'a> {
    type Target = Arena;
    fn deref(&self) -> &Arena {
        self.arena
    }
}

impl<'a> std::ops::DerefMut for TemporaryMemory<'a> {
    fn deref_mut(&mut self) -> &mut Arena {
        self.arena
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_advances_used() {
        let mut arena = Arena::new(4096).unwrap();
        assert_eq!(arena.used(), 0);
        let buf = arena.allocate(100);
        assert_eq!(buf.len(), 100);
        assert_eq!(arena.used(), 100);
    }

    #[test]
    fn allocate_zeroed_is_zero() {
        let mut arena = Arena::new(4096).unwrap();
        let buf = arena.allocate_zeroed(64);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn try_allocate_past_capacity_errors() {
        let mut arena = Arena::new(128).unwrap();
        let err = arena.try_allocate(256).unwrap_err();
        matches!(err, ArenaError::Exhausted { requested: 256, remaining: 128 });
    }

    #[test]
    #[should_panic]
    fn allocate_past_capacity_panics() {
        let mut arena = Arena::new(128).unwrap();
        arena.allocate(256);
    }

    #[test]
    fn temporary_memory_rewinds_on_drop() {
        let mut arena = Arena::new(4096).unwrap();
        arena.allocate(100);
        {
            let mut temp = arena.begin_temporary();
            temp.allocate(1000);
            assert_eq!(temp.used(), 1100);
        }
        assert_eq!(arena.used(), 100);
    }

    #[test]
    fn temporary_memory_explicit_end() {
        let mut arena = Arena::new(4096).unwrap();
        let temp = arena.begin_temporary();
        temp.end();
        assert_eq!(arena.used(), 0);
    }

    #[test]
    fn reset_clears_used() {
        let mut arena = Arena::new(4096).unwrap();
        arena.allocate(500);
        arena.reset();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.remaining(), 4096);
    }

    #[test]
    fn written_bytes_persist() {
        let mut arena = Arena::new(4096).unwrap();
        let buf = arena.allocate(16);
        buf.copy_from_slice(&[7u8; 16]);
        assert_eq!(buf, &[7u8; 16]);
    }
}
