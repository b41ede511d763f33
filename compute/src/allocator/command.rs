//! Command allocator pool.
//!
//! A command allocator owns the memory behind a recorded command list and
//! cannot be reset until the GPU has finished executing that list. Returned
//! allocators are queued per list type together with the fence value of
//! their last submission, and are only handed out again once the queue's
//! fence has reached that value.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{CommandAllocatorHandle, GpuBackend};
use crate::error::Result;
use crate::types::CommandListType;

struct PooledAllocator {
    handle: CommandAllocatorHandle,
    fence_value: u64,
}

/// Pool of command allocators, one queue per list type.
pub struct CommandAllocatorPool {
    backend: Arc<dyn GpuBackend>,
    pooled: Mutex<HashMap<CommandListType, VecDeque<PooledAllocator>>>,
}

impl CommandAllocatorPool {
    /// Create an empty pool.
    pub fn new(backend: Arc<dyn GpuBackend>) -> Self {
        Self {
            backend,
            pooled: Mutex::new(HashMap::new()),
        }
    }

    /// Rent an allocator for `list_type`.
    ///
    /// `completed_value` is the last fence value the queue of that type has
    /// reached. An allocator whose submission has not completed is never
    /// reused; a new one is created instead.
    pub fn rent(
        &self,
        list_type: CommandListType,
        completed_value: u64,
    ) -> Result<CommandAllocatorHandle> {
        let reusable = {
            let mut pooled = self.pooled.lock();
            let queue = pooled.entry(list_type).or_default();
            match queue.front() {
                Some(front) if front.fence_value <= completed_value => queue.pop_front(),
                _ => None,
            }
        };

        if let Some(allocator) = reusable {
            self.backend.reset_command_allocator(allocator.handle)?;
            return Ok(allocator.handle);
        }

        log::debug!("CommandAllocatorPool: creating {list_type:?} command allocator");
        self.backend.create_command_allocator(list_type)
    }

    /// Return an allocator whose last submission signals `fence_value`.
    pub fn recycle(
        &self,
        list_type: CommandListType,
        handle: CommandAllocatorHandle,
        fence_value: u64,
    ) {
        self.pooled
            .lock()
            .entry(list_type)
            .or_default()
            .push_back(PooledAllocator {
                handle,
                fence_value,
            });
    }

    /// Number of allocators waiting in the pool.
    pub fn pooled_count(&self) -> usize {
        self.pooled.lock().values().map(VecDeque::len).sum()
    }

    /// Destroy every pooled allocator.
    pub(crate) fn destroy(&self) {
        let mut pooled = self.pooled.lock();
        for (_, queue) in pooled.drain() {
            for allocator in queue {
                self.backend.destroy_command_allocator(allocator.handle);
            }
        }
    }
}

impl std::fmt::Debug for CommandAllocatorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandAllocatorPool")
            .field("pooled", &self.pooled_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    #[test]
    fn test_reuses_completed_allocator() {
        let backend = Arc::new(DummyBackend::new());
        let pool = CommandAllocatorPool::new(backend.clone());

        let first = pool.rent(CommandListType::Compute, 0).unwrap();
        pool.recycle(CommandListType::Compute, first, 1);
        assert_eq!(pool.pooled_count(), 1);

        let again = pool.rent(CommandListType::Compute, 1).unwrap();
        assert_eq!(again, first);
        assert_eq!(backend.live_command_allocator_count(), 1);
    }

    #[test]
    fn test_pending_allocator_is_not_reused() {
        let backend = Arc::new(DummyBackend::new());
        let pool = CommandAllocatorPool::new(backend.clone());

        let first = pool.rent(CommandListType::Compute, 0).unwrap();
        pool.recycle(CommandListType::Compute, first, 5);

        let second = pool.rent(CommandListType::Compute, 4).unwrap();
        assert_ne!(second, first);
        assert_eq!(backend.live_command_allocator_count(), 2);
    }

    #[test]
    fn test_list_types_are_pooled_separately() {
        let backend = Arc::new(DummyBackend::new());
        let pool = CommandAllocatorPool::new(backend);

        let compute = pool.rent(CommandListType::Compute, 0).unwrap();
        pool.recycle(CommandListType::Compute, compute, 1);
        let copy = pool.rent(CommandListType::Copy, 10).unwrap();
        assert_ne!(copy, compute);
        assert_eq!(pool.pooled_count(), 1);
    }

    #[test]
    fn test_destroy_releases_pooled() {
        let backend = Arc::new(DummyBackend::new());
        let pool = CommandAllocatorPool::new(backend.clone());
        let handle = pool.rent(CommandListType::Copy, 0).unwrap();
        pool.recycle(CommandListType::Copy, handle, 1);
        pool.destroy();
        assert_eq!(backend.live_command_allocator_count(), 0);
    }
}
