//! Command queues and their fences.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{CommandAllocatorHandle, FenceHandle, GpuBackend, NativeCommand};
use crate::error::Result;
use crate::types::CommandListType;

/// A queue of one type with a monotonically increasing fence.
pub struct CommandQueue {
    backend: Arc<dyn GpuBackend>,
    list_type: CommandListType,
    fence: FenceHandle,
    /// Last value signaled on the fence. Held while submitting so that fence
    /// values follow submission order.
    last_signaled: Mutex<u64>,
}

impl CommandQueue {
    /// Create a queue and its fence.
    pub fn new(backend: Arc<dyn GpuBackend>, list_type: CommandListType) -> Result<Self> {
        let fence = backend.create_fence()?;
        Ok(Self {
            backend,
            list_type,
            fence,
            last_signaled: Mutex::new(0),
        })
    }

    /// Queue type.
    pub fn list_type(&self) -> CommandListType {
        self.list_type
    }

    /// Submit commands and signal the fence. Returns the value that marks
    /// their completion.
    pub fn submit(
        &self,
        allocator: CommandAllocatorHandle,
        commands: &[NativeCommand],
    ) -> Result<u64> {
        let mut last_signaled = self.last_signaled.lock();
        self.backend
            .execute_command_list(self.list_type, allocator, commands)?;
        let value = *last_signaled + 1;
        self.backend.signal(self.list_type, self.fence, value)?;
        *last_signaled = value;
        log::trace!(
            "CommandQueue: submitted {} commands to the {:?} queue (fence value {value})",
            commands.len(),
            self.list_type
        );
        Ok(value)
    }

    /// Last fence value the GPU has reached.
    pub fn completed_value(&self) -> u64 {
        self.backend.completed_value(self.fence)
    }

    /// Last fence value signaled by a submission.
    pub fn last_signaled_value(&self) -> u64 {
        *self.last_signaled.lock()
    }

    /// Block until the fence reaches `value`.
    pub fn wait(&self, value: u64) {
        if self.completed_value() < value {
            self.backend.wait_for_fence(self.fence, value);
        }
    }

    /// Block until every submission so far has completed.
    pub fn flush(&self) {
        let value = self.last_signaled_value();
        self.wait(value);
    }

    /// Destroy the fence.
    pub(crate) fn destroy(&self) {
        self.backend.destroy_fence(self.fence);
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("list_type", &self.list_type)
            .field("fence", &self.fence)
            .field("last_signaled", &self.last_signaled_value())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    #[test]
    fn test_fence_values_increase() {
        let backend = Arc::new(DummyBackend::new());
        let queue = CommandQueue::new(backend.clone(), CommandListType::Copy).unwrap();
        let allocator = backend
            .create_command_allocator(CommandListType::Copy)
            .unwrap();

        assert_eq!(queue.submit(allocator, &[]).unwrap(), 1);
        assert_eq!(queue.submit(allocator, &[]).unwrap(), 2);
        queue.flush();
        assert_eq!(queue.completed_value(), 2);
        assert_eq!(backend.submissions().len(), 2);
    }

    #[test]
    fn test_failed_submission_does_not_signal() {
        let backend = Arc::new(DummyBackend::new());
        let queue = CommandQueue::new(backend.clone(), CommandListType::Copy).unwrap();
        let allocator = backend
            .create_command_allocator(CommandListType::Copy)
            .unwrap();

        let result = queue.submit(allocator, &[NativeCommand::Dispatch { x: 1, y: 1, z: 1 }]);
        assert!(result.is_err());
        assert_eq!(queue.last_signaled_value(), 0);
    }
}
