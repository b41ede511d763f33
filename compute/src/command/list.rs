//! Command lists.

use std::sync::Arc;

use crate::backend::{
    CommandAllocatorHandle, CpuDescriptorHandle, GpuDescriptorHandle, MemoryHandle,
    NativeCommand, PipelineHandle, ResourceBarrier, RootSignatureHandle, TextureCopyLocation,
};
use crate::device::GraphicsDevice;
use crate::error::{ComputeError, Result};
use crate::lease::OwnedLease;
use crate::pipeline::PipelineData;
use crate::types::{CommandListType, Offset3d, Region, ResourceState};

/// Lifecycle of a [`CommandList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandListState {
    /// No allocator rented yet.
    Unallocated,
    /// Accepting commands.
    Recording,
    /// Submitted to a queue, not yet known to be complete.
    Submitted,
    /// The GPU has finished executing the list.
    Completed,
}

/// A command allocator plus the commands recorded against it.
///
/// The list holds a lease on its device, so the device's teardown waits
/// until the list is dropped. Dropping the list returns its allocator to
/// the pool, tagged with the fence value of its submission.
pub struct CommandList {
    device: OwnedLease<GraphicsDevice>,
    list_type: CommandListType,
    allocator: Option<CommandAllocatorHandle>,
    commands: Vec<NativeCommand>,
    state: CommandListState,
    fence_value: u64,
    pipeline: Option<PipelineHandle>,
    root_signature: Option<RootSignatureHandle>,
}

impl CommandList {
    /// Create an unallocated list for `list_type`.
    pub fn new(device: &Arc<GraphicsDevice>, list_type: CommandListType) -> Result<Self> {
        Ok(Self {
            device: OwnedLease::new(Arc::clone(device))?,
            list_type,
            allocator: None,
            commands: Vec::new(),
            state: CommandListState::Unallocated,
            fence_value: 0,
            pipeline: None,
            root_signature: None,
        })
    }

    /// Rent an allocator from the device pool and start recording.
    pub fn rent(device: &Arc<GraphicsDevice>, list_type: CommandListType) -> Result<Self> {
        let mut list = Self::new(device, list_type)?;
        list.allocate()?;
        Ok(list)
    }

    /// Rent an allocator and move to [`CommandListState::Recording`].
    pub fn allocate(&mut self) -> Result<()> {
        if self.state != CommandListState::Unallocated {
            return Err(ComputeError::InvalidOperation(format!(
                "command list is already {:?}",
                self.state
            )));
        }
        let completed = self.device.queue(self.list_type).completed_value();
        let allocator = self
            .device
            .command_allocators()
            .rent(self.list_type, completed)?;
        self.allocator = Some(allocator);
        self.state = CommandListState::Recording;
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CommandListState {
        self.state
    }

    /// Queue type the list records for.
    pub fn list_type(&self) -> CommandListType {
        self.list_type
    }

    /// Fence value of the submission, zero before submission.
    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }

    /// Commands recorded so far.
    pub fn commands(&self) -> &[NativeCommand] {
        &self.commands
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Bind a pipeline and its root signature, skipping whatever is
    /// already bound.
    pub fn set_pipeline(&mut self, pipeline: &PipelineData) -> Result<()> {
        if self.root_signature != Some(pipeline.root_signature()) {
            self.record(NativeCommand::SetComputeRootSignature(
                pipeline.root_signature(),
            ))?;
            self.root_signature = Some(pipeline.root_signature());
        }
        if self.pipeline != Some(pipeline.pipeline()) {
            self.record(NativeCommand::SetPipelineState(pipeline.pipeline()))?;
            self.pipeline = Some(pipeline.pipeline());
        }
        Ok(())
    }

    /// Load 32-bit root constants.
    pub fn set_root_constants(&mut self, slot: u32, values: Vec<u32>) -> Result<()> {
        self.record(NativeCommand::SetComputeRoot32BitConstants { slot, values })
    }

    /// Bind a descriptor table.
    pub fn set_descriptor_table(&mut self, slot: u32, handle: GpuDescriptorHandle) -> Result<()> {
        self.record(NativeCommand::SetComputeRootDescriptorTable { slot, handle })
    }

    /// Record a state transition. Transitions to the current state are
    /// skipped.
    pub fn transition_barrier(
        &mut self,
        memory: MemoryHandle,
        before: ResourceState,
        after: ResourceState,
    ) -> Result<()> {
        if before == after {
            return Ok(());
        }
        self.require_compute("resource transitions")?;
        self.record(NativeCommand::ResourceBarrier(ResourceBarrier::Transition {
            memory,
            before,
            after,
        }))
    }

    /// Record an unordered access barrier.
    pub fn uav_barrier(&mut self, memory: MemoryHandle) -> Result<()> {
        self.require_compute("unordered access barriers")?;
        self.record(NativeCommand::ResourceBarrier(
            ResourceBarrier::UnorderedAccess { memory },
        ))
    }

    /// Record a buffer copy.
    pub fn copy_buffer_region(
        &mut self,
        dst: MemoryHandle,
        dst_offset: u64,
        src: MemoryHandle,
        src_offset: u64,
        size: u64,
    ) -> Result<()> {
        self.record(NativeCommand::CopyBufferRegion {
            dst,
            dst_offset,
            src,
            src_offset,
            size,
        })
    }

    /// Record a texture copy.
    pub fn copy_texture_region(
        &mut self,
        dst: TextureCopyLocation,
        dst_offset: Offset3d,
        src: TextureCopyLocation,
        src_region: Region,
    ) -> Result<()> {
        self.record(NativeCommand::CopyTextureRegion {
            dst,
            dst_offset,
            src,
            src_region,
        })
    }

    /// Record a clear of an unordered access view to `value`.
    pub fn clear_unordered_access_view(
        &mut self,
        gpu: GpuDescriptorHandle,
        cpu: CpuDescriptorHandle,
        memory: MemoryHandle,
        value: Vec<u8>,
    ) -> Result<()> {
        self.require_compute("unordered access view clears")?;
        self.record(NativeCommand::ClearUnorderedAccessView {
            gpu,
            cpu,
            memory,
            value,
        })
    }

    /// Record a dispatch of `x * y * z` thread groups.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        self.require_compute("dispatches")?;
        self.record(NativeCommand::Dispatch { x, y, z })
    }

    /// Submit the list and block until the GPU has executed it.
    ///
    /// There is no timeout. If the device is removed during the wait, the
    /// next checked operation on the device reports it.
    pub fn execute_and_wait_for_completion(mut self) -> Result<()> {
        let allocator = match (self.state, self.allocator) {
            (CommandListState::Recording, Some(allocator)) => allocator,
            _ => {
                return Err(ComputeError::InvalidOperation(format!(
                    "cannot execute a command list that is {:?}",
                    self.state
                )));
            }
        };

        let queue = self.device.queue(self.list_type);
        self.fence_value = queue.submit(allocator, &self.commands)?;
        self.state = CommandListState::Submitted;
        queue.wait(self.fence_value);
        self.state = CommandListState::Completed;
        Ok(())
    }

    fn require_compute(&self, what: &str) -> Result<()> {
        if self.list_type != CommandListType::Compute {
            return Err(ComputeError::InvalidOperation(format!(
                "{what} are not allowed on a copy command list"
            )));
        }
        Ok(())
    }

    fn record(&mut self, command: NativeCommand) -> Result<()> {
        if self.state != CommandListState::Recording {
            return Err(ComputeError::InvalidOperation(format!(
                "cannot record into a command list that is {:?}",
                self.state
            )));
        }
        self.commands.push(command);
        Ok(())
    }
}

impl Drop for CommandList {
    fn drop(&mut self) {
        if let Some(allocator) = self.allocator.take() {
            self.device
                .command_allocators()
                .recycle(self.list_type, allocator, self.fence_value);
        }
    }
}

impl std::fmt::Debug for CommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandList")
            .field("list_type", &self.list_type)
            .field("state", &self.state)
            .field("commands", &self.commands.len())
            .field("fence_value", &self.fence_value)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::config::DeviceDescriptor;

    fn device() -> (Arc<DummyBackend>, Arc<GraphicsDevice>) {
        let backend = Arc::new(DummyBackend::new());
        let device = GraphicsDevice::new(backend.clone(), &DeviceDescriptor::default()).unwrap();
        (backend, device)
    }

    #[test]
    fn test_lifecycle() {
        let (backend, device) = device();
        let mut list = CommandList::new(&device, CommandListType::Compute).unwrap();
        assert_eq!(list.state(), CommandListState::Unallocated);
        assert!(list.dispatch(1, 1, 1).is_err());

        list.allocate().unwrap();
        assert_eq!(list.state(), CommandListState::Recording);
        assert!(list.allocate().is_err());
        list.execute_and_wait_for_completion().unwrap();

        assert_eq!(backend.submissions().len(), 1);
        assert_eq!(device.pooled_command_allocator_count(), 1);
    }

    #[test]
    fn test_copy_list_rejects_compute_commands() {
        let (_backend, device) = device();
        let mut list = CommandList::rent(&device, CommandListType::Copy).unwrap();
        assert!(matches!(
            list.dispatch(1, 1, 1),
            Err(ComputeError::InvalidOperation(_))
        ));
        assert!(list
            .clear_unordered_access_view(
                GpuDescriptorHandle(1),
                CpuDescriptorHandle(2),
                MemoryHandle(1),
                vec![0; 4]
            )
            .is_err());
        assert!(list
            .transition_barrier(
                MemoryHandle(1),
                ResourceState::Common,
                ResourceState::CopyDest
            )
            .is_err());
        // Identity transitions are skipped on any queue.
        list.transition_barrier(MemoryHandle(1), ResourceState::Common, ResourceState::Common)
            .unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_dropped_list_returns_allocator() {
        let (_backend, device) = device();
        let list = CommandList::rent(&device, CommandListType::Copy).unwrap();
        assert_eq!(device.pooled_command_allocator_count(), 0);
        drop(list);
        assert_eq!(device.pooled_command_allocator_count(), 1);
    }

    #[test]
    fn test_list_defers_device_teardown() {
        let (backend, device) = device();
        let list = CommandList::rent(&device, CommandListType::Compute).unwrap();
        device.dispose().unwrap();
        assert!(device.is_disposed());
        assert_eq!(backend.live_command_allocator_count(), 1);
        drop(list);
        assert_eq!(backend.live_command_allocator_count(), 0);
    }
}
