//! Native driver abstraction layer.
//!
//! The compute runtime never talks to a graphics API directly. Everything it
//! needs from the driver goes through the [`GpuBackend`] trait: memory
//! resources, descriptor heaps and views, command allocators, queue
//! submission, fences, format queries and device removal detection.
//!
//! Native objects are referred to by opaque handles. A backend owns the
//! objects behind the handles; the runtime owns the handles and is
//! responsible for destroying each one exactly once.
//!
//! # Available Backends
//!
//! - [`DummyBackend`]: CPU emulation of the driver, used for testing and for
//!   machines without a compute-capable adapter

pub mod dummy;

pub use dummy::{DummyBackend, EmulatedDispatch, KernelEmulator, SubmissionRecord};

use crate::error::{DeviceLostReason, Result};
use crate::types::{
    CommandListType, ElementFormat, Extent3d, FormatSupport, HeapType, Offset3d, Region,
    ResourceKind, ResourceState,
};

macro_rules! native_handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);
        )*
    };
}

native_handle! {
    /// Native GPU memory resource.
    MemoryHandle,
    /// Native descriptor heap.
    DescriptorHeapHandle,
    /// CPU-side descriptor handle, used to write views.
    CpuDescriptorHandle,
    /// GPU-side descriptor handle, used to bind views to kernels.
    GpuDescriptorHandle,
    /// Native command allocator.
    CommandAllocatorHandle,
    /// Native root signature.
    RootSignatureHandle,
    /// Native compute pipeline state.
    PipelineHandle,
    /// Native fence.
    FenceHandle,
}

/// Information about the adapter behind a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    /// Adapter name.
    pub name: String,
    /// Number of lanes the adapter executes in lockstep.
    pub wavefront_size: u32,
    /// Dedicated video memory in bytes.
    pub dedicated_memory_size: u64,
    /// Whether the adapter is a hardware device.
    pub is_hardware_accelerated: bool,
}

/// Description of a native memory resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceDescriptor {
    /// Shape of the resource.
    pub kind: ResourceKind,
    /// Heap to place the allocation in.
    pub heap: HeapType,
    /// Dimensions in elements. Staging allocations use a 1D extent in bytes.
    pub extent: Extent3d,
    /// Size of one element in bytes.
    pub element_size: u32,
    /// Texel format for typed textures.
    pub format: Option<ElementFormat>,
    /// State the resource is created in.
    pub initial_state: ResourceState,
    /// Whether the memory must be zero-initialized.
    pub zeroed: bool,
}

impl ResourceDescriptor {
    /// Size in bytes of a tightly packed resource with this description.
    pub fn size_in_bytes(&self) -> u64 {
        self.extent.volume() * self.element_size as u64
    }

    /// Descriptor for a raw staging buffer of `size` bytes.
    pub fn staging(heap: HeapType, size: u64) -> Self {
        // Sizes past u32 are expressed as rows of 64 KiB.
        const ROW: u64 = 1 << 16;
        let extent = match u32::try_from(size) {
            Ok(width) => Extent3d::new_1d(width),
            Err(_) => Extent3d::new_2d(ROW as u32, size.div_ceil(ROW) as u32),
        };
        Self {
            kind: ResourceKind::Buffer,
            heap,
            extent,
            element_size: 1,
            format: None,
            initial_state: ResourceState::Common,
            zeroed: false,
        }
    }
}

/// A descriptor heap created by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorHeap {
    /// Heap handle.
    pub handle: DescriptorHeapHandle,
    /// Number of slots in the heap.
    pub capacity: u32,
    /// CPU handle of slot zero.
    pub cpu_start: u64,
    /// GPU handle of slot zero, for shader-visible heaps.
    pub gpu_start: Option<u64>,
    /// Distance between consecutive slots.
    pub increment: u64,
}

impl DescriptorHeap {
    /// CPU handle of slot `index`.
    pub fn cpu_handle(&self, index: u32) -> CpuDescriptorHandle {
        CpuDescriptorHandle(self.cpu_start + index as u64 * self.increment)
    }

    /// GPU handle of slot `index`, if the heap is shader visible.
    pub fn gpu_handle(&self, index: u32) -> Option<GpuDescriptorHandle> {
        self.gpu_start
            .map(|start| GpuDescriptorHandle(start + index as u64 * self.increment))
    }
}

/// Kind of view written into a descriptor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    /// Read-only shader resource view.
    ShaderResource,
    /// Read/write unordered access view.
    UnorderedAccess,
}

/// Description of a view over a memory resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewDescriptor {
    /// Kind of view.
    pub view: ViewKind,
    /// Shape of the viewed resource.
    pub kind: ResourceKind,
    /// Texel format, for typed textures.
    pub format: Option<ElementFormat>,
    /// Dimensions of the viewed resource.
    pub extent: Extent3d,
    /// Element stride in bytes.
    pub element_size: u32,
}

/// Layout of a root signature: root constants at slot 0, then one
/// descriptor table per bound resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RootSignatureDescriptor {
    /// Number of 32-bit root constants at slot 0.
    pub constant_count: u32,
    /// Number of single-descriptor tables starting at slot 1.
    pub descriptor_tables: u32,
}

/// Placement of a texture copy inside linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlacedFootprint {
    /// Byte offset of the first texel.
    pub offset: u64,
    /// Dimensions of the footprint in texels.
    pub extent: Extent3d,
    /// Bytes between consecutive rows.
    pub row_pitch: u64,
    /// Size of one texel in bytes.
    pub element_size: u32,
}

impl PlacedFootprint {
    /// Bytes between consecutive depth slices.
    pub fn slice_pitch(&self) -> u64 {
        self.row_pitch * self.extent.height as u64
    }

    /// Total bytes spanned by the footprint.
    pub fn total_size(&self) -> u64 {
        if self.extent.volume() == 0 {
            return 0;
        }
        let row_bytes = self.extent.width as u64 * self.element_size as u64;
        self.slice_pitch() * (self.extent.depth as u64 - 1)
            + self.row_pitch * (self.extent.height as u64 - 1)
            + row_bytes
    }
}

/// One side of a texture copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureCopyLocation {
    /// A texture resource in its native layout.
    Subresource {
        /// Texture memory.
        memory: MemoryHandle,
        /// Full dimensions of the texture.
        extent: Extent3d,
        /// Texel size in bytes.
        element_size: u32,
    },
    /// Linear memory laid out as a placed footprint.
    Placed {
        /// Buffer memory.
        memory: MemoryHandle,
        /// Footprint describing the layout.
        footprint: PlacedFootprint,
    },
}

impl TextureCopyLocation {
    /// The memory this location refers to.
    pub fn memory(&self) -> MemoryHandle {
        match self {
            Self::Subresource { memory, .. } | Self::Placed { memory, .. } => *memory,
        }
    }
}

/// A resource barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceBarrier {
    /// State transition.
    Transition {
        /// Resource being transitioned.
        memory: MemoryHandle,
        /// State before the barrier.
        before: ResourceState,
        /// State after the barrier.
        after: ResourceState,
    },
    /// Orders unordered-access writes before subsequent accesses.
    UnorderedAccess {
        /// Resource being synchronized.
        memory: MemoryHandle,
    },
}

/// A command recorded into a command list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NativeCommand {
    /// Bind a compute pipeline.
    SetPipelineState(PipelineHandle),
    /// Bind a compute root signature.
    SetComputeRootSignature(RootSignatureHandle),
    /// Load 32-bit root constants into a root slot.
    SetComputeRoot32BitConstants {
        /// Root slot.
        slot: u32,
        /// Constant values.
        values: Vec<u32>,
    },
    /// Bind a descriptor table to a root slot.
    SetComputeRootDescriptorTable {
        /// Root slot.
        slot: u32,
        /// First descriptor of the table.
        handle: GpuDescriptorHandle,
    },
    /// Resource barrier.
    ResourceBarrier(ResourceBarrier),
    /// Copy bytes between buffers.
    CopyBufferRegion {
        /// Destination memory.
        dst: MemoryHandle,
        /// Destination byte offset.
        dst_offset: u64,
        /// Source memory.
        src: MemoryHandle,
        /// Source byte offset.
        src_offset: u64,
        /// Number of bytes.
        size: u64,
    },
    /// Copy a box of texels between textures and/or placed footprints.
    CopyTextureRegion {
        /// Destination location.
        dst: TextureCopyLocation,
        /// Position of the box in the destination.
        dst_offset: Offset3d,
        /// Source location.
        src: TextureCopyLocation,
        /// Box to copy from the source.
        src_region: Region,
    },
    /// Fill every element of an unordered access view with one value.
    ///
    /// The view is named twice: through the shader-visible heap and
    /// through the CPU-only heap, both describing the same memory.
    ClearUnorderedAccessView {
        /// Descriptor in the shader-visible heap.
        gpu: GpuDescriptorHandle,
        /// Descriptor in the non-shader-visible heap.
        cpu: CpuDescriptorHandle,
        /// Memory being cleared.
        memory: MemoryHandle,
        /// Bytes of one element.
        value: Vec<u8>,
    },
    /// Dispatch thread groups.
    Dispatch {
        /// Groups along X.
        x: u32,
        /// Groups along Y.
        y: u32,
        /// Groups along Z.
        z: u32,
    },
}

/// GPU backend trait for abstracting the native driver.
///
/// All methods are called with the owning device's lease held. Methods that
/// create objects may block while the driver allocates; nothing else blocks
/// except [`GpuBackend::wait_for_fence`].
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Describe the adapter.
    fn adapter_info(&self) -> AdapterInfo;

    /// Query what the adapter supports for a texel format.
    fn format_support(&self, format: ElementFormat) -> FormatSupport;

    /// Create a memory resource.
    fn create_resource(&self, descriptor: &ResourceDescriptor) -> Result<MemoryHandle>;

    /// Destroy a memory resource.
    fn destroy_resource(&self, memory: MemoryHandle);

    /// Write bytes into a mapped Upload or ReadBack resource.
    fn write_mapped(&self, memory: MemoryHandle, offset: u64, data: &[u8]) -> Result<()>;

    /// Read bytes from a mapped Upload or ReadBack resource.
    fn read_mapped(&self, memory: MemoryHandle, offset: u64, out: &mut [u8]) -> Result<()>;

    /// Create a descriptor heap with `capacity` slots.
    fn create_descriptor_heap(
        &self,
        capacity: u32,
        shader_visible: bool,
    ) -> Result<DescriptorHeap>;

    /// Destroy a descriptor heap.
    fn destroy_descriptor_heap(&self, heap: DescriptorHeapHandle);

    /// Write a view of `memory` into a descriptor slot.
    fn create_view(
        &self,
        memory: MemoryHandle,
        descriptor: &ViewDescriptor,
        destination: CpuDescriptorHandle,
    ) -> Result<()>;

    /// Create a command allocator for a queue type.
    fn create_command_allocator(
        &self,
        list_type: CommandListType,
    ) -> Result<CommandAllocatorHandle>;

    /// Reset a command allocator whose previous work has completed.
    fn reset_command_allocator(&self, allocator: CommandAllocatorHandle) -> Result<()>;

    /// Destroy a command allocator.
    fn destroy_command_allocator(&self, allocator: CommandAllocatorHandle);

    /// Create a root signature.
    fn create_root_signature(
        &self,
        descriptor: &RootSignatureDescriptor,
    ) -> Result<RootSignatureHandle>;

    /// Destroy a root signature.
    fn destroy_root_signature(&self, root_signature: RootSignatureHandle);

    /// Create a compute pipeline for `bytecode` with the given thread-group shape.
    fn create_compute_pipeline(
        &self,
        root_signature: RootSignatureHandle,
        bytecode: &[u8],
        threads: [u32; 3],
    ) -> Result<PipelineHandle>;

    /// Destroy a compute pipeline.
    fn destroy_pipeline(&self, pipeline: PipelineHandle);

    /// Create a fence with a completed value of zero.
    fn create_fence(&self) -> Result<FenceHandle>;

    /// Destroy a fence.
    fn destroy_fence(&self, fence: FenceHandle);

    /// Submit recorded commands to a queue.
    fn execute_command_list(
        &self,
        queue: CommandListType,
        allocator: CommandAllocatorHandle,
        commands: &[NativeCommand],
    ) -> Result<()>;

    /// Make the queue set `fence` to `value` once all prior work completes.
    fn signal(&self, queue: CommandListType, fence: FenceHandle, value: u64) -> Result<()>;

    /// Last value the GPU has written to `fence`.
    fn completed_value(&self, fence: FenceHandle) -> u64;

    /// Block until `fence` reaches `value`. No timeout.
    fn wait_for_fence(&self, fence: FenceHandle, value: u64);

    /// Reason the device was removed, if it was.
    fn device_removed_reason(&self) -> Option<DeviceLostReason>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_heap_handles() {
        let heap = DescriptorHeap {
            handle: DescriptorHeapHandle(1),
            capacity: 8,
            cpu_start: 1000,
            gpu_start: Some(5000),
            increment: 32,
        };
        assert_eq!(heap.cpu_handle(0), CpuDescriptorHandle(1000));
        assert_eq!(heap.cpu_handle(2), CpuDescriptorHandle(1064));
        assert_eq!(heap.gpu_handle(3), Some(GpuDescriptorHandle(5096)));

        let cpu_only = DescriptorHeap {
            gpu_start: None,
            ..heap
        };
        assert_eq!(cpu_only.gpu_handle(0), None);
    }

    #[test]
    fn test_footprint_size() {
        let footprint = PlacedFootprint {
            offset: 0,
            extent: Extent3d::new(10, 3, 2),
            row_pitch: 256,
            element_size: 4,
        };
        assert_eq!(footprint.slice_pitch(), 768);
        // Last row of the last slice is not padded.
        assert_eq!(footprint.total_size(), 768 + 512 + 40);
    }
}
