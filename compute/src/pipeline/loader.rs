//! Per-dispatch binding of scalars and resources.

use std::sync::Arc;

use crate::backend::{GpuDescriptorHandle, MemoryHandle};
use crate::device::GraphicsDevice;
use crate::error::{ComputeError, Result};
use crate::lease::{Lease, ReferenceTracked};
use crate::resources::GpuResource;

use super::{KernelDescriptor, OUTPUT_TEXTURE_ROOT_SLOT};

/// A resource bound to a root slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceBinding {
    /// Root signature slot.
    pub slot: u32,
    /// Descriptor bound to the slot.
    pub handle: GpuDescriptorHandle,
    /// Memory behind the descriptor.
    pub memory: MemoryHandle,
}

/// Collects the root constants and resource bindings of one dispatch.
///
/// Every bound resource is leased for `'a`, which the owning compute
/// context keeps alive until its work has executed.
pub struct DispatchDataLoader<'a> {
    device: Arc<GraphicsDevice>,
    kernel: &'a KernelDescriptor,
    extent: [u32; 3],
    constants: Vec<u8>,
    bindings: Vec<Option<ResourceBinding>>,
    leases: Vec<Lease<'a, GpuResource>>,
}

/// Output of a [`DispatchDataLoader`], ready to record.
pub(crate) struct LoadedDispatchData<'a> {
    pub constants: Vec<u32>,
    pub bindings: Vec<ResourceBinding>,
    pub leases: Vec<Lease<'a, GpuResource>>,
}

impl<'a> DispatchDataLoader<'a> {
    pub(crate) fn new(
        device: &Arc<GraphicsDevice>,
        kernel: &'a KernelDescriptor,
        extent: [u32; 3],
    ) -> Self {
        Self {
            device: Arc::clone(device),
            kernel,
            extent,
            constants: vec![0; kernel.constant_count() as usize * 4],
            bindings: vec![None; kernel.descriptor_table_count() as usize],
            leases: Vec::new(),
        }
    }

    /// Number of threads requested along each axis.
    pub fn dispatch_extent(&self) -> [u32; 3] {
        self.extent
    }

    /// The kernel being dispatched.
    pub fn kernel(&self) -> &KernelDescriptor {
        self.kernel
    }

    /// Write a scalar parameter at byte `offset` of the constant block.
    pub fn load_scalar<T: bytemuck::Pod>(&mut self, offset: u32, value: &T) -> Result<()> {
        let bytes = bytemuck::bytes_of(value);
        let end = offset as u64 + bytes.len() as u64;
        if end > self.kernel.scalar_bytes() as u64 {
            return Err(ComputeError::ArgumentOutOfRange {
                name: "scalar offset",
                value: end,
                min: 0,
                max: self.kernel.scalar_bytes() as u64,
            });
        }
        self.constants[offset as usize..end as usize].copy_from_slice(bytes);
        Ok(())
    }

    /// Bind the resource at binding `index`.
    ///
    /// ReadOnly resources are bound through their shader resource view.
    /// ReadWrite resources are bound through their unordered access view
    /// while in [`UnorderedAccess`](crate::ResourceState::UnorderedAccess)
    /// and through their shader resource view while in
    /// [`ShaderResource`](crate::ResourceState::ShaderResource).
    pub fn load_resource<R>(&mut self, index: u32, resource: &'a R) -> Result<()>
    where
        R: AsRef<GpuResource> + ?Sized,
    {
        if index >= self.kernel.resource_count() {
            return Err(ComputeError::ArgumentOutOfRange {
                name: "resource index",
                value: index as u64,
                min: 0,
                max: self.kernel.resource_count().saturating_sub(1) as u64,
            });
        }
        let slot = self.kernel.first_resource_slot() + index;
        self.bind(slot, resource.as_ref(), GpuResource::binding_handle)
    }

    /// The output texture is always bound through its unordered access view,
    /// so it must be in [`UnorderedAccess`](crate::ResourceState::UnorderedAccess).
    pub(crate) fn load_output(&mut self, texture: &'a GpuResource) -> Result<()> {
        if !self.kernel.is_pixel_shader() {
            return Err(ComputeError::InvalidOperation(
                "only pixel-shader-like kernels have an output texture".to_string(),
            ));
        }
        self.bind(OUTPUT_TEXTURE_ROOT_SLOT, texture, GpuResource::output_handle)
    }

    fn bind(
        &mut self,
        slot: u32,
        resource: &'a GpuResource,
        view: fn(&GpuResource) -> Result<GpuDescriptorHandle>,
    ) -> Result<()> {
        let lease = resource.acquire_lease()?;
        if !resource.belongs_to(&self.device) {
            return Err(ComputeError::GraphicsDeviceMismatch);
        }
        let handle = view(resource)?;
        self.bindings[(slot - 1) as usize] = Some(ResourceBinding {
            slot,
            handle,
            memory: resource.memory(),
        });
        self.leases.push(lease);
        Ok(())
    }

    pub(crate) fn finish(self) -> Result<LoadedDispatchData<'a>> {
        let mut bindings = Vec::with_capacity(self.bindings.len());
        for (index, binding) in self.bindings.into_iter().enumerate() {
            let binding = binding.ok_or_else(|| {
                ComputeError::InvalidOperation(format!(
                    "root slot {} has no resource loaded",
                    index + 1
                ))
            })?;
            bindings.push(binding);
        }
        let constants = self
            .constants
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        Ok(LoadedDispatchData {
            constants,
            bindings,
            leases: self.leases,
        })
    }
}

impl std::fmt::Debug for DispatchDataLoader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchDataLoader")
            .field("kernel", &self.kernel.id())
            .field("extent", &self.extent)
            .field("bound", &self.bindings.iter().filter(|b| b.is_some()).count())
            .finish_non_exhaustive()
    }
}
