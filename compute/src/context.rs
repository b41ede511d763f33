//! Batched kernel dispatch.
//!
//! A [`ComputeContext`] records dispatches into one compute command list and
//! submits it when executed or dropped, blocking until the GPU is done. It
//! leases every resource a dispatch binds, so none of them can be disposed
//! while the work is pending.
//!
//! When a dispatch does not name its thread-group shape, one is picked from
//! the shape of the dispatch extent:
//!
//! | Axes equal to 1 | Thread group |
//! |-----------------|--------------|
//! | x and y | `(1, 1, W)` |
//! | x and z | `(1, W, 1)` |
//! | y and z | `(W, 1, 1)` |
//! | x | `(1, 8, 8)` |
//! | y | `(8, 1, 8)` |
//! | z | `(8, 8, 1)` |
//! | none, or all | `(4, 4, 4)` |
//!
//! `W` is the adapter's wavefront size.

use std::sync::Arc;

use crate::command::CommandList;
use crate::device::GraphicsDevice;
use crate::error::{ComputeError, Result, ensure_in_range};
use crate::lease::{Lease, ReferenceTracked};
use crate::pipeline::{CONSTANTS_ROOT_SLOT, ComputeKernel, DispatchDataLoader};
use crate::resources::{GpuResource, Texture2D};
use crate::types::{CommandListType, ResourceState, ResourceUsage, TextureElement};

/// Maximum threads per group along x and y.
pub const MAX_THREADS_XY: u32 = 1024;
/// Maximum threads per group along z.
pub const MAX_THREADS_Z: u32 = 64;
/// Maximum threads in one group.
pub const MAX_THREADS_PER_GROUP: u32 = 1024;
/// Maximum number of groups along any axis of one dispatch.
pub const MAX_DISPATCH_GROUPS: u32 = 65535;

/// Thread group edge used for pixel-shader-like dispatches.
const PIXEL_GROUP_SIZE: u32 = 8;

/// Number of threads per group along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadGroupSize {
    /// Threads along x.
    pub x: u32,
    /// Threads along y.
    pub y: u32,
    /// Threads along z.
    pub z: u32,
}

impl ThreadGroupSize {
    /// Create a thread group shape.
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// The shape as `[x, y, z]`.
    pub const fn as_array(&self) -> [u32; 3] {
        [self.x, self.y, self.z]
    }

    /// Total threads in one group.
    pub fn count(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    /// Check the shape against the per-axis and per-group thread limits.
    pub fn validate(&self) -> Result<()> {
        ensure_in_range("threads x", self.x as u64, 1, MAX_THREADS_XY as u64)?;
        ensure_in_range("threads y", self.y as u64, 1, MAX_THREADS_XY as u64)?;
        ensure_in_range("threads z", self.z as u64, 1, MAX_THREADS_Z as u64)?;
        ensure_in_range(
            "threads per group",
            self.count(),
            1,
            MAX_THREADS_PER_GROUP as u64,
        )
    }
}

/// Pick a thread group shape for a dispatch over `x * y * z` threads.
pub fn default_thread_group_size(x: u32, y: u32, z: u32, wavefront_size: u32) -> ThreadGroupSize {
    let mask = (((x == 1) as u8) << 2) | (((y == 1) as u8) << 1) | ((z == 1) as u8);
    let w = wavefront_size;
    match mask {
        0b001 => ThreadGroupSize::new(8, 8, 1),
        0b010 => ThreadGroupSize::new(8, 1, 8),
        0b011 => ThreadGroupSize::new(w, 1, 1),
        0b100 => ThreadGroupSize::new(1, 8, 8),
        0b101 => ThreadGroupSize::new(1, w, 1),
        0b110 => ThreadGroupSize::new(1, 1, w),
        _ => ThreadGroupSize::new(4, 4, 4),
    }
}

/// Number of groups needed to cover `extent` threads, per axis.
///
/// # Errors
///
/// Returns [`ComputeError::ArgumentOutOfRange`] if any axis needs no groups
/// or more than [`MAX_DISPATCH_GROUPS`].
pub fn dispatch_group_count(extent: [u32; 3], threads: ThreadGroupSize) -> Result<[u32; 3]> {
    const NAMES: [&str; 3] = ["groups x", "groups y", "groups z"];
    let threads = threads.as_array();
    let mut groups = [0; 3];
    for axis in 0..3 {
        let count = extent[axis].div_ceil(threads[axis].max(1));
        ensure_in_range(NAMES[axis], count as u64, 1, MAX_DISPATCH_GROUPS as u64)?;
        groups[axis] = count;
    }
    Ok(groups)
}

/// Records kernel dispatches into a single submission.
///
/// Created by [`GraphicsDevice::create_compute_context`]. The work runs when
/// [`execute`](Self::execute) is called or the context is dropped; both
/// block until the GPU has finished. Errors during a drop-time submission
/// are logged.
///
/// A default-constructed context has no device. It refuses every dispatch
/// and [`execute`](Self::execute) fails, while dropping it does nothing.
#[derive(Default)]
pub struct ComputeContext<'a> {
    device: Option<Arc<GraphicsDevice>>,
    list: Option<CommandList>,
    leases: Vec<Lease<'a, GpuResource>>,
    dispatches: usize,
}

impl<'a> ComputeContext<'a> {
    pub(crate) fn new(device: Arc<GraphicsDevice>) -> Self {
        Self {
            device: Some(device),
            list: None,
            leases: Vec::new(),
            dispatches: 0,
        }
    }

    /// Number of dispatches recorded so far.
    pub fn dispatch_count(&self) -> usize {
        self.dispatches
    }

    /// Queue a dispatch of `kernel` over `x * y * z` threads with a
    /// thread-group shape picked from the extent.
    pub fn run<K: ComputeKernel + ?Sized>(&mut self, x: u32, y: u32, z: u32, kernel: &'a K) -> Result<()> {
        let device = self.device()?;
        let threads = default_thread_group_size(x, y, z, device.wavefront_size());
        self.dispatch([x, y, z], threads, kernel, None)
    }

    /// Queue a dispatch of `kernel` over `x * y * z` threads with an
    /// explicit thread-group shape.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::ArgumentOutOfRange`] if the shape or the
    /// resulting group count is out of range.
    pub fn run_with_threads<K: ComputeKernel + ?Sized>(
        &mut self,
        x: u32,
        y: u32,
        z: u32,
        threads: ThreadGroupSize,
        kernel: &'a K,
    ) -> Result<()> {
        self.dispatch([x, y, z], threads, kernel, None)
    }

    /// Queue a pixel-shader-like dispatch of `kernel` over every texel of
    /// `texture`, which is bound as the kernel's output.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::InvalidOperation`] if `kernel` is not a
    /// pixel-shader-like kernel or `texture` is not writable.
    pub fn for_each<T: TextureElement, K: ComputeKernel + ?Sized>(
        &mut self,
        texture: &'a Texture2D<T>,
        kernel: &'a K,
    ) -> Result<()> {
        if !kernel.descriptor().is_pixel_shader() {
            return Err(ComputeError::InvalidOperation(
                "for_each requires a pixel-shader-like kernel".to_string(),
            ));
        }
        if texture.usage() != ResourceUsage::ReadWrite {
            return Err(ComputeError::InvalidOperation(format!(
                "for_each writes its output texture, which is {:?}",
                texture.usage()
            )));
        }
        let threads = ThreadGroupSize::new(PIXEL_GROUP_SIZE, PIXEL_GROUP_SIZE, 1);
        self.dispatch(
            [texture.width(), texture.height(), 1],
            threads,
            kernel,
            Some(texture.resource()),
        )
    }

    /// Record a transition of a ReadWrite resource between
    /// [`ResourceState::UnorderedAccess`] and
    /// [`ResourceState::ShaderResource`].
    ///
    /// The resource's tracked state changes immediately. Later dispatches in
    /// this context bind it through the view matching the new state.
    pub fn transition<R>(&mut self, resource: &'a R, state: ResourceState) -> Result<()>
    where
        R: AsRef<GpuResource> + ?Sized,
    {
        let resource = resource.as_ref();
        let lease = self.lease_resource(resource)?;
        resource.transition(self.command_list()?, state)?;
        self.leases.push(lease);
        Ok(())
    }

    /// Record an unordered access barrier so later dispatches see earlier
    /// writes to `resource`.
    pub fn barrier<R>(&mut self, resource: &'a R) -> Result<()>
    where
        R: AsRef<GpuResource> + ?Sized,
    {
        let resource = resource.as_ref();
        if resource.usage() != ResourceUsage::ReadWrite {
            return Err(ComputeError::InvalidOperation(format!(
                "unordered access barriers need a ReadWrite resource, this is {:?}",
                resource.usage()
            )));
        }
        let lease = self.lease_resource(resource)?;
        self.command_list()?.uav_barrier(resource.memory())?;
        self.leases.push(lease);
        Ok(())
    }

    /// Zero every element of a ReadWrite resource in the
    /// [`ResourceState::UnorderedAccess`] state.
    pub fn clear<R>(&mut self, resource: &'a R) -> Result<()>
    where
        R: AsRef<GpuResource> + ?Sized,
    {
        let resource = resource.as_ref();
        self.clear_to(resource, vec![0; resource.element_size() as usize])
    }

    /// Set every element of a ReadWrite resource in the
    /// [`ResourceState::UnorderedAccess`] state to `value`.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::ArgumentOutOfRange`] if `value` is not the
    /// size of one element and [`ComputeError::InvalidOperation`] if the
    /// resource cannot be written through its unordered access view.
    pub fn fill<T, R>(&mut self, resource: &'a R, value: T) -> Result<()>
    where
        T: bytemuck::Pod,
        R: AsRef<GpuResource> + ?Sized,
    {
        self.clear_to(resource.as_ref(), bytemuck::bytes_of(&value).to_vec())
    }

    /// Submit the recorded work and block until it has executed.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::InvalidOperation`] for a context without a
    /// device.
    pub fn execute(mut self) -> Result<()> {
        self.device()?;
        self.submit()
    }

    fn clear_to(&mut self, resource: &'a GpuResource, value: Vec<u8>) -> Result<()> {
        let element_size = resource.element_size() as u64;
        ensure_in_range("fill value size", value.len() as u64, element_size, element_size)?;
        let lease = self.lease_resource(resource)?;
        let (gpu, cpu) = resource.clear_handles()?;
        self.command_list()?
            .clear_unordered_access_view(gpu, cpu, resource.memory(), value)?;
        self.leases.push(lease);
        Ok(())
    }

    fn device(&self) -> Result<Arc<GraphicsDevice>> {
        self.device.clone().ok_or_else(|| {
            ComputeError::InvalidOperation("compute context has no device".to_string())
        })
    }

    fn command_list(&mut self) -> Result<&mut CommandList> {
        let list = match self.list.take() {
            Some(list) => list,
            None => CommandList::rent(&self.device()?, CommandListType::Compute)?,
        };
        Ok(self.list.insert(list))
    }

    fn lease_resource(&self, resource: &'a GpuResource) -> Result<Lease<'a, GpuResource>> {
        let device = self.device()?;
        let lease = resource.acquire_lease()?;
        if !resource.belongs_to(&device) {
            return Err(ComputeError::GraphicsDeviceMismatch);
        }
        device.check_device_lost()?;
        Ok(lease)
    }

    fn dispatch<K: ComputeKernel + ?Sized>(
        &mut self,
        extent: [u32; 3],
        threads: ThreadGroupSize,
        kernel: &'a K,
        output: Option<&'a GpuResource>,
    ) -> Result<()> {
        let device = self.device()?;
        threads.validate()?;
        let groups = dispatch_group_count(extent, threads)?;

        let _lease = device.reference_tracking_lease()?;
        device.check_device_lost()?;

        let descriptor = kernel.descriptor();
        let pipeline = device.pipeline_data(descriptor, threads.as_array())?;

        let mut loader = DispatchDataLoader::new(&device, descriptor, extent);
        if let Some(output) = output {
            loader.load_output(output)?;
        }
        kernel.load_dispatch_data(&mut loader)?;
        let data = loader.finish()?;

        let list = self.command_list()?;
        list.set_pipeline(&pipeline)?;
        if !data.constants.is_empty() {
            list.set_root_constants(CONSTANTS_ROOT_SLOT, data.constants)?;
        }
        for binding in &data.bindings {
            list.set_descriptor_table(binding.slot, binding.handle)?;
        }
        list.dispatch(groups[0], groups[1], groups[2])?;

        self.leases.extend(data.leases);
        self.dispatches += 1;
        log::trace!(
            "ComputeContext: dispatch {:?} of kernel {:?} as {groups:?} groups of {:?}",
            extent,
            descriptor.id(),
            threads.as_array()
        );
        Ok(())
    }

    fn submit(&mut self) -> Result<()> {
        let result = match self.list.take() {
            Some(list) => list.execute_and_wait_for_completion(),
            None => Ok(()),
        };
        self.leases.clear();
        result
    }
}

impl Drop for ComputeContext<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.submit() {
            log::error!("ComputeContext: submission on drop failed: {err}");
        }
    }
}

impl std::fmt::Debug for ComputeContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeContext")
            .field("has_device", &self.device.is_some())
            .field("dispatches", &self.dispatches)
            .field("leased_resources", &self.leases.len())
            .finish_non_exhaustive()
    }
}
