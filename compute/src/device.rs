//! GPU device.
//!
//! A [`GraphicsDevice`] is one logical connection to an adapter. It owns the
//! compute and copy queues, the descriptor, command allocator and staging
//! pools, and the pipeline cache. Resources and compute contexts are created
//! through it.
//!
//! # Teardown
//!
//! Disposal is deferred: once [`GraphicsDevice::dispose`] is called, new
//! leases and resources are refused, and teardown runs when the last
//! outstanding lease is released. Every resource and every in-flight command
//! list holds such a lease. Teardown flushes both queues before releasing
//! pooled driver objects.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::allocator::{CommandAllocatorPool, DescriptorAllocator, StagingAllocator};
use crate::backend::{AdapterInfo, DummyBackend, GpuBackend};
use crate::command::CommandQueue;
use crate::config::{DeviceDescriptor, DeviceLimits};
use crate::context::{ComputeContext, ThreadGroupSize};
use crate::error::{ComputeError, DeviceLostReason, Result, ensure_in_range};
use crate::lease::{DisposalPolicy, Lease, ReferenceTracked, ReferenceTracker};
use crate::pipeline::{ComputeKernel, KernelDescriptor, PipelineCache, PipelineData};
use crate::resources::{Buffer, GpuResource, Texture1D, Texture2D, Texture3D};
use crate::types::{
    AllocationMode, CommandListType, ElementFormat, Extent3d, ResourceKind, ResourceUsage,
    TextureElement, required_format_support,
};

/// A logical GPU device.
pub struct GraphicsDevice {
    backend: Arc<dyn GpuBackend>,
    label: Option<String>,
    adapter: AdapterInfo,
    limits: DeviceLimits,
    tracker: ReferenceTracker,
    descriptors: DescriptorAllocator,
    command_allocators: CommandAllocatorPool,
    staging: StagingAllocator,
    compute_queue: CommandQueue,
    copy_queue: CommandQueue,
    pipelines: PipelineCache,
    lost: Mutex<Option<DeviceLostReason>>,
    resource_count: AtomicUsize,
}

impl GraphicsDevice {
    /// Create a device on top of a backend.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::DeviceLost`] if the adapter has already been
    /// removed, or any error the backend reports while creating the queues.
    pub fn new(backend: Arc<dyn GpuBackend>, descriptor: &DeviceDescriptor) -> Result<Arc<Self>> {
        if let Some(reason) = backend.device_removed_reason() {
            return Err(ComputeError::DeviceLost(reason));
        }

        let adapter = backend.adapter_info();
        let compute_queue = CommandQueue::new(Arc::clone(&backend), CommandListType::Compute)?;
        let copy_queue = match CommandQueue::new(Arc::clone(&backend), CommandListType::Copy) {
            Ok(queue) => queue,
            Err(err) => {
                compute_queue.destroy();
                return Err(err);
            }
        };

        log::info!(
            "GraphicsDevice: created {:?} on {} ({} backend, wavefront size {})",
            descriptor.label,
            adapter.name,
            backend.name(),
            adapter.wavefront_size
        );

        Ok(Arc::new(Self {
            descriptors: DescriptorAllocator::new(
                Arc::clone(&backend),
                descriptor.descriptor_heap_capacity,
            ),
            command_allocators: CommandAllocatorPool::new(Arc::clone(&backend)),
            staging: StagingAllocator::new(Arc::clone(&backend), descriptor.staging_page_size),
            label: descriptor.label.clone(),
            adapter,
            limits: descriptor.limits,
            tracker: ReferenceTracker::new("GraphicsDevice", DisposalPolicy::Deferred),
            compute_queue,
            copy_queue,
            pipelines: PipelineCache::new(),
            lost: Mutex::new(None),
            resource_count: AtomicUsize::new(0),
            backend,
        }))
    }

    /// Create a device on a fresh [`DummyBackend`] with default settings.
    pub fn dummy() -> Result<Arc<Self>> {
        Self::new(Arc::new(DummyBackend::new()), &DeviceDescriptor::default())
    }

    /// Get the backend.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// Get the debug label.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Get the adapter information.
    pub fn adapter_info(&self) -> &AdapterInfo {
        &self.adapter
    }

    /// Get the resource limits.
    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    /// Number of lanes the adapter executes in lockstep.
    pub fn wavefront_size(&self) -> u32 {
        self.adapter.wavefront_size
    }

    /// Acquire a lease on the device.
    ///
    /// Hold the lease while using native handles owned by the device.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::ObjectDisposed`] once disposal has begun.
    pub fn reference_tracking_lease(&self) -> Result<Lease<'_, Self>> {
        self.acquire_lease()
    }

    /// Check whether the adapter has been removed.
    ///
    /// Once a removal is observed it is remembered, so the device stays lost.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::DeviceLost`] with the removal reason.
    pub fn check_device_lost(&self) -> Result<()> {
        let mut lost = self.lost.lock();
        if lost.is_none() {
            *lost = self.backend.device_removed_reason();
            if let Some(reason) = *lost {
                log::error!("GraphicsDevice: device lost ({reason})");
            }
        }
        match *lost {
            Some(reason) => Err(ComputeError::DeviceLost(reason)),
            None => Ok(()),
        }
    }

    /// Returns true if the adapter has been removed.
    pub fn is_device_lost(&self) -> bool {
        self.check_device_lost().is_err()
    }

    /// Dispose of the device. Teardown runs once every lease and resource
    /// has been released. Disposing twice is a no-op.
    pub fn dispose(&self) -> Result<()> {
        if !self.tracker.is_disposed() {
            log::info!(
                "GraphicsDevice: dispose requested ({} leases outstanding)",
                self.tracker.lease_count()
            );
        }
        self.dispose_tracked()
    }

    /// Returns true once disposal has been requested.
    pub fn is_disposed(&self) -> bool {
        self.tracker.is_disposed()
    }

    // ========================================================================
    // Resource creation
    // ========================================================================

    /// Create a structured buffer of `length` elements.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::ArgumentOutOfRange`] if the length is zero or
    /// exceeds the buffer size limit.
    pub fn create_buffer<T: bytemuck::Pod>(
        self: &Arc<Self>,
        length: u32,
        usage: ResourceUsage,
        mode: AllocationMode,
    ) -> Result<Buffer<T>> {
        let resource = self.create_resource(
            ResourceKind::Buffer,
            Extent3d::new_1d(length),
            usage,
            std::mem::size_of::<T>() as u32,
            None,
            mode,
        )?;
        Ok(Buffer::new(resource))
    }

    /// Create a 1D texture.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::UnsupportedResourceType`] if the adapter does
    /// not support `T`'s format for `usage`.
    pub fn create_texture_1d<T: TextureElement>(
        self: &Arc<Self>,
        width: u32,
        usage: ResourceUsage,
        mode: AllocationMode,
    ) -> Result<Texture1D<T>> {
        let resource = self.create_typed_resource::<T>(
            ResourceKind::Texture1D,
            Extent3d::new_1d(width),
            usage,
            mode,
        )?;
        Ok(Texture1D::new(resource))
    }

    /// Create a 2D texture.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::UnsupportedResourceType`] if the adapter does
    /// not support `T`'s format for `usage`.
    pub fn create_texture_2d<T: TextureElement>(
        self: &Arc<Self>,
        width: u32,
        height: u32,
        usage: ResourceUsage,
        mode: AllocationMode,
    ) -> Result<Texture2D<T>> {
        let resource = self.create_typed_resource::<T>(
            ResourceKind::Texture2D,
            Extent3d::new_2d(width, height),
            usage,
            mode,
        )?;
        Ok(Texture2D::new(resource))
    }

    /// Create a 3D texture.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::UnsupportedResourceType`] if the adapter does
    /// not support `T`'s format for `usage`.
    pub fn create_texture_3d<T: TextureElement>(
        self: &Arc<Self>,
        width: u32,
        height: u32,
        depth: u32,
        usage: ResourceUsage,
        mode: AllocationMode,
    ) -> Result<Texture3D<T>> {
        let resource = self.create_typed_resource::<T>(
            ResourceKind::Texture3D,
            Extent3d::new(width, height, depth),
            usage,
            mode,
        )?;
        Ok(Texture3D::new(resource))
    }

    fn create_typed_resource<T: TextureElement>(
        self: &Arc<Self>,
        kind: ResourceKind,
        extent: Extent3d,
        usage: ResourceUsage,
        mode: AllocationMode,
    ) -> Result<GpuResource> {
        self.create_resource(
            kind,
            extent,
            usage,
            std::mem::size_of::<T>() as u32,
            Some(T::FORMAT),
            mode,
        )
    }

    /// Create an untyped resource.
    ///
    /// Dimensions are validated against [`DeviceLimits`]; unused axes must
    /// be 1. If `format` is given, the adapter must support it for `kind`
    /// and `usage`.
    pub fn create_resource(
        self: &Arc<Self>,
        kind: ResourceKind,
        extent: Extent3d,
        usage: ResourceUsage,
        element_size: u32,
        format: Option<ElementFormat>,
        mode: AllocationMode,
    ) -> Result<GpuResource> {
        let _lease = self.reference_tracking_lease()?;
        self.check_device_lost()?;

        ensure_in_range("element size", element_size as u64, 1, u32::MAX as u64)?;
        self.validate_extent(kind, extent, element_size)?;

        if let Some(format) = format {
            let required = required_format_support(kind, usage);
            if !self.backend.format_support(format).contains(required) {
                return Err(ComputeError::UnsupportedResourceType {
                    kind,
                    usage,
                    format,
                });
            }
        }

        let resource = GpuResource::new(self, kind, extent, usage, element_size, format, mode)?;
        log::trace!(
            "GraphicsDevice: created {usage:?} {} {}x{}x{}",
            kind.name(),
            extent.width,
            extent.height,
            extent.depth
        );
        Ok(resource)
    }

    fn validate_extent(&self, kind: ResourceKind, extent: Extent3d, element_size: u32) -> Result<()> {
        let (max_width, max_height, max_depth) = match kind {
            ResourceKind::Buffer => (self.limits.max_buffer_size / element_size as u64, 1, 1),
            ResourceKind::Texture1D => (self.limits.max_texture_1d_width as u64, 1, 1),
            ResourceKind::Texture2D => {
                let max = self.limits.max_texture_2d_dimension as u64;
                (max, max, 1)
            }
            ResourceKind::Texture3D => {
                let max = self.limits.max_texture_3d_dimension as u64;
                (max, max, max)
            }
        };
        ensure_in_range("width", extent.width as u64, 1, max_width)?;
        ensure_in_range("height", extent.height as u64, 1, max_height)?;
        ensure_in_range("depth", extent.depth as u64, 1, max_depth)
    }

    // ========================================================================
    // Compute
    // ========================================================================

    /// Create a compute context that batches dispatches into one submission.
    pub fn create_compute_context<'a>(self: &Arc<Self>) -> ComputeContext<'a> {
        ComputeContext::new(Arc::clone(self))
    }

    /// Get the pipeline for `kernel` with the given thread-group shape,
    /// building and caching it on first use.
    pub fn pipeline_data(
        &self,
        kernel: &KernelDescriptor,
        threads: [u32; 3],
    ) -> Result<Arc<PipelineData>> {
        let _lease = self.reference_tracking_lease()?;
        self.check_device_lost()?;
        self.pipelines
            .get_pipeline_data(self.backend.as_ref(), kernel, threads)
    }

    /// Dispatch `kernel` over `x * y * z` threads and wait for completion.
    pub fn run<K: ComputeKernel>(self: &Arc<Self>, x: u32, y: u32, z: u32, kernel: &K) -> Result<()> {
        let mut context = self.create_compute_context();
        context.run(x, y, z, kernel)?;
        context.execute()
    }

    /// Dispatch `kernel` with an explicit thread-group shape and wait for
    /// completion.
    pub fn run_with_threads<K: ComputeKernel>(
        self: &Arc<Self>,
        x: u32,
        y: u32,
        z: u32,
        threads: ThreadGroupSize,
        kernel: &K,
    ) -> Result<()> {
        let mut context = self.create_compute_context();
        context.run_with_threads(x, y, z, threads, kernel)?;
        context.execute()
    }

    /// Run a pixel-shader-like kernel over every texel of `texture` and wait
    /// for completion.
    pub fn for_each<T: TextureElement, K: ComputeKernel>(
        self: &Arc<Self>,
        texture: &Texture2D<T>,
        kernel: &K,
    ) -> Result<()> {
        let mut context = self.create_compute_context();
        context.for_each(texture, kernel)?;
        context.execute()
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Number of resources created on this device that are not yet disposed.
    pub fn allocated_resource_count(&self) -> usize {
        self.resource_count.load(Ordering::Acquire)
    }

    /// Number of descriptor slots currently rented.
    pub fn rented_descriptor_count(&self) -> usize {
        self.descriptors.rented_count()
    }

    /// Number of cached pipelines.
    pub fn pipeline_cache_len(&self) -> usize {
        self.pipelines.len()
    }

    /// Number of command allocators waiting in the pool.
    pub fn pooled_command_allocator_count(&self) -> usize {
        self.command_allocators.pooled_count()
    }

    /// Staging bytes currently handed out.
    pub fn staging_bytes_in_use(&self) -> u64 {
        self.staging.bytes_in_use()
    }

    /// Number of outstanding leases, resources included.
    pub fn lease_count(&self) -> usize {
        self.tracker.lease_count()
    }

    // ========================================================================
    // Internal
    // ========================================================================

    pub(crate) fn descriptors(&self) -> &DescriptorAllocator {
        &self.descriptors
    }

    pub(crate) fn command_allocators(&self) -> &CommandAllocatorPool {
        &self.command_allocators
    }

    pub(crate) fn staging(&self) -> &StagingAllocator {
        &self.staging
    }

    pub(crate) fn queue(&self, list_type: CommandListType) -> &CommandQueue {
        match list_type {
            CommandListType::Compute => &self.compute_queue,
            CommandListType::Copy => &self.copy_queue,
        }
    }

    pub(crate) fn resource_created(&self) {
        self.resource_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn resource_destroyed(&self) {
        self.resource_count.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ReferenceTracked for GraphicsDevice {
    fn reference_tracker(&self) -> &ReferenceTracker {
        &self.tracker
    }

    fn on_teardown(&self) {
        log::info!("GraphicsDevice: tearing down {:?}", self.label);
        self.compute_queue.flush();
        self.copy_queue.flush();
        self.pipelines.destroy(self.backend.as_ref());
        self.command_allocators.destroy();
        self.staging.destroy();
        self.descriptors.destroy();
        self.compute_queue.destroy();
        self.copy_queue.destroy();
    }
}

impl Drop for GraphicsDevice {
    fn drop(&mut self) {
        if let Err(err) = self.dispose_tracked() {
            log::error!("GraphicsDevice: dispose on drop failed: {err}");
        }
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("label", &self.label)
            .field("backend", &self.backend.name())
            .field("adapter", &self.adapter.name)
            .field("resources", &self.allocated_resource_count())
            .finish_non_exhaustive()
    }
}

// Ensure GraphicsDevice is Send + Sync
static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);
