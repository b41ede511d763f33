//! Untyped GPU resource.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::allocator::{DescriptorHandles, align_up};
use crate::backend::{
    CpuDescriptorHandle, GpuDescriptorHandle, MemoryHandle, PlacedFootprint, ResourceDescriptor,
    TextureCopyLocation, ViewDescriptor, ViewKind,
};
use crate::command::CommandList;
use crate::device::GraphicsDevice;
use crate::error::{ComputeError, Result, ensure_in_range};
use crate::lease::{DisposalPolicy, OwnedLease, ReferenceTracked, ReferenceTracker};
use crate::types::{
    AllocationMode, CommandListType, ElementFormat, Extent3d, HeapType, Offset3d, Region,
    ResourceKind, ResourceState, ResourceUsage,
};

/// Row pitch alignment of texture data laid out in linear memory.
pub const TEXTURE_ROW_PITCH_ALIGNMENT: u64 = 256;

const SOURCE_AXES: [&str; 3] = ["source x", "source y", "source z"];
const DESTINATION_AXES: [&str; 3] = ["destination x", "destination y", "destination z"];

/// Linear layout of a texture region with rows aligned to
/// [`TEXTURE_ROW_PITCH_ALIGNMENT`].
pub fn texture_footprint(extent: Extent3d, element_size: u32) -> PlacedFootprint {
    PlacedFootprint {
        offset: 0,
        extent,
        row_pitch: align_up(
            extent.width as u64 * element_size as u64,
            TEXTURE_ROW_PITCH_ALIGNMENT,
        ),
        element_size,
    }
}

/// Tightly packed layout of a buffer region.
fn buffer_footprint(extent: Extent3d, element_size: u32) -> PlacedFootprint {
    PlacedFootprint {
        offset: 0,
        extent,
        row_pitch: extent.width as u64 * element_size as u64,
        element_size,
    }
}

/// Offsets of every row of `region` inside `footprint`, paired with the
/// offset of the same row in tightly packed data.
fn rows(footprint: &PlacedFootprint, region: Region) -> impl Iterator<Item = (u64, usize)> + '_ {
    let row_bytes = region.extent.width as usize * footprint.element_size as usize;
    let height = region.extent.height;
    (0..region.extent.depth).flat_map(move |z| {
        (0..height).map(move |y| {
            let x = region.offset.x as u64;
            let y_pos = (region.offset.y + y) as u64;
            let z_pos = (region.offset.z + z) as u64;
            let offset = footprint.offset
                + z_pos * footprint.slice_pitch()
                + y_pos * footprint.row_pitch
                + x * footprint.element_size as u64;
            let packed = (z as usize * height as usize + y as usize) * row_bytes;
            (offset, packed)
        })
    })
}

fn validate_region(region: Region, extent: Extent3d, names: [&'static str; 3]) -> Result<()> {
    let axes = [
        (region.offset.x, region.extent.width, extent.width),
        (region.offset.y, region.extent.height, extent.height),
        (region.offset.z, region.extent.depth, extent.depth),
    ];
    for ((offset, len, dimension), name) in axes.into_iter().zip(names) {
        ensure_in_range(name, offset as u64 + len as u64, 0, dimension as u64)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct ResourceViews {
    /// Unordered access view for ReadWrite, shader resource view for ReadOnly.
    primary: DescriptorHandles,
    /// Shader resource view of a ReadWrite resource.
    read_only: Option<DescriptorHandles>,
}

/// A GPU memory allocation with its descriptors and access state.
///
/// The resource is a tagged variant over [`ResourceKind`] and
/// [`ResourceUsage`]. The typed facades ([`Buffer`](crate::Buffer),
/// [`Texture2D`](crate::Texture2D), ...) wrap it and add element types.
///
/// The access state only changes through explicit transitions recorded by a
/// [`ComputeContext`](crate::ComputeContext). Copies move resources into copy
/// states for their duration and restore the prior state afterwards.
///
/// Disposal is refused while the resource is leased, which is the case while
/// a compute context that bound it has not executed yet.
pub struct GpuResource {
    device: Arc<GraphicsDevice>,
    device_lease: Mutex<Option<OwnedLease<GraphicsDevice>>>,
    tracker: ReferenceTracker,
    kind: ResourceKind,
    usage: ResourceUsage,
    extent: Extent3d,
    element_size: u32,
    format: Option<ElementFormat>,
    memory: MemoryHandle,
    footprint: Option<PlacedFootprint>,
    views: Option<ResourceViews>,
    state: Mutex<ResourceState>,
}

impl GpuResource {
    pub(crate) fn new(
        device: &Arc<GraphicsDevice>,
        kind: ResourceKind,
        extent: Extent3d,
        usage: ResourceUsage,
        element_size: u32,
        format: Option<ElementFormat>,
        mode: AllocationMode,
    ) -> Result<Self> {
        let device_lease = OwnedLease::new(Arc::clone(device))?;
        let heap = usage.heap_type();
        let zeroed = mode == AllocationMode::Clear;

        // CPU-visible textures are linear memory laid out as a footprint.
        let footprint = (kind.is_texture() && !usage.is_gpu_resident())
            .then(|| texture_footprint(extent, element_size));
        let descriptor = match footprint {
            Some(footprint) => ResourceDescriptor {
                zeroed,
                ..ResourceDescriptor::staging(heap, footprint.total_size())
            },
            None => ResourceDescriptor {
                kind,
                heap,
                extent,
                element_size,
                format,
                initial_state: usage.initial_state(),
                zeroed,
            },
        };

        let backend = device.backend();
        let memory = backend.create_resource(&descriptor)?;

        let views = if usage.is_gpu_resident() {
            let view = |view| ViewDescriptor {
                view,
                kind,
                format,
                extent,
                element_size,
            };
            match Self::create_views(device, memory, usage, view) {
                Ok(views) => Some(views),
                Err(err) => {
                    backend.destroy_resource(memory);
                    return Err(err);
                }
            }
        } else {
            None
        };

        device.resource_created();

        Ok(Self {
            device: Arc::clone(device),
            device_lease: Mutex::new(Some(device_lease)),
            tracker: ReferenceTracker::new("GpuResource", DisposalPolicy::Exclusive),
            kind,
            usage,
            extent,
            element_size,
            format,
            memory,
            footprint,
            views,
            state: Mutex::new(usage.initial_state()),
        })
    }

    fn create_views(
        device: &GraphicsDevice,
        memory: MemoryHandle,
        usage: ResourceUsage,
        view: impl Fn(ViewKind) -> ViewDescriptor,
    ) -> Result<ResourceViews> {
        let primary_kind = match usage {
            ResourceUsage::ReadWrite => ViewKind::UnorderedAccess,
            _ => ViewKind::ShaderResource,
        };
        let primary = Self::write_view(device, memory, &view(primary_kind))?;
        let read_only = if usage == ResourceUsage::ReadWrite {
            match Self::write_view(device, memory, &view(ViewKind::ShaderResource)) {
                Ok(handles) => Some(handles),
                Err(err) => {
                    device.descriptors().return_handles(primary);
                    return Err(err);
                }
            }
        } else {
            None
        };
        Ok(ResourceViews { primary, read_only })
    }

    fn write_view(
        device: &GraphicsDevice,
        memory: MemoryHandle,
        descriptor: &ViewDescriptor,
    ) -> Result<DescriptorHandles> {
        let handles = device.descriptors().rent()?;
        let backend = device.backend();
        let written = backend
            .create_view(memory, descriptor, handles.cpu)
            .and_then(|()| backend.create_view(memory, descriptor, handles.cpu_only));
        if let Err(err) = written {
            device.descriptors().return_handles(handles);
            return Err(err);
        }
        Ok(handles)
    }

    /// Shape of the resource.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Usage of the resource.
    pub fn usage(&self) -> ResourceUsage {
        self.usage
    }

    /// Dimensions in elements.
    pub fn extent(&self) -> Extent3d {
        self.extent
    }

    /// Size of one element in bytes.
    pub fn element_size(&self) -> u32 {
        self.element_size
    }

    /// Texel format of typed textures.
    pub fn format(&self) -> Option<ElementFormat> {
        self.format
    }

    /// Size of the element data in bytes, without row padding.
    pub fn size_in_bytes(&self) -> u64 {
        self.extent.volume() * self.element_size as u64
    }

    /// Layout of a CPU-visible texture in its linear memory.
    pub fn footprint(&self) -> Option<PlacedFootprint> {
        self.footprint
    }

    /// The device that owns the resource.
    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    /// Native memory handle. Only valid while leased.
    pub fn memory(&self) -> MemoryHandle {
        self.memory
    }

    /// Current access state.
    pub fn state(&self) -> ResourceState {
        *self.state.lock()
    }

    /// Returns true once the resource has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.tracker.is_disposed()
    }

    /// Release the descriptors and memory. Disposing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::InvalidOperation`] while the resource is
    /// leased.
    pub fn dispose(&self) -> Result<()> {
        self.dispose_tracked()
    }

    pub(crate) fn belongs_to(&self, device: &Arc<GraphicsDevice>) -> bool {
        Arc::ptr_eq(&self.device, device)
    }

    /// Descriptor to bind for the current state.
    pub(crate) fn binding_handle(&self) -> Result<GpuDescriptorHandle> {
        let views = self.views.as_ref().ok_or_else(|| {
            ComputeError::InvalidOperation(format!(
                "{:?} {} cannot be bound to a kernel",
                self.usage,
                self.kind.name()
            ))
        })?;
        match (self.usage, self.state(), views.read_only) {
            (ResourceUsage::ReadOnly, ResourceState::Common | ResourceState::ShaderResource, _)
            | (ResourceUsage::ReadWrite, ResourceState::UnorderedAccess, _) => {
                Ok(views.primary.gpu)
            }
            (ResourceUsage::ReadWrite, ResourceState::ShaderResource, Some(read_only)) => {
                Ok(read_only.gpu)
            }
            (usage, state, _) => Err(ComputeError::InvalidOperation(format!(
                "cannot bind a {usage:?} {} in the {state:?} state",
                self.kind.name()
            ))),
        }
    }

    /// Unordered access descriptors of a ReadWrite resource currently in
    /// the unordered access state.
    fn unordered_access_views(&self, operation: &str) -> Result<DescriptorHandles> {
        match (self.usage, self.state(), self.views) {
            (ResourceUsage::ReadWrite, ResourceState::UnorderedAccess, Some(views)) => {
                Ok(views.primary)
            }
            (usage, state, _) => Err(ComputeError::InvalidOperation(format!(
                "{operation} needs a ReadWrite {} in the UnorderedAccess state, \
                 not a {usage:?} one in {state:?}",
                self.kind.name()
            ))),
        }
    }

    /// Descriptor binding the resource as a kernel's output.
    pub(crate) fn output_handle(&self) -> Result<GpuDescriptorHandle> {
        Ok(self.unordered_access_views("a kernel output")?.gpu)
    }

    /// Shader-visible and CPU-only descriptors of the unordered access view,
    /// as a clear needs them.
    pub(crate) fn clear_handles(&self) -> Result<(GpuDescriptorHandle, CpuDescriptorHandle)> {
        let views = self.unordered_access_views("clearing")?;
        Ok((views.gpu, views.cpu_only))
    }

    /// Record a transition of a ReadWrite resource between unordered access
    /// and shader resource.
    pub(crate) fn transition(&self, list: &mut CommandList, state: ResourceState) -> Result<()> {
        if self.usage != ResourceUsage::ReadWrite {
            return Err(ComputeError::InvalidOperation(format!(
                "only ReadWrite resources can be transitioned, this is {:?}",
                self.usage
            )));
        }
        if !state.is_compute_only() {
            return Err(ComputeError::InvalidOperation(format!(
                "cannot transition a resource to {state:?}"
            )));
        }
        let mut current = self.state.lock();
        list.transition_barrier(self.memory, *current, state)?;
        *current = state;
        Ok(())
    }

    fn copy_location(&self) -> TextureCopyLocation {
        match self.footprint {
            Some(footprint) => TextureCopyLocation::Placed {
                memory: self.memory,
                footprint,
            },
            None => TextureCopyLocation::Subresource {
                memory: self.memory,
                extent: self.extent,
                element_size: self.element_size,
            },
        }
    }

    fn check_copy_compatible(&self, destination: &GpuResource) -> Result<()> {
        if std::ptr::eq(self, destination) {
            return Err(ComputeError::InvalidOperation(
                "a resource cannot be copied onto itself".to_string(),
            ));
        }
        if self.kind != destination.kind || self.element_size != destination.element_size {
            return Err(ComputeError::InvalidOperation(format!(
                "cannot copy a {} of {}-byte elements into a {} of {}-byte elements",
                self.kind.name(),
                self.element_size,
                destination.kind.name(),
                destination.element_size
            )));
        }
        if self.usage == ResourceUsage::ReadBack {
            return Err(ComputeError::InvalidOperation(
                "ReadBack resources cannot be copy sources".to_string(),
            ));
        }
        if destination.usage == ResourceUsage::Upload {
            return Err(ComputeError::InvalidOperation(
                "Upload resources cannot be copy destinations".to_string(),
            ));
        }
        Ok(())
    }

    fn check_data_len(&self, len: usize, region: Region) -> Result<()> {
        let expected = region.extent.volume() * self.element_size as u64;
        ensure_in_range("data length", len as u64, expected, expected)
    }

    // ========================================================================
    // GPU to GPU copies
    // ========================================================================

    /// Copy `source_region` of this resource into `destination` at
    /// `destination_offset`.
    ///
    /// Uses the copy queue when both resources are in the common state and
    /// the compute queue otherwise. Blocks until the copy has completed.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::ArgumentOutOfRange`] if either region falls
    /// outside its resource and [`ComputeError::GraphicsDeviceMismatch`] if
    /// the resources belong to different devices.
    pub fn copy_to(
        &self,
        destination: &GpuResource,
        source_region: Region,
        destination_offset: Offset3d,
    ) -> Result<()> {
        self.check_copy_compatible(destination)?;
        validate_region(source_region, self.extent, SOURCE_AXES)?;
        validate_region(
            Region::new(destination_offset, source_region.extent),
            destination.extent,
            DESTINATION_AXES,
        )?;

        let device = self.device.reference_tracking_lease()?;
        let _source = self.acquire_lease()?;
        let _destination = destination.acquire_lease()?;
        device.check_device_lost()?;
        if !destination.belongs_to(&self.device) {
            return Err(ComputeError::GraphicsDeviceMismatch);
        }
        if source_region.extent.volume() == 0 {
            return Ok(());
        }

        let source_state = self.state();
        let destination_state = destination.state();
        let list_type = CommandListType::for_copy(&[source_state, destination_state]);
        let mut list = CommandList::rent(&self.device, list_type)?;

        if list_type == CommandListType::Compute {
            list.transition_barrier(self.memory, source_state, ResourceState::CopySource)?;
            list.transition_barrier(
                destination.memory,
                destination_state,
                ResourceState::CopyDest,
            )?;
        }

        if self.kind == ResourceKind::Buffer {
            let element_size = self.element_size as u64;
            list.copy_buffer_region(
                destination.memory,
                destination_offset.x as u64 * element_size,
                self.memory,
                source_region.offset.x as u64 * element_size,
                source_region.extent.width as u64 * element_size,
            )?;
        } else {
            list.copy_texture_region(
                destination.copy_location(),
                destination_offset,
                self.copy_location(),
                source_region,
            )?;
        }

        if list_type == CommandListType::Compute {
            list.transition_barrier(self.memory, ResourceState::CopySource, source_state)?;
            list.transition_barrier(
                destination.memory,
                ResourceState::CopyDest,
                destination_state,
            )?;
        }

        log::trace!(
            "GpuResource: copying {:?} of a {} on the {list_type:?} queue",
            source_region.extent,
            self.kind.name()
        );
        list.execute_and_wait_for_completion()
    }

    /// Copy `source_region` of `source` into this resource at
    /// `destination_offset`.
    pub fn copy_from(
        &self,
        source: &GpuResource,
        source_region: Region,
        destination_offset: Offset3d,
    ) -> Result<()> {
        source.copy_to(self, source_region, destination_offset)
    }

    // ========================================================================
    // CPU copies
    // ========================================================================

    /// Write tightly packed element data into `region`.
    ///
    /// GPU-resident resources are written through a staging upload and the
    /// call blocks until the copy has completed. Upload and ReadBack
    /// resources are written through their mapping.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::ArgumentOutOfRange`] if `region` falls outside
    /// the resource or `data` is not exactly the size of `region`.
    pub fn copy_from_bytes(&self, data: &[u8], region: Region) -> Result<()> {
        validate_region(region, self.extent, DESTINATION_AXES)?;
        self.check_data_len(data.len(), region)?;

        let device = self.device.reference_tracking_lease()?;
        let _resource = self.acquire_lease()?;
        device.check_device_lost()?;
        if region.extent.volume() == 0 {
            return Ok(());
        }

        if !self.usage.is_gpu_resident() {
            let footprint = self.mapped_footprint();
            let row_bytes = region.extent.width as usize * self.element_size as usize;
            for (offset, packed) in rows(&footprint, region) {
                device
                    .backend()
                    .write_mapped(self.memory, offset, &data[packed..packed + row_bytes])?;
            }
            return Ok(());
        }

        let footprint = self.staging_footprint(region.extent);
        let staging = device
            .staging()
            .allocate(HeapType::Upload, footprint.total_size())?;
        let row_bytes = region.extent.width as usize * self.element_size as usize;
        for (offset, packed) in rows(&footprint, Region::whole(region.extent)) {
            staging.write(offset, &data[packed..packed + row_bytes])?;
        }

        let state = self.state();
        let list_type = CommandListType::for_copy(&[state]);
        let mut list = CommandList::rent(&self.device, list_type)?;
        if list_type == CommandListType::Compute {
            list.transition_barrier(self.memory, state, ResourceState::CopyDest)?;
        }
        if self.kind == ResourceKind::Buffer {
            list.copy_buffer_region(
                self.memory,
                region.offset.x as u64 * self.element_size as u64,
                staging.memory(),
                staging.offset(),
                data.len() as u64,
            )?;
        } else {
            list.copy_texture_region(
                self.copy_location(),
                region.offset,
                TextureCopyLocation::Placed {
                    memory: staging.memory(),
                    footprint: PlacedFootprint {
                        offset: staging.offset(),
                        ..footprint
                    },
                },
                Region::whole(region.extent),
            )?;
        }
        if list_type == CommandListType::Compute {
            list.transition_barrier(self.memory, ResourceState::CopyDest, state)?;
        }

        log::trace!(
            "GpuResource: uploading {} bytes to a {} on the {list_type:?} queue",
            data.len(),
            self.kind.name()
        );
        list.execute_and_wait_for_completion()
    }

    /// Read `region` into tightly packed element data.
    ///
    /// GPU-resident resources are read through a staging readback and the
    /// call blocks until the copy has completed. Upload and ReadBack
    /// resources are read through their mapping.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::ArgumentOutOfRange`] if `region` falls outside
    /// the resource or `out` is not exactly the size of `region`.
    pub fn copy_to_bytes(&self, out: &mut [u8], region: Region) -> Result<()> {
        validate_region(region, self.extent, SOURCE_AXES)?;
        self.check_data_len(out.len(), region)?;

        let device = self.device.reference_tracking_lease()?;
        let _resource = self.acquire_lease()?;
        device.check_device_lost()?;
        if region.extent.volume() == 0 {
            return Ok(());
        }

        let row_bytes = region.extent.width as usize * self.element_size as usize;
        if !self.usage.is_gpu_resident() {
            let footprint = self.mapped_footprint();
            for (offset, packed) in rows(&footprint, region) {
                device
                    .backend()
                    .read_mapped(self.memory, offset, &mut out[packed..packed + row_bytes])?;
            }
            return Ok(());
        }

        let footprint = self.staging_footprint(region.extent);
        let staging = device
            .staging()
            .allocate(HeapType::ReadBack, footprint.total_size())?;

        let state = self.state();
        let list_type = CommandListType::for_copy(&[state]);
        let mut list = CommandList::rent(&self.device, list_type)?;
        if list_type == CommandListType::Compute {
            list.transition_barrier(self.memory, state, ResourceState::CopySource)?;
        }
        if self.kind == ResourceKind::Buffer {
            list.copy_buffer_region(
                staging.memory(),
                staging.offset(),
                self.memory,
                region.offset.x as u64 * self.element_size as u64,
                out.len() as u64,
            )?;
        } else {
            list.copy_texture_region(
                TextureCopyLocation::Placed {
                    memory: staging.memory(),
                    footprint: PlacedFootprint {
                        offset: staging.offset(),
                        ..footprint
                    },
                },
                Offset3d::ZERO,
                self.copy_location(),
                region,
            )?;
        }
        if list_type == CommandListType::Compute {
            list.transition_barrier(self.memory, ResourceState::CopySource, state)?;
        }

        log::trace!(
            "GpuResource: reading back {} bytes from a {} on the {list_type:?} queue",
            out.len(),
            self.kind.name()
        );
        list.execute_and_wait_for_completion()?;

        for (offset, packed) in rows(&footprint, Region::whole(region.extent)) {
            staging.read(offset, &mut out[packed..packed + row_bytes])?;
        }
        Ok(())
    }

    /// Layout of the resource's own memory for mapped access.
    fn mapped_footprint(&self) -> PlacedFootprint {
        self.footprint
            .unwrap_or_else(|| buffer_footprint(self.extent, self.element_size))
    }

    /// Layout of a staging copy of `extent` elements.
    fn staging_footprint(&self, extent: Extent3d) -> PlacedFootprint {
        if self.kind.is_texture() {
            texture_footprint(extent, self.element_size)
        } else {
            buffer_footprint(extent, self.element_size)
        }
    }
}

impl ReferenceTracked for GpuResource {
    fn reference_tracker(&self) -> &ReferenceTracker {
        &self.tracker
    }

    fn on_teardown(&self) {
        if let Some(views) = self.views {
            self.device.descriptors().return_handles(views.primary);
            if let Some(read_only) = views.read_only {
                self.device.descriptors().return_handles(read_only);
            }
        }
        self.device.backend().destroy_resource(self.memory);
        self.device.resource_destroyed();
        log::trace!(
            "GpuResource: released {:?} {} {:?}",
            self.usage,
            self.kind.name(),
            self.memory
        );

        // Releasing the device lease may run the device's deferred teardown.
        let device_lease = self.device_lease.lock().take();
        drop(device_lease);
    }
}

impl AsRef<GpuResource> for GpuResource {
    fn as_ref(&self) -> &GpuResource {
        self
    }
}

impl Drop for GpuResource {
    fn drop(&mut self) {
        if let Err(err) = self.dispose_tracked() {
            log::error!("GpuResource: dispose on drop failed: {err}");
        }
    }
}

impl std::fmt::Debug for GpuResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuResource")
            .field("kind", &self.kind)
            .field("usage", &self.usage)
            .field("extent", &self.extent)
            .field("element_size", &self.element_size)
            .field("state", &self.state())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(GpuResource: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_footprint_pitch() {
        let footprint = texture_footprint(Extent3d::new_2d(10, 3), 4);
        assert_eq!(footprint.row_pitch, 256);
        let wide = texture_footprint(Extent3d::new_2d(100, 2), 4);
        assert_eq!(wide.row_pitch, 512);
    }

    #[test]
    fn test_rows_follow_pitch() {
        let footprint = texture_footprint(Extent3d::new(4, 2, 2), 4);
        let offsets: Vec<_> = rows(&footprint, Region::whole(footprint.extent)).collect();
        assert_eq!(
            offsets,
            vec![(0, 0), (256, 16), (512, 32), (768, 48)]
        );

        let inner: Vec<_> = rows(&footprint, Region::xy(1, 1, 2, 1)).collect();
        assert_eq!(inner, vec![(256 + 4, 0)]);
    }

    #[test]
    fn test_validate_region() {
        let extent = Extent3d::new_2d(8, 4);
        assert!(validate_region(Region::xy(0, 0, 8, 4), extent, SOURCE_AXES).is_ok());
        assert!(validate_region(Region::xy(8, 4, 0, 0), extent, SOURCE_AXES).is_ok());
        assert_eq!(
            validate_region(Region::xy(4, 0, 5, 1), extent, SOURCE_AXES),
            Err(ComputeError::ArgumentOutOfRange {
                name: "source x",
                value: 9,
                min: 0,
                max: 8,
            })
        );
    }
}
