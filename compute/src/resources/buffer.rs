//! Structured buffers.

use std::marker::PhantomData;
use std::sync::Arc;

use bytemuck::Pod;

use crate::device::GraphicsDevice;
use crate::error::Result;
use crate::types::{Offset3d, Region, ResourceState, ResourceUsage};

use super::GpuResource;

/// A structured buffer of `T` elements.
pub struct Buffer<T: Pod> {
    resource: GpuResource,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Pod> Buffer<T> {
    pub(crate) fn new(resource: GpuResource) -> Self {
        Self {
            resource,
            _marker: PhantomData,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> u32 {
        self.resource.extent().width
    }

    /// Always false; buffers have at least one element.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Usage the buffer was created with.
    pub fn usage(&self) -> ResourceUsage {
        self.resource.usage()
    }

    /// Current access state.
    pub fn state(&self) -> ResourceState {
        self.resource.state()
    }

    /// The device that owns the buffer.
    pub fn device(&self) -> &Arc<GraphicsDevice> {
        self.resource.device()
    }

    /// The untyped resource.
    pub fn resource(&self) -> &GpuResource {
        &self.resource
    }

    /// Release the buffer's memory and descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::InvalidOperation`](crate::ComputeError::InvalidOperation)
    /// while a compute context holds the buffer.
    pub fn dispose(&self) -> Result<()> {
        self.resource.dispose()
    }

    /// Write `data` at the start of the buffer.
    pub fn copy_from_slice(&self, data: &[T]) -> Result<()> {
        self.copy_from_slice_at(data, 0)
    }

    /// Write `data` starting at element `offset`.
    pub fn copy_from_slice_at(&self, data: &[T], offset: u32) -> Result<()> {
        let region = Region::x(offset, slice_len(data));
        self.resource
            .copy_from_bytes(bytemuck::cast_slice(data), region)
    }

    /// Read `out.len()` elements from the start of the buffer.
    pub fn copy_to_slice(&self, out: &mut [T]) -> Result<()> {
        self.copy_to_slice_at(out, 0)
    }

    /// Read `out.len()` elements starting at element `offset`.
    pub fn copy_to_slice_at(&self, out: &mut [T], offset: u32) -> Result<()> {
        let region = Region::x(offset, slice_len(out));
        self.resource
            .copy_to_bytes(bytemuck::cast_slice_mut(out), region)
    }

    /// Read the whole buffer.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        let mut out = vec![T::zeroed(); self.len() as usize];
        self.copy_to_slice(&mut out)?;
        Ok(out)
    }

    /// Copy the whole buffer into the start of `destination`.
    pub fn copy_to(&self, destination: &Buffer<T>) -> Result<()> {
        self.copy_to_range(destination, 0, self.len(), 0)
    }

    /// Copy `length` elements from `source_offset` into `destination` at
    /// `destination_offset`.
    pub fn copy_to_range(
        &self,
        destination: &Buffer<T>,
        source_offset: u32,
        length: u32,
        destination_offset: u32,
    ) -> Result<()> {
        self.resource.copy_to(
            &destination.resource,
            Region::x(source_offset, length),
            Offset3d::new(destination_offset, 0, 0),
        )
    }

    /// Copy the whole of `source` into the start of this buffer.
    pub fn copy_from(&self, source: &Buffer<T>) -> Result<()> {
        source.copy_to(self)
    }
}

/// Length of a CPU slice as an element count. Lengths past `u32` saturate
/// and fail the region check downstream.
pub(super) fn slice_len<T>(data: &[T]) -> u32 {
    u32::try_from(data.len()).unwrap_or(u32::MAX)
}

impl<T: Pod> AsRef<GpuResource> for Buffer<T> {
    fn as_ref(&self) -> &GpuResource {
        &self.resource
    }
}

impl<T: Pod> std::fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("element", &std::any::type_name::<T>())
            .field("len", &self.len())
            .field("usage", &self.usage())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(Buffer<f32>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ComputeError;
    use crate::types::AllocationMode;
    use rstest::rstest;

    fn device() -> Arc<GraphicsDevice> {
        GraphicsDevice::dummy().unwrap()
    }

    #[rstest]
    #[case::read_only(ResourceUsage::ReadOnly)]
    #[case::read_write(ResourceUsage::ReadWrite)]
    #[case::upload(ResourceUsage::Upload)]
    #[case::read_back(ResourceUsage::ReadBack)]
    fn test_round_trip(#[case] usage: ResourceUsage) {
        let device = device();
        let buffer = device
            .create_buffer::<u32>(16, usage, AllocationMode::Default)
            .unwrap();
        let data: Vec<u32> = (0..16).collect();
        buffer.copy_from_slice(&data).unwrap();
        assert_eq!(buffer.to_vec().unwrap(), data);
        assert_eq!(buffer.state(), usage.initial_state());
    }

    #[test]
    fn test_partial_write() {
        let device = device();
        let buffer = device
            .create_buffer::<f32>(8, ResourceUsage::ReadWrite, AllocationMode::Clear)
            .unwrap();
        buffer.copy_from_slice_at(&[1.0, 2.0], 3).unwrap();
        let mut out = [0.0f32; 4];
        buffer.copy_to_slice_at(&mut out, 2).unwrap();
        assert_eq!(out, [0.0, 1.0, 2.0, 0.0]);
    }

    #[test]
    fn test_out_of_range_write() {
        let device = device();
        let buffer = device
            .create_buffer::<u32>(4, ResourceUsage::ReadOnly, AllocationMode::Default)
            .unwrap();
        let err = buffer.copy_from_slice_at(&[1, 2, 3], 2).unwrap_err();
        assert!(matches!(
            err,
            ComputeError::ArgumentOutOfRange {
                name: "destination x",
                value: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_buffer_to_buffer() {
        let device = device();
        let source = device
            .create_buffer::<u32>(6, ResourceUsage::ReadOnly, AllocationMode::Default)
            .unwrap();
        let destination = device
            .create_buffer::<u32>(6, ResourceUsage::ReadWrite, AllocationMode::Clear)
            .unwrap();
        source.copy_from_slice(&[1, 2, 3, 4, 5, 6]).unwrap();
        source.copy_to_range(&destination, 2, 3, 1).unwrap();
        assert_eq!(destination.to_vec().unwrap(), vec![0, 3, 4, 5, 0, 0]);
        assert_eq!(destination.state(), ResourceState::UnorderedAccess);
    }

    #[test]
    fn test_upload_is_never_a_destination() {
        let device = device();
        let upload = device
            .create_buffer::<u32>(4, ResourceUsage::Upload, AllocationMode::Default)
            .unwrap();
        let other = device
            .create_buffer::<u32>(4, ResourceUsage::ReadOnly, AllocationMode::Default)
            .unwrap();
        assert!(matches!(
            upload.copy_from(&other),
            Err(ComputeError::InvalidOperation(_))
        ));
        upload.copy_to(&other).unwrap();
    }
}
