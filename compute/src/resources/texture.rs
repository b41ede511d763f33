//! Typed textures.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::backend::PlacedFootprint;
use crate::device::GraphicsDevice;
use crate::error::Result;
use crate::types::{ElementFormat, Offset3d, Region, ResourceState, ResourceUsage, TextureElement};

use super::GpuResource;

macro_rules! texture_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name<T: TextureElement> {
            resource: GpuResource,
            _marker: PhantomData<fn() -> T>,
        }

        impl<T: TextureElement> $name<T> {
            pub(crate) fn new(resource: GpuResource) -> Self {
                Self {
                    resource,
                    _marker: PhantomData,
                }
            }

            /// Width in texels.
            pub fn width(&self) -> u32 {
                self.resource.extent().width
            }

            /// Texel format.
            pub fn format(&self) -> ElementFormat {
                T::FORMAT
            }

            /// Usage the texture was created with.
            pub fn usage(&self) -> ResourceUsage {
                self.resource.usage()
            }

            /// Current access state.
            pub fn state(&self) -> ResourceState {
                self.resource.state()
            }

            /// Linear layout of an Upload or ReadBack texture.
            pub fn footprint(&self) -> Option<PlacedFootprint> {
                self.resource.footprint()
            }

            /// The device that owns the texture.
            pub fn device(&self) -> &Arc<GraphicsDevice> {
                self.resource.device()
            }

            /// The untyped resource.
            pub fn resource(&self) -> &GpuResource {
                &self.resource
            }

            /// Release the texture's memory and descriptors.
            pub fn dispose(&self) -> Result<()> {
                self.resource.dispose()
            }

            /// Write tightly packed texels covering the whole texture.
            pub fn copy_from_slice(&self, data: &[T]) -> Result<()> {
                self.copy_from_slice_region(data, Region::whole(self.resource.extent()))
            }

            /// Write tightly packed texels into `region`.
            pub fn copy_from_slice_region(&self, data: &[T], region: Region) -> Result<()> {
                self.resource
                    .copy_from_bytes(bytemuck::cast_slice(data), region)
            }

            /// Read the whole texture into tightly packed texels.
            pub fn copy_to_slice(&self, out: &mut [T]) -> Result<()> {
                self.copy_to_slice_region(out, Region::whole(self.resource.extent()))
            }

            /// Read `region` into tightly packed texels.
            pub fn copy_to_slice_region(&self, out: &mut [T], region: Region) -> Result<()> {
                self.resource
                    .copy_to_bytes(bytemuck::cast_slice_mut(out), region)
            }

            /// Read the whole texture.
            pub fn to_vec(&self) -> Result<Vec<T>> {
                let mut out = vec![T::zeroed(); self.resource.extent().volume() as usize];
                self.copy_to_slice(&mut out)?;
                Ok(out)
            }

            /// Copy the whole texture into `destination` at its origin.
            pub fn copy_to(&self, destination: &$name<T>) -> Result<()> {
                self.copy_to_region(
                    destination,
                    Region::whole(self.resource.extent()),
                    Offset3d::ZERO,
                )
            }

            /// Copy `source_region` into `destination` at `destination_offset`.
            pub fn copy_to_region(
                &self,
                destination: &$name<T>,
                source_region: Region,
                destination_offset: Offset3d,
            ) -> Result<()> {
                self.resource
                    .copy_to(&destination.resource, source_region, destination_offset)
            }

            /// Copy the whole of `source` into this texture at its origin.
            pub fn copy_from(&self, source: &$name<T>) -> Result<()> {
                source.copy_to(self)
            }
        }

        impl<T: TextureElement> AsRef<GpuResource> for $name<T> {
            fn as_ref(&self) -> &GpuResource {
                &self.resource
            }
        }

        impl<T: TextureElement> std::fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("format", &T::FORMAT)
                    .field("extent", &self.resource.extent())
                    .field("usage", &self.usage())
                    .field("state", &self.state())
                    .finish_non_exhaustive()
            }
        }
    };
}

texture_type!(
    /// A one-dimensional texture of `T` texels.
    Texture1D
);

texture_type!(
    /// A two-dimensional texture of `T` texels.
    Texture2D
);

texture_type!(
    /// A three-dimensional texture of `T` texels.
    Texture3D
);

impl<T: TextureElement> Texture2D<T> {
    /// Height in texels.
    pub fn height(&self) -> u32 {
        self.resource.extent().height
    }
}

impl<T: TextureElement> Texture3D<T> {
    /// Height in texels.
    pub fn height(&self) -> u32 {
        self.resource.extent().height
    }

    /// Depth in texels.
    pub fn depth(&self) -> u32 {
        self.resource.extent().depth
    }
}

static_assertions::assert_impl_all!(Texture2D<f32>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ComputeError;
    use crate::resources::TEXTURE_ROW_PITCH_ALIGNMENT;
    use crate::types::AllocationMode;
    use rstest::rstest;

    #[rstest]
    #[case::read_only(ResourceUsage::ReadOnly)]
    #[case::read_write(ResourceUsage::ReadWrite)]
    #[case::upload(ResourceUsage::Upload)]
    #[case::read_back(ResourceUsage::ReadBack)]
    fn test_texture_2d_round_trip(#[case] usage: ResourceUsage) {
        let device = GraphicsDevice::dummy().unwrap();
        let texture = device
            .create_texture_2d::<f32>(5, 3, usage, AllocationMode::Default)
            .unwrap();
        let data: Vec<f32> = (0..15).map(|i| i as f32).collect();
        texture.copy_from_slice(&data).unwrap();
        assert_eq!(texture.to_vec().unwrap(), data);
    }

    #[test]
    fn test_region_copy() {
        let device = GraphicsDevice::dummy().unwrap();
        let texture = device
            .create_texture_2d::<u32>(4, 4, ResourceUsage::ReadOnly, AllocationMode::Clear)
            .unwrap();
        texture
            .copy_from_slice_region(&[1, 2, 3, 4], Region::xy(1, 2, 2, 2))
            .unwrap();
        let mut row = [0u32; 4];
        texture
            .copy_to_slice_region(&mut row, Region::xy(0, 3, 4, 1))
            .unwrap();
        assert_eq!(row, [0, 3, 4, 0]);
    }

    #[test]
    fn test_texture_3d_to_texture_3d() {
        let device = GraphicsDevice::dummy().unwrap();
        let source = device
            .create_texture_3d::<u32>(2, 2, 2, ResourceUsage::Upload, AllocationMode::Default)
            .unwrap();
        let destination = device
            .create_texture_3d::<u32>(2, 2, 2, ResourceUsage::ReadWrite, AllocationMode::Clear)
            .unwrap();
        let data: Vec<u32> = (10..18).collect();
        source.copy_from_slice(&data).unwrap();
        destination.copy_from(&source).unwrap();
        assert_eq!(destination.to_vec().unwrap(), data);
        assert_eq!(destination.depth(), 2);
    }

    #[test]
    fn test_staging_texture_footprint() {
        let device = GraphicsDevice::dummy().unwrap();
        let texture = device
            .create_texture_2d::<u32>(3, 2, ResourceUsage::ReadBack, AllocationMode::Default)
            .unwrap();
        let footprint = texture.footprint().unwrap();
        assert_eq!(footprint.row_pitch, TEXTURE_ROW_PITCH_ALIGNMENT);
        assert_eq!(footprint.total_size(), TEXTURE_ROW_PITCH_ALIGNMENT + 12);

        let gpu = device
            .create_texture_2d::<u32>(3, 2, ResourceUsage::ReadOnly, AllocationMode::Default)
            .unwrap();
        assert!(gpu.footprint().is_none());
    }

    #[test]
    fn test_wrong_data_length() {
        let device = GraphicsDevice::dummy().unwrap();
        let texture = device
            .create_texture_1d::<f32>(8, ResourceUsage::ReadOnly, AllocationMode::Default)
            .unwrap();
        assert!(matches!(
            texture.copy_from_slice(&[1.0; 7]),
            Err(ComputeError::ArgumentOutOfRange {
                name: "data length",
                ..
            })
        ));
    }
}
