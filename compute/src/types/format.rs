//! Texel formats and format capability flags.

use bitflags::bitflags;

/// Texel format of a typed texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ElementFormat {
    /// 8-bit red channel, unsigned integer.
    R8Uint,
    /// 32-bit red channel, float.
    R32Float,
    /// 32-bit red channel, unsigned integer.
    R32Uint,
    /// 32-bit red channel, signed integer.
    R32Sint,
    /// 32-bit RG channels, float.
    Rg32Float,
    /// 32-bit RGB channels, float.
    Rgb32Float,
    /// 8-bit RGBA channels, unsigned normalized.
    Rgba8Unorm,
    /// 32-bit RGBA channels, float.
    Rgba32Float,
    /// 32-bit RGBA channels, unsigned integer.
    Rgba32Uint,
}

impl ElementFormat {
    /// Size in bytes of one texel.
    pub fn block_size(self) -> u32 {
        match self {
            Self::R8Uint => 1,
            Self::R32Float | Self::R32Uint | Self::R32Sint | Self::Rgba8Unorm => 4,
            Self::Rg32Float => 8,
            Self::Rgb32Float => 12,
            Self::Rgba32Float | Self::Rgba32Uint => 16,
        }
    }

    /// Returns true for normalized formats, which kernels see as floats.
    pub fn is_normalized(self) -> bool {
        matches!(self, Self::Rgba8Unorm)
    }
}

bitflags! {
    /// Capabilities the adapter reports for a format.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FormatSupport: u32 {
        /// Usable in buffers.
        const BUFFER = 1 << 0;
        /// Usable in 1D textures.
        const TEXTURE1D = 1 << 1;
        /// Usable in 2D textures.
        const TEXTURE2D = 1 << 2;
        /// Usable in 3D textures.
        const TEXTURE3D = 1 << 3;
        /// Loadable through a shader resource view.
        const SHADER_LOAD = 1 << 4;
        /// Bindable as a typed unordered access view.
        const TYPED_UNORDERED_ACCESS_VIEW = 1 << 5;
        /// Loadable through a typed unordered access view.
        const UAV_TYPED_LOAD = 1 << 6;
        /// Storable through a typed unordered access view.
        const UAV_TYPED_STORE = 1 << 7;
    }
}

impl Default for FormatSupport {
    fn default() -> Self {
        Self::empty()
    }
}

/// A CPU type that maps one-to-one onto a texel format.
pub trait TextureElement: bytemuck::Pod {
    /// Texel format matching this type's memory layout.
    const FORMAT: ElementFormat;
}

macro_rules! texture_element {
    ($($ty:ty => $format:ident),* $(,)?) => {
        $(
            impl TextureElement for $ty {
                const FORMAT: ElementFormat = ElementFormat::$format;
            }
        )*
    };
}

texture_element! {
    u8 => R8Uint,
    f32 => R32Float,
    u32 => R32Uint,
    i32 => R32Sint,
    [f32; 2] => Rg32Float,
    [f32; 3] => Rgb32Float,
    [u8; 4] => Rgba8Unorm,
    [f32; 4] => Rgba32Float,
    [u32; 4] => Rgba32Uint,
}
