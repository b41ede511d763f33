//! GPU resources.
//!
//! [`GpuResource`] is the untyped resource shared by every kind. The typed
//! facades add an element type on top of it:
//!
//! - [`Buffer<T>`] - structured buffer of `T`
//! - [`Texture1D<T>`], [`Texture2D<T>`], [`Texture3D<T>`] - typed textures of
//!   a [`TextureElement`](crate::TextureElement)

mod buffer;
mod resource;
mod texture;

pub use buffer::Buffer;
pub use resource::{GpuResource, TEXTURE_ROW_PITCH_ALIGNMENT, texture_footprint};
pub use texture::{Texture1D, Texture2D, Texture3D};
