//! Common types for compute resources.
//!
//! This module contains resource kinds and usages, access states, texel
//! formats and the extent/offset types used by copy operations.

mod format;
mod region;
mod resource;

pub use format::{ElementFormat, FormatSupport, TextureElement};
pub use region::{Extent3d, Offset3d, Region};
pub use resource::{
    AllocationMode, CommandListType, HeapType, ResourceKind, ResourceState, ResourceUsage,
    required_format_support,
};
