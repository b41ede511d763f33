//! # RedLilium Compute
//!
//! GPU compute runtime for RedLilium: devices, resources, command
//! submission and kernel dispatch on top of a D3D12-style driver surface.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`GraphicsDevice`] - Logical device owning queues, pools and the pipeline cache
//! - [`Buffer`], [`Texture1D`], [`Texture2D`], [`Texture3D`] - Typed GPU resources
//! - [`ComputeContext`] - Batches kernel dispatches into one blocking submission
//! - [`ComputeKernel`] - Trait implemented by compiled kernels and their captures
//! - [`GpuBackend`] - Trait for the native driver, with [`DummyBackend`] for testing
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_compute::{AllocationMode, GraphicsDevice, ResourceUsage};
//!
//! let device = GraphicsDevice::dummy()?;
//! let buffer = device.create_buffer::<f32>(1024, ResourceUsage::ReadWrite, AllocationMode::Clear)?;
//! buffer.copy_from_slice(&data)?;
//! device.run(1024, 1, 1, &scale_kernel)?;
//! let result = buffer.to_vec()?;
//! ```

pub mod allocator;
pub mod backend;
pub mod command;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod lease;
pub mod pipeline;
pub mod resources;
pub mod types;

// Re-export main types for convenience
pub use backend::{DummyBackend, GpuBackend};
pub use config::{DeviceDescriptor, DeviceLimits};
pub use context::{
    ComputeContext, ThreadGroupSize, default_thread_group_size, dispatch_group_count,
};
pub use device::GraphicsDevice;
pub use error::{ComputeError, DeviceLostReason, Result};
pub use lease::{Lease, ReferenceTracked};
pub use pipeline::{
    BindingBudgetExceeded, BindingLayout, ComputeKernel, DispatchDataLoader, KernelDescriptor,
    PipelineData, check_binding_budget,
};
pub use resources::{Buffer, GpuResource, Texture1D, Texture2D, Texture3D};
pub use types::{
    AllocationMode, CommandListType, ElementFormat, Extent3d, FormatSupport, Offset3d, Region,
    ResourceKind, ResourceState, ResourceUsage, TextureElement,
};

/// Compute library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the compute subsystem.
pub fn init() {
    log::info!("RedLilium Compute v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_device() {
        let device = GraphicsDevice::dummy().unwrap();
        assert_eq!(device.backend().name(), "Dummy");
        assert_eq!(device.allocated_resource_count(), 0);
    }
}
