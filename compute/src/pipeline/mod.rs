//! Compute kernels, root signature layouts and the pipeline cache.
//!
//! A kernel is compiled elsewhere. The runtime receives its bytecode and a
//! description of its bindings as a [`KernelDescriptor`], and loads
//! per-dispatch data through a [`DispatchDataLoader`].
//!
//! # Root signature layout
//!
//! | Slot | Contents |
//! |------|----------|
//! | 0 | 32-bit root constants holding the kernel's scalar parameters |
//! | 1.. | one single-descriptor table per resource, in binding order |
//!
//! Pixel-shader-like kernels reserve slot 1 for their output texture, and
//! their own resources start at slot 2.

mod cache;
mod kernel;
mod loader;

pub use cache::{PipelineCache, PipelineData, PipelineKey};
pub use kernel::{ComputeKernel, KernelDescriptor, KernelId};
pub use loader::{DispatchDataLoader, ResourceBinding};

/// Maximum number of root signature slots a kernel may use.
pub const MAX_ROOT_SIGNATURE_SLOTS: u32 = 64;

/// Root slot holding the 32-bit constants.
pub const CONSTANTS_ROOT_SLOT: u32 = 0;

/// Root slot of the implicit output texture of pixel-shader-like kernels.
pub const OUTPUT_TEXTURE_ROOT_SLOT: u32 = 1;

/// Root signature cost of a kernel's bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BindingLayout {
    /// Total size of the scalar parameters in bytes.
    pub scalar_bytes: u32,
    /// Number of descriptor tables.
    pub resource_tables: u32,
    /// Number of 64-bit root descriptors.
    pub root_descriptors: u32,
}

impl BindingLayout {
    /// Number of root slots used: one per 32-bit scalar, one per table and
    /// two per root descriptor.
    pub fn slot_cost(&self) -> u32 {
        self.scalar_bytes.div_ceil(4) + self.resource_tables + self.root_descriptors * 2
    }
}

/// A kernel's bindings exceed the root signature budget.
///
/// This is reported to whoever compiles the kernel. The runtime assumes the
/// budget holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("kernel bindings use {used} root signature slots, the limit is {limit}")]
pub struct BindingBudgetExceeded {
    /// Slots the layout needs.
    pub used: u32,
    /// Slots available.
    pub limit: u32,
}

/// Check a binding layout against [`MAX_ROOT_SIGNATURE_SLOTS`]. Returns the
/// slot cost on success.
pub fn check_binding_budget(layout: &BindingLayout) -> Result<u32, BindingBudgetExceeded> {
    let used = layout.slot_cost();
    if used > MAX_ROOT_SIGNATURE_SLOTS {
        return Err(BindingBudgetExceeded {
            used,
            limit: MAX_ROOT_SIGNATURE_SLOTS,
        });
    }
    Ok(used)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::empty(0, 0, 0, 0)]
    #[case::scalars_only(16, 0, 0, 4)]
    #[case::partial_scalar(6, 0, 0, 2)]
    #[case::tables(0, 3, 0, 3)]
    #[case::root_descriptors(4, 1, 2, 6)]
    fn test_slot_cost(
        #[case] scalar_bytes: u32,
        #[case] resource_tables: u32,
        #[case] root_descriptors: u32,
        #[case] expected: u32,
    ) {
        let layout = BindingLayout {
            scalar_bytes,
            resource_tables,
            root_descriptors,
        };
        assert_eq!(layout.slot_cost(), expected);
    }

    #[test]
    fn test_budget_boundary() {
        let exact = BindingLayout {
            scalar_bytes: 60 * 4,
            resource_tables: 4,
            root_descriptors: 0,
        };
        assert_eq!(check_binding_budget(&exact), Ok(64));

        let over = BindingLayout {
            resource_tables: 5,
            ..exact
        };
        assert_eq!(
            check_binding_budget(&over),
            Err(BindingBudgetExceeded {
                used: 65,
                limit: 64
            })
        );
    }
}
