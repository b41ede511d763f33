//! Pools for scarce driver objects.
//!
//! The device owns one of each pool:
//!
//! - [`DescriptorAllocator`]: descriptor slots, rented per resource
//! - [`CommandAllocatorPool`]: command allocators, recycled once their
//!   submission's fence value is reached
//! - [`StagingAllocator`]: CPU-visible memory suballocated for uploads and
//!   readbacks
//!
//! Pools know nothing about resource semantics. All rentals are internally
//! synchronized; the only blocking call is the driver call that creates new
//! pool capacity when a pool is exhausted.

mod command;
mod descriptor;
mod staging;

pub use command::CommandAllocatorPool;
pub use descriptor::{DescriptorAllocator, DescriptorHandles};
pub use staging::{STAGING_ALIGNMENT, StagingAllocation, StagingAllocator};

/// Align a value up to the given power-of-two alignment.
#[inline]
pub(crate) const fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(40, 4), 40);
    }
}
