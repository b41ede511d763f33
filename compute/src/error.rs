//! Compute runtime error types.

use crate::types::{ElementFormat, ResourceKind, ResourceUsage};

/// Reason reported by the adapter when a device is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceLostReason {
    /// The device stopped responding (TDR).
    Hung,
    /// The adapter was physically removed or disabled.
    Removed,
    /// The device was reset by the driver.
    Reset,
    /// The driver hit an internal error.
    DriverInternalError,
    /// The application issued an invalid call.
    InvalidCall,
    /// The driver did not report a reason.
    Unknown,
}

impl std::fmt::Display for DeviceLostReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::Hung => "device hung",
            Self::Removed => "device removed",
            Self::Reset => "device reset",
            Self::DriverInternalError => "driver internal error",
            Self::InvalidCall => "invalid call",
            Self::Unknown => "unknown",
        };
        f.write_str(reason)
    }
}

/// Errors that can occur in the compute runtime.
///
/// Every error is returned synchronously from the call that violated a
/// precondition. Nothing is retried internally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComputeError {
    /// The adapter reported removal. The device cannot be used any more.
    #[error("GPU device lost: {0}")]
    DeviceLost(DeviceLostReason),
    /// The element format is not supported for the requested usage.
    #[error("unsupported resource type: {usage:?} {kind:?} of {format:?}")]
    UnsupportedResourceType {
        /// Kind of the resource being created.
        kind: ResourceKind,
        /// Usage of the resource being created.
        usage: ResourceUsage,
        /// Element format of the resource.
        format: ElementFormat,
    },
    /// An operation spans resources owned by different devices.
    #[error("graphics device mismatch: resource belongs to a different device")]
    GraphicsDeviceMismatch,
    /// The object is used in a state that does not allow the operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// The object was disposed or is being torn down.
    #[error("object disposed: {0}")]
    ObjectDisposed(&'static str),
    /// An argument was outside its valid range.
    #[error("argument {name} out of range: {value} not in [{min}, {max}]")]
    ArgumentOutOfRange {
        /// Name of the argument.
        name: &'static str,
        /// Value that was passed.
        value: u64,
        /// Inclusive lower bound.
        min: u64,
        /// Inclusive upper bound.
        max: u64,
    },
    /// The driver could not allocate GPU memory.
    #[error("out of GPU memory")]
    OutOfMemory,
    /// Any other driver failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl ComputeError {
    /// Returns true if this error means the device must be recreated.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, Self::DeviceLost(_))
    }
}

/// Result type used throughout the compute runtime.
pub type Result<T> = std::result::Result<T, ComputeError>;

/// Checks that `value` lies in `[min, max]`.
pub(crate) fn ensure_in_range(name: &'static str, value: u64, min: u64, max: u64) -> Result<()> {
    if value < min || value > max {
        return Err(ComputeError::ArgumentOutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}
