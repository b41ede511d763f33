//! Device configuration.

/// Hardware limits enforced when creating resources.
///
/// The defaults match the Direct3D 12 feature level 11 requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceLimits {
    /// Maximum width of a 1D texture.
    pub max_texture_1d_width: u32,
    /// Maximum width and height of a 2D texture.
    pub max_texture_2d_dimension: u32,
    /// Maximum width, height and depth of a 3D texture.
    pub max_texture_3d_dimension: u32,
    /// Maximum size of a buffer in bytes.
    pub max_buffer_size: u64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_texture_1d_width: 16384,
            max_texture_2d_dimension: 16384,
            max_texture_3d_dimension: 2048,
            max_buffer_size: (1 << 31) - 1,
        }
    }
}

/// Descriptor for creating a [`GraphicsDevice`](crate::GraphicsDevice).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceDescriptor {
    /// Debug label for the device.
    pub label: Option<String>,
    /// Number of descriptor slots allocated each time the descriptor pool grows.
    pub descriptor_heap_capacity: u32,
    /// Size of each staging memory page used by CPU copies.
    pub staging_page_size: u64,
    /// Resource limits.
    pub limits: DeviceLimits,
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            descriptor_heap_capacity: 256,
            staging_page_size: 1 << 20,
            limits: DeviceLimits::default(),
        }
    }
}

impl DeviceDescriptor {
    /// Create a descriptor with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the growth step of the descriptor pool.
    pub fn with_descriptor_heap_capacity(mut self, capacity: u32) -> Self {
        self.descriptor_heap_capacity = capacity;
        self
    }

    /// Set the staging page size.
    pub fn with_staging_page_size(mut self, size: u64) -> Self {
        self.staging_page_size = size;
        self
    }

    /// Set the resource limits.
    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builder() {
        let desc = DeviceDescriptor::new()
            .with_label("compute")
            .with_descriptor_heap_capacity(16)
            .with_staging_page_size(4096);
        assert_eq!(desc.label.as_deref(), Some("compute"));
        assert_eq!(desc.descriptor_heap_capacity, 16);
        assert_eq!(desc.staging_page_size, 4096);
        assert_eq!(desc.limits, DeviceLimits::default());
    }
}
