//! Resource kinds, usages and access states.

use super::FormatSupport;

/// Shape of a GPU resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Linear buffer of structured elements.
    Buffer,
    /// One-dimensional texture.
    Texture1D,
    /// Two-dimensional texture.
    Texture2D,
    /// Three-dimensional texture.
    Texture3D,
}

impl ResourceKind {
    /// Returns true for the texture kinds.
    pub fn is_texture(self) -> bool {
        !matches!(self, Self::Buffer)
    }

    /// Number of meaningful axes for this kind.
    pub fn dimensions(self) -> u32 {
        match self {
            Self::Buffer | Self::Texture1D => 1,
            Self::Texture2D => 2,
            Self::Texture3D => 3,
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Buffer => "buffer",
            Self::Texture1D => "texture 1D",
            Self::Texture2D => "texture 2D",
            Self::Texture3D => "texture 3D",
        }
    }
}

/// How a resource is used, which decides its heap and initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceUsage {
    /// GPU resident, readable from kernels.
    ReadOnly,
    /// GPU resident, readable and writable from kernels.
    ReadWrite,
    /// CPU writable staging resource, source of uploads.
    Upload,
    /// CPU readable staging resource, destination of readbacks.
    ReadBack,
}

impl ResourceUsage {
    /// Returns true if the resource lives in GPU-only memory.
    pub fn is_gpu_resident(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    /// Memory heap used to back this usage.
    pub fn heap_type(self) -> HeapType {
        match self {
            Self::ReadOnly | Self::ReadWrite => HeapType::Default,
            Self::Upload => HeapType::Upload,
            Self::ReadBack => HeapType::ReadBack,
        }
    }

    /// State a freshly created resource starts in.
    pub fn initial_state(self) -> ResourceState {
        match self {
            Self::ReadWrite => ResourceState::UnorderedAccess,
            Self::ReadOnly | Self::Upload | Self::ReadBack => ResourceState::Common,
        }
    }
}

/// Memory heap a native allocation is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapType {
    /// GPU-only memory.
    Default,
    /// CPU-write, GPU-read memory.
    Upload,
    /// GPU-write, CPU-read memory.
    ReadBack,
}

/// Access state of a resource as seen by the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Default state, usable by the copy queue.
    Common,
    /// Source of a copy operation.
    CopySource,
    /// Destination of a copy operation.
    CopyDest,
    /// Read/write access from kernels.
    UnorderedAccess,
    /// Read-only access from kernels.
    ShaderResource,
}

impl ResourceState {
    /// Returns true if only the compute queue may transition out of this state.
    pub fn is_compute_only(self) -> bool {
        matches!(self, Self::UnorderedAccess | Self::ShaderResource)
    }
}

/// Initialization of newly allocated memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AllocationMode {
    /// Contents are undefined until written.
    #[default]
    Default,
    /// Contents are zeroed.
    Clear,
}

/// Queue type a command list is recorded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandListType {
    /// Compute queue: dispatches, copies and state transitions.
    Compute,
    /// Copy queue: copies between resources in the common state only.
    Copy,
}

impl CommandListType {
    /// Picks the queue for a copy between resources in the given states.
    ///
    /// The copy queue cannot transition resources, so it is only used when
    /// every endpoint is already in [`ResourceState::Common`].
    pub fn for_copy(states: &[ResourceState]) -> Self {
        if states.iter().all(|state| *state == ResourceState::Common) {
            Self::Copy
        } else {
            Self::Compute
        }
    }
}

/// Format capabilities required to create a resource of `kind` with `usage`.
pub fn required_format_support(kind: ResourceKind, usage: ResourceUsage) -> FormatSupport {
    let shape = match kind {
        ResourceKind::Buffer => FormatSupport::BUFFER,
        ResourceKind::Texture1D => FormatSupport::TEXTURE1D,
        ResourceKind::Texture2D => FormatSupport::TEXTURE2D,
        ResourceKind::Texture3D => FormatSupport::TEXTURE3D,
    };
    match usage {
        ResourceUsage::ReadOnly => shape | FormatSupport::SHADER_LOAD,
        ResourceUsage::ReadWrite => {
            shape
                | FormatSupport::TYPED_UNORDERED_ACCESS_VIEW
                | FormatSupport::UAV_TYPED_LOAD
                | FormatSupport::UAV_TYPED_STORE
        }
        ResourceUsage::Upload | ResourceUsage::ReadBack => shape,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_states() {
        assert_eq!(ResourceUsage::ReadOnly.initial_state(), ResourceState::Common);
        assert_eq!(
            ResourceUsage::ReadWrite.initial_state(),
            ResourceState::UnorderedAccess
        );
        assert_eq!(ResourceUsage::Upload.initial_state(), ResourceState::Common);
        assert_eq!(ResourceUsage::ReadBack.initial_state(), ResourceState::Common);
    }

    #[test]
    fn test_copy_queue_selection() {
        use ResourceState::*;
        assert_eq!(CommandListType::for_copy(&[Common, Common]), CommandListType::Copy);
        assert_eq!(
            CommandListType::for_copy(&[Common, UnorderedAccess]),
            CommandListType::Compute
        );
        assert_eq!(
            CommandListType::for_copy(&[ShaderResource]),
            CommandListType::Compute
        );
    }

    #[test]
    fn test_required_support() {
        let support = required_format_support(ResourceKind::Texture2D, ResourceUsage::ReadWrite);
        assert!(support.contains(FormatSupport::TEXTURE2D));
        assert!(support.contains(FormatSupport::UAV_TYPED_STORE));
        assert!(!support.contains(FormatSupport::SHADER_LOAD));
    }
}
