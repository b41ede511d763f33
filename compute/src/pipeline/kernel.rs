//! Kernel descriptions.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::backend::RootSignatureDescriptor;
use crate::error::Result;

use super::{BindingLayout, DispatchDataLoader};

/// Identity of a compiled kernel: its bytecode and binding layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelId(u64);

impl KernelId {
    /// Raw identity value.
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Bytecode and binding layout of a compiled kernel.
#[derive(Clone)]
pub struct KernelDescriptor {
    id: KernelId,
    bytecode: Arc<[u8]>,
    resource_count: u32,
    scalar_bytes: u32,
    pixel_shader: bool,
}

impl KernelDescriptor {
    /// Describe a compute kernel binding `resource_count` resources and
    /// `scalar_bytes` bytes of scalar parameters.
    pub fn new(bytecode: impl Into<Arc<[u8]>>, resource_count: u32, scalar_bytes: u32) -> Self {
        Self::build(bytecode.into(), resource_count, scalar_bytes, false)
    }

    /// Describe a pixel-shader-like kernel. The output texture is bound
    /// implicitly and is not part of `resource_count`.
    pub fn pixel_shader(
        bytecode: impl Into<Arc<[u8]>>,
        resource_count: u32,
        scalar_bytes: u32,
    ) -> Self {
        Self::build(bytecode.into(), resource_count, scalar_bytes, true)
    }

    fn build(bytecode: Arc<[u8]>, resource_count: u32, scalar_bytes: u32, pixel_shader: bool) -> Self {
        let mut hasher = DefaultHasher::new();
        bytecode.hash(&mut hasher);
        resource_count.hash(&mut hasher);
        scalar_bytes.hash(&mut hasher);
        pixel_shader.hash(&mut hasher);
        Self {
            id: KernelId(hasher.finish()),
            bytecode,
            resource_count,
            scalar_bytes,
            pixel_shader,
        }
    }

    /// Kernel identity.
    pub fn id(&self) -> KernelId {
        self.id
    }

    /// Compiled bytecode.
    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    /// Number of user resources.
    pub fn resource_count(&self) -> u32 {
        self.resource_count
    }

    /// Size of the scalar parameters in bytes.
    pub fn scalar_bytes(&self) -> u32 {
        self.scalar_bytes
    }

    /// Returns true for pixel-shader-like kernels.
    pub fn is_pixel_shader(&self) -> bool {
        self.pixel_shader
    }

    /// Number of 32-bit root constants.
    pub fn constant_count(&self) -> u32 {
        self.scalar_bytes.div_ceil(4)
    }

    /// Number of descriptor tables, including the implicit output texture.
    pub fn descriptor_table_count(&self) -> u32 {
        self.resource_count + u32::from(self.pixel_shader)
    }

    /// Root slot of the first user resource.
    pub fn first_resource_slot(&self) -> u32 {
        1 + u32::from(self.pixel_shader)
    }

    /// Root signature cost of the kernel's bindings.
    pub fn binding_layout(&self) -> BindingLayout {
        BindingLayout {
            scalar_bytes: self.scalar_bytes,
            resource_tables: self.descriptor_table_count(),
            root_descriptors: 0,
        }
    }

    /// Root signature for the kernel.
    pub fn root_signature_descriptor(&self) -> RootSignatureDescriptor {
        RootSignatureDescriptor {
            constant_count: self.constant_count(),
            descriptor_tables: self.descriptor_table_count(),
        }
    }
}

impl std::fmt::Debug for KernelDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelDescriptor")
            .field("id", &self.id)
            .field("bytecode_len", &self.bytecode.len())
            .field("resource_count", &self.resource_count)
            .field("scalar_bytes", &self.scalar_bytes)
            .field("pixel_shader", &self.pixel_shader)
            .finish()
    }
}

/// A kernel instance ready to dispatch: a compiled kernel plus the
/// resources and scalars it captures.
///
/// # Example
///
/// ```ignore
/// struct Scale<'a> {
///     descriptor: &'a KernelDescriptor,
///     buffer: &'a Buffer<f32>,
///     factor: f32,
/// }
///
/// impl ComputeKernel for Scale<'_> {
///     fn descriptor(&self) -> &KernelDescriptor {
///         self.descriptor
///     }
///
///     fn load_dispatch_data<'a>(&'a self, loader: &mut DispatchDataLoader<'a>) -> Result<()> {
///         loader.load_resource(0, self.buffer)?;
///         loader.load_scalar(0, &self.factor)
///     }
/// }
/// ```
pub trait ComputeKernel {
    /// The compiled kernel.
    fn descriptor(&self) -> &KernelDescriptor;

    /// Load captured resources and scalars for one dispatch.
    fn load_dispatch_data<'a>(&'a self, loader: &mut DispatchDataLoader<'a>) -> Result<()>;
}
