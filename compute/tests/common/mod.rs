//! Common utilities for compute integration tests.
//!
//! Provides a device on the dummy backend plus a few kernels with CPU
//! emulators registered, so dispatches change memory the way real kernels
//! would.

use std::sync::Arc;

use redlilium_compute::backend::{EmulatedDispatch, KernelEmulator};
use redlilium_compute::{
    Buffer, ComputeKernel, DeviceDescriptor, DispatchDataLoader, DummyBackend, GraphicsDevice,
    KernelDescriptor, Result, Texture2D,
};

/// Wavefront size of the test adapter.
pub const WAVEFRONT_SIZE: u32 = 32;

/// Bytecode of [`Scale`].
pub const SCALE_BYTECODE: &[u8] = b"scale.cso";
/// Bytecode of [`AddOffset`].
pub const ADD_OFFSET_BYTECODE: &[u8] = b"add_offset.cso";
/// Bytecode of [`Gradient`].
pub const GRADIENT_BYTECODE: &[u8] = b"gradient.cso";

/// Initialize logging once for the test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A dummy backend and a device on top of it, with the test kernels
/// registered.
pub struct TestContext {
    pub backend: Arc<DummyBackend>,
    pub device: Arc<GraphicsDevice>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_descriptor(&DeviceDescriptor::new().with_label("compute tests"))
    }

    pub fn with_descriptor(descriptor: &DeviceDescriptor) -> Self {
        init_logging();
        let backend = Arc::new(DummyBackend::with_wavefront_size(WAVEFRONT_SIZE));
        register_kernels(&backend);
        let device = GraphicsDevice::new(backend.clone(), descriptor)
            .expect("dummy device creation should not fail");
        Self { backend, device }
    }

    /// A second device on its own backend.
    pub fn other_device(&self) -> Arc<GraphicsDevice> {
        GraphicsDevice::dummy().expect("dummy device creation should not fail")
    }
}

fn register_kernels(backend: &DummyBackend) {
    let scale: KernelEmulator = Arc::new(|dispatch: &mut EmulatedDispatch<'_>| {
        let factor = f32::from_bits(dispatch.constants(0)[0]);
        let values: Vec<f32> = dispatch.read(1);
        let scaled: Vec<f32> = values.iter().map(|v| v * factor).collect();
        assert!(dispatch.write(1, &scaled));
    });
    backend.register_kernel(SCALE_BYTECODE, scale);

    let add_offset: KernelEmulator = Arc::new(|dispatch: &mut EmulatedDispatch<'_>| {
        let offset = dispatch.constants(0)[0];
        let input: Vec<u32> = dispatch.read(1);
        let output: Vec<u32> = input.iter().map(|v| v + offset).collect();
        assert!(dispatch.write(2, &output));
    });
    backend.register_kernel(ADD_OFFSET_BYTECODE, add_offset);

    let gradient: KernelEmulator = Arc::new(|dispatch: &mut EmulatedDispatch<'_>| {
        let extent = dispatch.extent(1).expect("output texture is bound");
        let texels: Vec<f32> = (0..extent.height)
            .flat_map(|y| (0..extent.width).map(move |x| (x + y * 100) as f32))
            .collect();
        assert!(dispatch.write(1, &texels));
    });
    backend.register_kernel(GRADIENT_BYTECODE, gradient);
}

/// Multiplies every element of a buffer by a factor.
pub struct Scale<'a> {
    pub descriptor: KernelDescriptor,
    pub buffer: &'a Buffer<f32>,
    pub factor: f32,
}

impl<'a> Scale<'a> {
    pub fn new(buffer: &'a Buffer<f32>, factor: f32) -> Self {
        Self {
            descriptor: KernelDescriptor::new(SCALE_BYTECODE, 1, 4),
            buffer,
            factor,
        }
    }
}

impl ComputeKernel for Scale<'_> {
    fn descriptor(&self) -> &KernelDescriptor {
        &self.descriptor
    }

    fn load_dispatch_data<'a>(&'a self, loader: &mut DispatchDataLoader<'a>) -> Result<()> {
        loader.load_resource(0, self.buffer)?;
        loader.load_scalar(0, &self.factor)
    }
}

/// Writes `input[i] + offset` to `output[i]`.
pub struct AddOffset<'a> {
    pub descriptor: KernelDescriptor,
    pub input: &'a Buffer<u32>,
    pub output: &'a Buffer<u32>,
    pub offset: u32,
}

impl<'a> AddOffset<'a> {
    pub fn new(input: &'a Buffer<u32>, output: &'a Buffer<u32>, offset: u32) -> Self {
        Self {
            descriptor: KernelDescriptor::new(ADD_OFFSET_BYTECODE, 2, 4),
            input,
            output,
            offset,
        }
    }
}

impl ComputeKernel for AddOffset<'_> {
    fn descriptor(&self) -> &KernelDescriptor {
        &self.descriptor
    }

    fn load_dispatch_data<'a>(&'a self, loader: &mut DispatchDataLoader<'a>) -> Result<()> {
        loader.load_resource(0, self.input)?;
        loader.load_resource(1, self.output)?;
        loader.load_scalar(0, &self.offset)
    }
}

/// Pixel-shader-like kernel writing `x + 100 * y` to every texel.
pub struct Gradient {
    pub descriptor: KernelDescriptor,
}

impl Gradient {
    pub fn new() -> Self {
        Self {
            descriptor: KernelDescriptor::pixel_shader(GRADIENT_BYTECODE, 0, 0),
        }
    }
}

impl ComputeKernel for Gradient {
    fn descriptor(&self) -> &KernelDescriptor {
        &self.descriptor
    }

    fn load_dispatch_data<'a>(&'a self, _loader: &mut DispatchDataLoader<'a>) -> Result<()> {
        Ok(())
    }
}

/// Expected contents of a texture written by [`Gradient`].
pub fn gradient_texels(texture: &Texture2D<f32>) -> Vec<f32> {
    (0..texture.height())
        .flat_map(|y| (0..texture.width()).map(move |x| (x + y * 100) as f32))
        .collect()
}
