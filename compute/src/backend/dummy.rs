//! Dummy GPU backend for testing and development.
//!
//! This backend emulates the driver on the CPU. Memory resources are plain
//! byte vectors, descriptor handles resolve to views over them, and
//! submitted command lists execute immediately on the submitting thread, so
//! every fence is already signaled by the time anyone waits on it.
//!
//! The backend validates what a real driver's debug layer would: barrier
//! `before` states must match the tracked state, the copy queue cannot
//! transition resources, copies must use copy-compatible states, and bound
//! views must be in a state their view kind allows.
//!
//! Kernel bytecode cannot run on the CPU. Tests can register a
//! [`KernelEmulator`] for a bytecode blob; dispatches of pipelines built from
//! that blob then call the emulator with access to the bound memory.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::error::{ComputeError, DeviceLostReason, Result};
use crate::types::{
    CommandListType, ElementFormat, Extent3d, FormatSupport, HeapType, ResourceState,
};

use super::{
    AdapterInfo, CommandAllocatorHandle, CpuDescriptorHandle, DescriptorHeap,
    DescriptorHeapHandle, FenceHandle, GpuBackend, GpuDescriptorHandle, MemoryHandle,
    NativeCommand, PipelineHandle, ResourceBarrier, ResourceDescriptor, RootSignatureDescriptor,
    RootSignatureHandle, TextureCopyLocation, ViewDescriptor, ViewKind,
};

/// CPU stand-in for a compiled kernel.
pub type KernelEmulator = Arc<dyn Fn(&mut EmulatedDispatch<'_>) + Send + Sync>;

/// A command list executed by the dummy backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    /// Queue the list was submitted to.
    pub queue: CommandListType,
    /// Recorded commands, in order.
    pub commands: Vec<NativeCommand>,
}

impl SubmissionRecord {
    /// Number of dispatches in the submission.
    pub fn dispatch_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, NativeCommand::Dispatch { .. }))
            .count()
    }

    /// Group counts of every dispatch, in order.
    pub fn dispatches(&self) -> Vec<[u32; 3]> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                NativeCommand::Dispatch { x, y, z } => Some([*x, *y, *z]),
                _ => None,
            })
            .collect()
    }

    /// Every barrier in the submission, in order.
    pub fn barriers(&self) -> Vec<ResourceBarrier> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                NativeCommand::ResourceBarrier(barrier) => Some(*barrier),
                _ => None,
            })
            .collect()
    }

    /// Number of pipeline binds in the submission.
    pub fn pipeline_switches(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, NativeCommand::SetPipelineState(_)))
            .count()
    }
}

/// View of one dispatch handed to a [`KernelEmulator`].
pub struct EmulatedDispatch<'a> {
    threads: [u32; 3],
    groups: [u32; 3],
    constants: &'a HashMap<u32, Vec<u32>>,
    bindings: HashMap<u32, (MemoryHandle, ViewDescriptor)>,
    memory: &'a mut HashMap<MemoryHandle, DummyMemory>,
}

impl EmulatedDispatch<'_> {
    /// Threads per group.
    pub fn thread_group_size(&self) -> [u32; 3] {
        self.threads
    }

    /// Number of groups dispatched along each axis.
    pub fn group_count(&self) -> [u32; 3] {
        self.groups
    }

    /// Root constants loaded at `slot`.
    pub fn constants(&self, slot: u32) -> &[u32] {
        self.constants.get(&slot).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Dimensions of the resource bound at `slot`.
    pub fn extent(&self, slot: u32) -> Option<Extent3d> {
        self.bindings.get(&slot).map(|(_, view)| view.extent)
    }

    /// Raw bytes of the resource bound at `slot`.
    pub fn bytes(&self, slot: u32) -> Option<&[u8]> {
        let (memory, _) = self.bindings.get(&slot)?;
        self.memory.get(memory).map(|m| m.bytes.as_slice())
    }

    /// Mutable raw bytes of the resource bound at `slot`. Only unordered
    /// access views are writable.
    pub fn bytes_mut(&mut self, slot: u32) -> Option<&mut [u8]> {
        let (memory, view) = self.bindings.get(&slot)?;
        if view.view != ViewKind::UnorderedAccess {
            return None;
        }
        self.memory.get_mut(memory).map(|m| m.bytes.as_mut_slice())
    }

    /// Elements of the resource bound at `slot`.
    pub fn read<T: bytemuck::Pod>(&self, slot: u32) -> Vec<T> {
        self.bytes(slot)
            .map(|bytes| {
                bytes
                    .chunks_exact(std::mem::size_of::<T>())
                    .map(bytemuck::pod_read_unaligned)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Overwrite the start of the resource bound at `slot` with `values`.
    ///
    /// Returns false if the slot is not writable or too small.
    pub fn write<T: bytemuck::Pod>(&mut self, slot: u32, values: &[T]) -> bool {
        let source: &[u8] = bytemuck::cast_slice(values);
        match self.bytes_mut(slot) {
            Some(bytes) if bytes.len() >= source.len() => {
                bytes[..source.len()].copy_from_slice(source);
                true
            }
            _ => false,
        }
    }
}

struct DummyMemory {
    bytes: Vec<u8>,
    heap: HeapType,
    state: ResourceState,
}

struct DummyView {
    memory: MemoryHandle,
    descriptor: ViewDescriptor,
}

struct DummyPipeline {
    root_signature: RootSignatureHandle,
    bytecode: Arc<[u8]>,
    threads: [u32; 3],
}

#[derive(Default)]
struct Bindings {
    pipeline: Option<PipelineHandle>,
    root_signature: Option<RootSignatureHandle>,
    constants: HashMap<u32, Vec<u32>>,
    tables: HashMap<u32, GpuDescriptorHandle>,
}

#[derive(Default)]
struct DummyState {
    memory: HashMap<MemoryHandle, DummyMemory>,
    heaps: HashMap<DescriptorHeapHandle, DescriptorHeap>,
    views: HashMap<u64, DummyView>,
    allocators: HashMap<CommandAllocatorHandle, CommandListType>,
    root_signatures: HashMap<RootSignatureHandle, RootSignatureDescriptor>,
    pipelines: HashMap<PipelineHandle, DummyPipeline>,
    fences: HashMap<FenceHandle, u64>,
    submissions: Vec<SubmissionRecord>,
    invalid_destroys: usize,
}

fn backend_error(message: impl Into<String>) -> ComputeError {
    ComputeError::Backend(message.into())
}

impl DummyState {
    fn memory(&self, handle: MemoryHandle) -> Result<&DummyMemory> {
        self.memory
            .get(&handle)
            .ok_or_else(|| backend_error(format!("unknown memory {handle:?}")))
    }

    fn memory_mut(&mut self, handle: MemoryHandle) -> Result<&mut DummyMemory> {
        self.memory
            .get_mut(&handle)
            .ok_or_else(|| backend_error(format!("unknown memory {handle:?}")))
    }

    fn forget<K: std::hash::Hash + Eq + std::fmt::Debug, V>(
        map: &mut HashMap<K, V>,
        key: K,
        invalid_destroys: &mut usize,
    ) {
        if map.remove(&key).is_none() {
            log::warn!("DummyBackend: destroying unknown object {key:?}");
            *invalid_destroys += 1;
        }
    }

    fn execute(
        &mut self,
        queue: CommandListType,
        command: &NativeCommand,
        bindings: &mut Bindings,
        emulators: &HashMap<Vec<u8>, KernelEmulator>,
    ) -> Result<()> {
        match command {
            NativeCommand::SetPipelineState(pipeline) => {
                require_compute(queue, "SetPipelineState")?;
                if !self.pipelines.contains_key(pipeline) {
                    return Err(backend_error(format!("unknown pipeline {pipeline:?}")));
                }
                bindings.pipeline = Some(*pipeline);
            }
            NativeCommand::SetComputeRootSignature(root_signature) => {
                require_compute(queue, "SetComputeRootSignature")?;
                if !self.root_signatures.contains_key(root_signature) {
                    return Err(backend_error(format!(
                        "unknown root signature {root_signature:?}"
                    )));
                }
                bindings.root_signature = Some(*root_signature);
                bindings.constants.clear();
                bindings.tables.clear();
            }
            NativeCommand::SetComputeRoot32BitConstants { slot, values } => {
                require_compute(queue, "SetComputeRoot32BitConstants")?;
                bindings.constants.insert(*slot, values.clone());
            }
            NativeCommand::SetComputeRootDescriptorTable { slot, handle } => {
                require_compute(queue, "SetComputeRootDescriptorTable")?;
                if !self.views.contains_key(&handle.0) {
                    return Err(backend_error(format!("empty descriptor {handle:?}")));
                }
                bindings.tables.insert(*slot, *handle);
            }
            NativeCommand::ResourceBarrier(barrier) => {
                require_compute(queue, "ResourceBarrier")?;
                match *barrier {
                    ResourceBarrier::Transition {
                        memory,
                        before,
                        after,
                    } => {
                        let memory = self.memory_mut(memory)?;
                        if memory.state != before {
                            return Err(backend_error(format!(
                                "barrier expects {before:?} but resource is {:?}",
                                memory.state
                            )));
                        }
                        memory.state = after;
                    }
                    ResourceBarrier::UnorderedAccess { memory } => {
                        self.memory(memory)?;
                    }
                }
            }
            NativeCommand::CopyBufferRegion {
                dst,
                dst_offset,
                src,
                src_offset,
                size,
            } => {
                let source = self.memory(*src)?;
                check_copy_state(source.state, ResourceState::CopySource)?;
                let bytes = slice(&source.bytes, *src_offset, *size)?.to_vec();
                let destination = self.memory_mut(*dst)?;
                check_copy_state(destination.state, ResourceState::CopyDest)?;
                slice_mut(&mut destination.bytes, *dst_offset, *size)?.copy_from_slice(&bytes);
            }
            NativeCommand::CopyTextureRegion {
                dst,
                dst_offset,
                src,
                src_region,
            } => {
                check_copy_state(self.memory(src.memory())?.state, ResourceState::CopySource)?;
                check_copy_state(self.memory(dst.memory())?.state, ResourceState::CopyDest)?;
                let extent = src_region.extent;
                let row_bytes = extent.width as u64 * element_size(src) as u64;
                for z in 0..extent.depth {
                    for y in 0..extent.height {
                        let from = texel_offset(
                            src,
                            src_region.offset.x,
                            src_region.offset.y + y,
                            src_region.offset.z + z,
                        );
                        let to = texel_offset(dst, dst_offset.x, dst_offset.y + y, dst_offset.z + z);
                        let row = slice(&self.memory(src.memory())?.bytes, from, row_bytes)?.to_vec();
                        let destination = self.memory_mut(dst.memory())?;
                        slice_mut(&mut destination.bytes, to, row_bytes)?.copy_from_slice(&row);
                    }
                }
            }
            NativeCommand::ClearUnorderedAccessView {
                gpu,
                cpu,
                memory,
                value,
            } => {
                require_compute(queue, "ClearUnorderedAccessView")?;
                self.clear_view(*gpu, *cpu, *memory, value)?;
            }
            NativeCommand::Dispatch { x, y, z } => {
                require_compute(queue, "Dispatch")?;
                self.dispatch([*x, *y, *z], bindings, emulators)?;
            }
        }
        Ok(())
    }

    fn is_cpu_only(&self, handle: CpuDescriptorHandle) -> bool {
        self.heaps.values().any(|heap| {
            heap.gpu_start.is_none()
                && handle.0 >= heap.cpu_start
                && handle.0 < heap.cpu_start + heap.capacity as u64 * heap.increment
        })
    }

    fn clear_view(
        &mut self,
        gpu: GpuDescriptorHandle,
        cpu: CpuDescriptorHandle,
        memory: MemoryHandle,
        value: &[u8],
    ) -> Result<()> {
        if !self.is_cpu_only(cpu) {
            return Err(backend_error(format!(
                "{cpu:?} is not in a non-shader-visible heap"
            )));
        }
        let mut descriptors = Vec::with_capacity(2);
        for handle in [gpu.0, cpu.0] {
            let view = self
                .views
                .get(&handle)
                .ok_or_else(|| backend_error(format!("empty descriptor {handle:#x}")))?;
            if view.memory != memory || view.descriptor.view != ViewKind::UnorderedAccess {
                return Err(backend_error(format!(
                    "descriptor {handle:#x} is not an unordered access view of {memory:?}"
                )));
            }
            descriptors.push(view.descriptor);
        }
        let descriptor = descriptors[0];
        if value.is_empty() || value.len() != descriptor.element_size as usize {
            return Err(backend_error(format!(
                "clear value of {} bytes for {}-byte elements",
                value.len(),
                descriptor.element_size
            )));
        }

        let target = self.memory_mut(memory)?;
        if target.state != ResourceState::UnorderedAccess {
            return Err(backend_error(format!(
                "clearing an unordered access view while resource is {:?}",
                target.state
            )));
        }
        let size = descriptor.extent.volume() * descriptor.element_size as u64;
        for element in slice_mut(&mut target.bytes, 0, size)?.chunks_exact_mut(value.len()) {
            element.copy_from_slice(value);
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        groups: [u32; 3],
        bindings: &Bindings,
        emulators: &HashMap<Vec<u8>, KernelEmulator>,
    ) -> Result<()> {
        let pipeline_handle = bindings
            .pipeline
            .ok_or_else(|| backend_error("dispatch without a pipeline"))?;
        let pipeline = self
            .pipelines
            .get(&pipeline_handle)
            .ok_or_else(|| backend_error(format!("unknown pipeline {pipeline_handle:?}")))?;
        if bindings.root_signature != Some(pipeline.root_signature) {
            return Err(backend_error(
                "dispatch with a root signature that does not match the pipeline",
            ));
        }

        let mut bound = HashMap::new();
        for (slot, handle) in &bindings.tables {
            let view = self
                .views
                .get(&handle.0)
                .ok_or_else(|| backend_error(format!("empty descriptor {handle:?}")))?;
            let state = self.memory(view.memory)?.state;
            let allowed = match view.descriptor.view {
                ViewKind::UnorderedAccess => state == ResourceState::UnorderedAccess,
                ViewKind::ShaderResource => {
                    matches!(state, ResourceState::Common | ResourceState::ShaderResource)
                }
            };
            if !allowed {
                return Err(backend_error(format!(
                    "{:?} view bound at slot {slot} while resource is {state:?}",
                    view.descriptor.view
                )));
            }
            bound.insert(*slot, (view.memory, view.descriptor));
        }

        let threads = pipeline.threads;
        let Some(emulator) = emulators.get(&*pipeline.bytecode).cloned() else {
            return Ok(());
        };
        let mut dispatch = EmulatedDispatch {
            threads,
            groups,
            constants: &bindings.constants,
            bindings: bound,
            memory: &mut self.memory,
        };
        emulator(&mut dispatch);
        Ok(())
    }
}

fn require_compute(queue: CommandListType, command: &str) -> Result<()> {
    if queue != CommandListType::Compute {
        return Err(backend_error(format!("{command} is not allowed on the copy queue")));
    }
    Ok(())
}

fn check_copy_state(state: ResourceState, copy_state: ResourceState) -> Result<()> {
    if state != ResourceState::Common && state != copy_state {
        return Err(backend_error(format!(
            "copy requires {copy_state:?} but resource is {state:?}"
        )));
    }
    Ok(())
}

fn element_size(location: &TextureCopyLocation) -> u32 {
    match location {
        TextureCopyLocation::Subresource { element_size, .. } => *element_size,
        TextureCopyLocation::Placed { footprint, .. } => footprint.element_size,
    }
}

fn texel_offset(location: &TextureCopyLocation, x: u32, y: u32, z: u32) -> u64 {
    match location {
        TextureCopyLocation::Subresource {
            extent,
            element_size,
            ..
        } => {
            let index = (z as u64 * extent.height as u64 + y as u64) * extent.width as u64 + x as u64;
            index * *element_size as u64
        }
        TextureCopyLocation::Placed { footprint, .. } => {
            footprint.offset
                + z as u64 * footprint.slice_pitch()
                + y as u64 * footprint.row_pitch
                + x as u64 * footprint.element_size as u64
        }
    }
}

fn slice(bytes: &[u8], offset: u64, size: u64) -> Result<&[u8]> {
    let end = offset
        .checked_add(size)
        .filter(|end| *end <= bytes.len() as u64)
        .ok_or_else(|| backend_error(format!("access {offset}+{size} out of bounds")))?;
    Ok(&bytes[offset as usize..end as usize])
}

fn slice_mut(bytes: &mut [u8], offset: u64, size: u64) -> Result<&mut [u8]> {
    let len = bytes.len() as u64;
    let end = offset
        .checked_add(size)
        .filter(|end| *end <= len)
        .ok_or_else(|| backend_error(format!("access {offset}+{size} out of bounds")))?;
    Ok(&mut bytes[offset as usize..end as usize])
}

fn default_format_support(format: ElementFormat) -> FormatSupport {
    let textures = FormatSupport::BUFFER
        | FormatSupport::TEXTURE1D
        | FormatSupport::TEXTURE2D
        | FormatSupport::TEXTURE3D
        | FormatSupport::SHADER_LOAD;
    match format {
        // Three-component formats have no typed UAV support on real hardware.
        ElementFormat::Rgb32Float => textures,
        _ => {
            textures
                | FormatSupport::TYPED_UNORDERED_ACCESS_VIEW
                | FormatSupport::UAV_TYPED_LOAD
                | FormatSupport::UAV_TYPED_STORE
        }
    }
}

/// Dummy GPU backend.
pub struct DummyBackend {
    next_id: AtomicU64,
    wavefront_size: u32,
    state: Mutex<DummyState>,
    format_overrides: RwLock<HashMap<ElementFormat, FormatSupport>>,
    emulators: RwLock<HashMap<Vec<u8>, KernelEmulator>>,
    removed: Mutex<Option<DeviceLostReason>>,
}

impl DummyBackend {
    /// Create a new dummy backend with a wavefront size of 32.
    pub fn new() -> Self {
        Self::with_wavefront_size(32)
    }

    /// Create a new dummy backend reporting the given wavefront size.
    pub fn with_wavefront_size(wavefront_size: u32) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            wavefront_size,
            state: Mutex::new(DummyState::default()),
            format_overrides: RwLock::new(HashMap::new()),
            emulators: RwLock::new(HashMap::new()),
            removed: Mutex::new(None),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Override the capabilities reported for a format.
    pub fn set_format_support(&self, format: ElementFormat, support: FormatSupport) {
        self.format_overrides.write().insert(format, support);
    }

    /// Run `emulator` for every dispatch of a pipeline built from `bytecode`.
    pub fn register_kernel(&self, bytecode: &[u8], emulator: KernelEmulator) {
        self.emulators.write().insert(bytecode.to_vec(), emulator);
    }

    /// Simulate removal of the adapter.
    ///
    /// Submissions after removal are dropped, and fences are still signaled
    /// so that waiting threads do not hang.
    pub fn simulate_device_removed(&self, reason: DeviceLostReason) {
        log::warn!("DummyBackend: simulating device removal ({reason})");
        *self.removed.lock() = Some(reason);
    }

    /// All submissions executed so far.
    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        self.state.lock().submissions.clone()
    }

    /// Forget recorded submissions.
    pub fn clear_submissions(&self) {
        self.state.lock().submissions.clear();
    }

    /// Number of memory resources currently alive.
    pub fn live_resource_count(&self) -> usize {
        self.state.lock().memory.len()
    }

    /// Number of descriptor heaps currently alive.
    pub fn live_descriptor_heap_count(&self) -> usize {
        self.state.lock().heaps.len()
    }

    /// Number of command allocators currently alive.
    pub fn live_command_allocator_count(&self) -> usize {
        self.state.lock().allocators.len()
    }

    /// Number of pipelines currently alive.
    pub fn live_pipeline_count(&self) -> usize {
        self.state.lock().pipelines.len()
    }

    /// Number of destroy calls for objects that did not exist.
    pub fn invalid_destroy_count(&self) -> usize {
        self.state.lock().invalid_destroys
    }

    /// Current tracked state of a memory resource.
    pub fn resource_state(&self, memory: MemoryHandle) -> Option<ResourceState> {
        self.state.lock().memory.get(&memory).map(|m| m.state)
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DummyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyBackend")
            .field("wavefront_size", &self.wavefront_size)
            .field("removed", &*self.removed.lock())
            .finish_non_exhaustive()
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn adapter_info(&self) -> AdapterInfo {
        AdapterInfo {
            name: "Dummy Adapter".to_string(),
            wavefront_size: self.wavefront_size,
            dedicated_memory_size: 0,
            is_hardware_accelerated: false,
        }
    }

    fn format_support(&self, format: ElementFormat) -> FormatSupport {
        self.format_overrides
            .read()
            .get(&format)
            .copied()
            .unwrap_or_else(|| default_format_support(format))
    }

    fn create_resource(&self, descriptor: &ResourceDescriptor) -> Result<MemoryHandle> {
        let size = usize::try_from(descriptor.size_in_bytes()).map_err(|_| ComputeError::OutOfMemory)?;
        let handle = MemoryHandle(self.next_id());
        log::trace!(
            "DummyBackend: creating {:?} resource {handle:?} ({size} bytes)",
            descriptor.heap
        );
        self.state.lock().memory.insert(
            handle,
            DummyMemory {
                bytes: vec![0; size],
                heap: descriptor.heap,
                state: descriptor.initial_state,
            },
        );
        Ok(handle)
    }

    fn destroy_resource(&self, memory: MemoryHandle) {
        let mut state = self.state.lock();
        let state = &mut *state;
        DummyState::forget(&mut state.memory, memory, &mut state.invalid_destroys);
    }

    fn write_mapped(&self, memory: MemoryHandle, offset: u64, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let memory = state.memory_mut(memory)?;
        if memory.heap == HeapType::Default {
            return Err(backend_error("default heap memory cannot be mapped"));
        }
        slice_mut(&mut memory.bytes, offset, data.len() as u64)?.copy_from_slice(data);
        Ok(())
    }

    fn read_mapped(&self, memory: MemoryHandle, offset: u64, out: &mut [u8]) -> Result<()> {
        let state = self.state.lock();
        let memory = state.memory(memory)?;
        if memory.heap == HeapType::Default {
            return Err(backend_error("default heap memory cannot be mapped"));
        }
        out.copy_from_slice(slice(&memory.bytes, offset, out.len() as u64)?);
        Ok(())
    }

    fn create_descriptor_heap(
        &self,
        capacity: u32,
        shader_visible: bool,
    ) -> Result<DescriptorHeap> {
        let id = self.next_id();
        let cpu_start = id << 32;
        let heap = DescriptorHeap {
            handle: DescriptorHeapHandle(id),
            capacity,
            cpu_start,
            gpu_start: shader_visible.then_some(cpu_start),
            increment: 1,
        };
        log::debug!(
            "DummyBackend: creating descriptor heap {:?} ({capacity} slots, shader visible: {shader_visible})",
            heap.handle
        );
        self.state.lock().heaps.insert(heap.handle, heap);
        Ok(heap)
    }

    fn destroy_descriptor_heap(&self, heap: DescriptorHeapHandle) {
        let mut state = self.state.lock();
        let state = &mut *state;
        if let Some(removed) = state.heaps.remove(&heap) {
            let start = removed.cpu_start;
            let end = start + removed.capacity as u64 * removed.increment;
            state.views.retain(|handle, _| *handle < start || *handle >= end);
        } else {
            log::warn!("DummyBackend: destroying unknown descriptor heap {heap:?}");
            state.invalid_destroys += 1;
        }
    }

    fn create_view(
        &self,
        memory: MemoryHandle,
        descriptor: &ViewDescriptor,
        destination: CpuDescriptorHandle,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.memory(memory)?;
        state.views.insert(
            destination.0,
            DummyView {
                memory,
                descriptor: *descriptor,
            },
        );
        Ok(())
    }

    fn create_command_allocator(
        &self,
        list_type: CommandListType,
    ) -> Result<CommandAllocatorHandle> {
        let handle = CommandAllocatorHandle(self.next_id());
        self.state.lock().allocators.insert(handle, list_type);
        Ok(handle)
    }

    fn reset_command_allocator(&self, allocator: CommandAllocatorHandle) -> Result<()> {
        if !self.state.lock().allocators.contains_key(&allocator) {
            return Err(backend_error(format!("unknown allocator {allocator:?}")));
        }
        Ok(())
    }

    fn destroy_command_allocator(&self, allocator: CommandAllocatorHandle) {
        let mut state = self.state.lock();
        let state = &mut *state;
        DummyState::forget(&mut state.allocators, allocator, &mut state.invalid_destroys);
    }

    fn create_root_signature(
        &self,
        descriptor: &RootSignatureDescriptor,
    ) -> Result<RootSignatureHandle> {
        let handle = RootSignatureHandle(self.next_id());
        self.state
            .lock()
            .root_signatures
            .insert(handle, descriptor.clone());
        Ok(handle)
    }

    fn destroy_root_signature(&self, root_signature: RootSignatureHandle) {
        let mut state = self.state.lock();
        let state = &mut *state;
        DummyState::forget(
            &mut state.root_signatures,
            root_signature,
            &mut state.invalid_destroys,
        );
    }

    fn create_compute_pipeline(
        &self,
        root_signature: RootSignatureHandle,
        bytecode: &[u8],
        threads: [u32; 3],
    ) -> Result<PipelineHandle> {
        let mut state = self.state.lock();
        if !state.root_signatures.contains_key(&root_signature) {
            return Err(backend_error(format!(
                "unknown root signature {root_signature:?}"
            )));
        }
        let handle = PipelineHandle(self.next_id());
        state.pipelines.insert(
            handle,
            DummyPipeline {
                root_signature,
                bytecode: Arc::from(bytecode),
                threads,
            },
        );
        Ok(handle)
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        let mut state = self.state.lock();
        let state = &mut *state;
        DummyState::forget(&mut state.pipelines, pipeline, &mut state.invalid_destroys);
    }

    fn create_fence(&self) -> Result<FenceHandle> {
        let handle = FenceHandle(self.next_id());
        self.state.lock().fences.insert(handle, 0);
        Ok(handle)
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        let mut state = self.state.lock();
        let state = &mut *state;
        DummyState::forget(&mut state.fences, fence, &mut state.invalid_destroys);
    }

    fn execute_command_list(
        &self,
        queue: CommandListType,
        allocator: CommandAllocatorHandle,
        commands: &[NativeCommand],
    ) -> Result<()> {
        if self.removed.lock().is_some() {
            log::trace!("DummyBackend: device removed, dropping {} commands", commands.len());
            return Ok(());
        }

        let mut state = self.state.lock();
        match state.allocators.get(&allocator) {
            Some(list_type) if *list_type == queue => {}
            Some(list_type) => {
                return Err(backend_error(format!(
                    "{list_type:?} allocator submitted to the {queue:?} queue"
                )));
            }
            None => return Err(backend_error(format!("unknown allocator {allocator:?}"))),
        }

        log::trace!(
            "DummyBackend: executing {} commands on the {queue:?} queue",
            commands.len()
        );

        let emulators = self.emulators.read();
        let mut bindings = Bindings::default();
        for command in commands {
            state.execute(queue, command, &mut bindings, &emulators)?;
        }
        state.submissions.push(SubmissionRecord {
            queue,
            commands: commands.to_vec(),
        });
        Ok(())
    }

    fn signal(&self, _queue: CommandListType, fence: FenceHandle, value: u64) -> Result<()> {
        let mut state = self.state.lock();
        let completed = state
            .fences
            .get_mut(&fence)
            .ok_or_else(|| backend_error(format!("unknown fence {fence:?}")))?;
        *completed = (*completed).max(value);
        Ok(())
    }

    fn completed_value(&self, fence: FenceHandle) -> u64 {
        self.state.lock().fences.get(&fence).copied().unwrap_or(u64::MAX)
    }

    fn wait_for_fence(&self, fence: FenceHandle, value: u64) {
        // Work executes at submission, so this only spins if a caller waits
        // for a value that was never signaled.
        while self.completed_value(fence) < value {
            std::thread::yield_now();
        }
    }

    fn device_removed_reason(&self) -> Option<DeviceLostReason> {
        *self.removed.lock()
    }
}

static_assertions::assert_impl_all!(DummyBackend: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PlacedFootprint;
    use crate::types::{Offset3d, Region, ResourceKind};

    fn texture_descriptor(extent: Extent3d, state: ResourceState) -> ResourceDescriptor {
        ResourceDescriptor {
            kind: ResourceKind::Texture2D,
            heap: HeapType::Default,
            extent,
            element_size: 4,
            format: Some(ElementFormat::R32Uint),
            initial_state: state,
            zeroed: true,
        }
    }

    #[test]
    fn test_adapter_info() {
        let backend = DummyBackend::with_wavefront_size(64);
        let info = backend.adapter_info();
        assert_eq!(info.name, "Dummy Adapter");
        assert_eq!(info.wavefront_size, 64);
        assert!(!info.is_hardware_accelerated);
    }

    #[test]
    fn test_mapped_round_trip() {
        let backend = DummyBackend::new();
        let memory = backend
            .create_resource(&ResourceDescriptor::staging(HeapType::Upload, 16))
            .unwrap();
        backend.write_mapped(memory, 4, &[1, 2, 3, 4]).unwrap();
        let mut out = [0u8; 6];
        backend.read_mapped(memory, 2, &mut out).unwrap();
        assert_eq!(out, [0, 0, 1, 2, 3, 4]);
        assert!(backend.write_mapped(memory, 14, &[0; 4]).is_err());
    }

    #[test]
    fn test_default_heap_is_not_mappable() {
        let backend = DummyBackend::new();
        let memory = backend
            .create_resource(&texture_descriptor(
                Extent3d::new_2d(2, 2),
                ResourceState::Common,
            ))
            .unwrap();
        assert!(backend.write_mapped(memory, 0, &[0]).is_err());
    }

    #[test]
    fn test_copy_queue_rejects_barriers() {
        let backend = DummyBackend::new();
        let memory = backend
            .create_resource(&texture_descriptor(
                Extent3d::new_2d(2, 2),
                ResourceState::Common,
            ))
            .unwrap();
        let allocator = backend
            .create_command_allocator(CommandListType::Copy)
            .unwrap();
        let result = backend.execute_command_list(
            CommandListType::Copy,
            allocator,
            &[NativeCommand::ResourceBarrier(ResourceBarrier::Transition {
                memory,
                before: ResourceState::Common,
                after: ResourceState::CopySource,
            })],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_barrier_state_mismatch() {
        let backend = DummyBackend::new();
        let memory = backend
            .create_resource(&texture_descriptor(
                Extent3d::new_2d(2, 2),
                ResourceState::UnorderedAccess,
            ))
            .unwrap();
        let allocator = backend
            .create_command_allocator(CommandListType::Compute)
            .unwrap();
        let result = backend.execute_command_list(
            CommandListType::Compute,
            allocator,
            &[NativeCommand::ResourceBarrier(ResourceBarrier::Transition {
                memory,
                before: ResourceState::Common,
                after: ResourceState::CopySource,
            })],
        );
        assert!(result.is_err());
        assert_eq!(
            backend.resource_state(memory),
            Some(ResourceState::UnorderedAccess)
        );
    }

    #[test]
    fn test_texture_region_copy_through_footprint() {
        let backend = DummyBackend::new();
        let extent = Extent3d::new_2d(4, 3);
        let texture = backend
            .create_resource(&texture_descriptor(extent, ResourceState::Common))
            .unwrap();
        let footprint = PlacedFootprint {
            offset: 0,
            extent: Extent3d::new_2d(2, 2),
            row_pitch: 256,
            element_size: 4,
        };
        let upload = backend
            .create_resource(&ResourceDescriptor::staging(
                HeapType::Upload,
                footprint.total_size(),
            ))
            .unwrap();
        backend.write_mapped(upload, 0, &[1u8; 8]).unwrap();
        backend.write_mapped(upload, 256, &[2u8; 8]).unwrap();

        let allocator = backend
            .create_command_allocator(CommandListType::Copy)
            .unwrap();
        backend
            .execute_command_list(
                CommandListType::Copy,
                allocator,
                &[NativeCommand::CopyTextureRegion {
                    dst: TextureCopyLocation::Subresource {
                        memory: texture,
                        extent,
                        element_size: 4,
                    },
                    dst_offset: Offset3d::new(1, 1, 0),
                    src: TextureCopyLocation::Placed {
                        memory: upload,
                        footprint,
                    },
                    src_region: Region::xy(0, 0, 2, 2),
                }],
            )
            .unwrap();

        let state = backend.state.lock();
        let bytes = &state.memory[&texture].bytes;
        // Row 1 starts at texel 4, the copy starts at x = 1.
        assert_eq!(&bytes[20..28], &[1u8; 8]);
        assert_eq!(&bytes[36..44], &[2u8; 8]);
        assert_eq!(&bytes[0..20], &[0u8; 20]);
    }

    #[test]
    fn test_clear_unordered_access_view() {
        let backend = DummyBackend::new();
        let extent = Extent3d::new_2d(2, 2);
        let memory = backend
            .create_resource(&texture_descriptor(extent, ResourceState::UnorderedAccess))
            .unwrap();
        let visible = backend.create_descriptor_heap(4, true).unwrap();
        let cpu_only = backend.create_descriptor_heap(4, false).unwrap();
        let view = ViewDescriptor {
            view: ViewKind::UnorderedAccess,
            kind: ResourceKind::Texture2D,
            format: Some(ElementFormat::R32Uint),
            extent,
            element_size: 4,
        };
        backend.create_view(memory, &view, visible.cpu_handle(0)).unwrap();
        backend.create_view(memory, &view, cpu_only.cpu_handle(0)).unwrap();
        let allocator = backend
            .create_command_allocator(CommandListType::Compute)
            .unwrap();
        let gpu = visible.gpu_handle(0).unwrap();
        let clear = |cpu: CpuDescriptorHandle| NativeCommand::ClearUnorderedAccessView {
            gpu,
            cpu,
            memory,
            value: 7u32.to_le_bytes().to_vec(),
        };

        // The CPU half must come from the non-shader-visible heap.
        assert!(backend
            .execute_command_list(
                CommandListType::Compute,
                allocator,
                &[clear(visible.cpu_handle(0))]
            )
            .is_err());
        backend
            .execute_command_list(
                CommandListType::Compute,
                allocator,
                &[clear(cpu_only.cpu_handle(0))],
            )
            .unwrap();

        let state = backend.state.lock();
        let texels: Vec<u32> = state.memory[&memory]
            .bytes
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        assert_eq!(texels, vec![7; 4]);
    }

    #[test]
    fn test_double_destroy_is_counted() {
        let backend = DummyBackend::new();
        let memory = backend
            .create_resource(&ResourceDescriptor::staging(HeapType::Upload, 4))
            .unwrap();
        backend.destroy_resource(memory);
        assert_eq!(backend.invalid_destroy_count(), 0);
        backend.destroy_resource(memory);
        assert_eq!(backend.invalid_destroy_count(), 1);
    }

    #[test]
    fn test_removed_device_drops_work_but_signals() {
        let backend = DummyBackend::new();
        let fence = backend.create_fence().unwrap();
        let allocator = backend
            .create_command_allocator(CommandListType::Compute)
            .unwrap();
        backend.simulate_device_removed(DeviceLostReason::Hung);
        backend
            .execute_command_list(
                CommandListType::Compute,
                allocator,
                &[NativeCommand::Dispatch { x: 1, y: 1, z: 1 }],
            )
            .unwrap();
        backend.signal(CommandListType::Compute, fence, 1).unwrap();
        backend.wait_for_fence(fence, 1);
        assert!(backend.submissions().is_empty());
        assert_eq!(backend.device_removed_reason(), Some(DeviceLostReason::Hung));
    }
}
