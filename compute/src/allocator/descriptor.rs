//! Descriptor slot pool.
//!
//! Every slot index maps to two descriptors at the same position: one in a
//! shader-visible heap, bound to kernels through its GPU handle, and one in
//! a CPU-only heap, used by operations that need a non-shader-visible view.
//! Heaps are created in pairs of `heap_capacity` slots whenever the pool
//! runs out of free slots.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{CpuDescriptorHandle, DescriptorHeap, GpuBackend, GpuDescriptorHandle};
use crate::error::{ComputeError, Result};

/// Descriptor handles rented for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorHandles {
    /// Pool-wide slot index.
    pub index: u32,
    /// CPU handle in the shader-visible heap.
    pub cpu: CpuDescriptorHandle,
    /// GPU handle in the shader-visible heap.
    pub gpu: GpuDescriptorHandle,
    /// CPU handle in the non-shader-visible heap.
    pub cpu_only: CpuDescriptorHandle,
}

struct HeapPair {
    visible: DescriptorHeap,
    cpu_only: DescriptorHeap,
}

#[derive(Default)]
struct PoolState {
    heaps: Vec<HeapPair>,
    free: Vec<u32>,
    next: u32,
    rented: usize,
}

/// Pool of descriptor slots.
pub struct DescriptorAllocator {
    backend: Arc<dyn GpuBackend>,
    heap_capacity: u32,
    state: Mutex<PoolState>,
}

impl DescriptorAllocator {
    /// Create an empty pool that grows by `heap_capacity` slots at a time.
    pub fn new(backend: Arc<dyn GpuBackend>, heap_capacity: u32) -> Self {
        Self {
            backend,
            heap_capacity: heap_capacity.max(1),
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Rent a slot, growing the pool if every slot is in use.
    pub fn rent(&self) -> Result<DescriptorHandles> {
        let mut state = self.state.lock();
        let index = match state.free.pop() {
            Some(index) => index,
            None => {
                if state.next as usize == state.heaps.len() * self.heap_capacity as usize {
                    let pair = self.create_heaps()?;
                    state.heaps.push(pair);
                }
                let index = state.next;
                state.next += 1;
                index
            }
        };
        state.rented += 1;
        self.handles(&state, index)
    }

    /// Return a rented slot to the pool.
    pub fn return_handles(&self, handles: DescriptorHandles) {
        let mut state = self.state.lock();
        debug_assert!(
            !state.free.contains(&handles.index),
            "descriptor slot {} returned twice",
            handles.index
        );
        state.free.push(handles.index);
        state.rented = state.rented.saturating_sub(1);
    }

    /// Number of slots currently rented.
    pub fn rented_count(&self) -> usize {
        self.state.lock().rented
    }

    /// Number of shader-visible heaps created so far.
    pub fn heap_count(&self) -> usize {
        self.state.lock().heaps.len()
    }

    /// Destroy every heap. Outstanding handles become invalid.
    pub(crate) fn destroy(&self) {
        let mut state = self.state.lock();
        for pair in state.heaps.drain(..) {
            self.backend.destroy_descriptor_heap(pair.visible.handle);
            self.backend.destroy_descriptor_heap(pair.cpu_only.handle);
        }
        state.free.clear();
        state.next = 0;
        state.rented = 0;
    }

    fn create_heaps(&self) -> Result<HeapPair> {
        log::debug!(
            "DescriptorAllocator: growing by {} descriptor slots",
            self.heap_capacity
        );
        let visible = self
            .backend
            .create_descriptor_heap(self.heap_capacity, true)?;
        let cpu_only = match self.backend.create_descriptor_heap(self.heap_capacity, false) {
            Ok(heap) => heap,
            Err(err) => {
                self.backend.destroy_descriptor_heap(visible.handle);
                return Err(err);
            }
        };
        Ok(HeapPair { visible, cpu_only })
    }

    fn handles(&self, state: &PoolState, index: u32) -> Result<DescriptorHandles> {
        let pair = &state.heaps[(index / self.heap_capacity) as usize];
        let slot = index % self.heap_capacity;
        let gpu = pair.visible.gpu_handle(slot).ok_or_else(|| {
            ComputeError::Backend("descriptor heap is not shader visible".to_string())
        })?;
        Ok(DescriptorHandles {
            index,
            cpu: pair.visible.cpu_handle(slot),
            gpu,
            cpu_only: pair.cpu_only.cpu_handle(slot),
        })
    }
}

impl std::fmt::Debug for DescriptorAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DescriptorAllocator")
            .field("heap_capacity", &self.heap_capacity)
            .field("heaps", &state.heaps.len())
            .field("rented", &state.rented)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    #[test]
    fn test_grows_by_heap_capacity() {
        let backend = Arc::new(DummyBackend::new());
        let pool = DescriptorAllocator::new(backend.clone(), 2);
        assert_eq!(pool.heap_count(), 0);

        let a = pool.rent().unwrap();
        let b = pool.rent().unwrap();
        assert_eq!(pool.heap_count(), 1);
        let c = pool.rent().unwrap();
        assert_eq!(pool.heap_count(), 2);
        assert_eq!(backend.live_descriptor_heap_count(), 4);

        assert_ne!(a.gpu, b.gpu);
        assert_ne!(b.gpu, c.gpu);
        assert_ne!(a.cpu, a.cpu_only);
        assert_eq!(pool.rented_count(), 3);
    }

    #[test]
    fn test_returned_slot_is_reused() {
        let backend = Arc::new(DummyBackend::new());
        let pool = DescriptorAllocator::new(backend, 4);
        let a = pool.rent().unwrap();
        let _b = pool.rent().unwrap();
        pool.return_handles(a);
        assert_eq!(pool.rented_count(), 1);
        let c = pool.rent().unwrap();
        assert_eq!(c, a);
        assert_eq!(pool.heap_count(), 1);
    }

    #[test]
    fn test_destroy_releases_heaps() {
        let backend = Arc::new(DummyBackend::new());
        let pool = DescriptorAllocator::new(backend.clone(), 4);
        pool.rent().unwrap();
        pool.destroy();
        assert_eq!(backend.live_descriptor_heap_count(), 0);
        assert_eq!(pool.rented_count(), 0);
    }
}
