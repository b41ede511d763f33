//! Staging memory suballocator.
//!
//! CPU-facing copies go through CPU-visible memory: an Upload page for data
//! flowing to the GPU and a ReadBack page for data flowing back. Pages are
//! `page_size` bytes and are carved up first-fit; requests larger than a
//! page get a dedicated page that is destroyed when released.
//!
//! A [`StagingAllocation`] returns its range to the page when dropped. Copy
//! helpers keep the guard alive until their command list has completed.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{GpuBackend, MemoryHandle, ResourceDescriptor};
use crate::error::{ComputeError, Result};
use crate::types::HeapType;

use super::align_up;

/// Alignment of every staging allocation, matching texture placement rules.
pub const STAGING_ALIGNMENT: u64 = 512;

struct StagingPage {
    memory: MemoryHandle,
    size: u64,
    dedicated: bool,
    free: Vec<Range<u64>>,
}

impl StagingPage {
    fn new(memory: MemoryHandle, size: u64, dedicated: bool) -> Self {
        Self {
            memory,
            size,
            dedicated,
            free: vec![0..size],
        }
    }

    fn allocate(&mut self, size: u64) -> Option<u64> {
        let index = self
            .free
            .iter()
            .position(|range| range.end - range.start >= size)?;
        let range = &mut self.free[index];
        let offset = range.start;
        range.start += size;
        if range.start == range.end {
            self.free.remove(index);
        }
        Some(offset)
    }

    fn release(&mut self, offset: u64, size: u64) {
        let index = self
            .free
            .iter()
            .position(|range| range.start > offset)
            .unwrap_or(self.free.len());
        self.free.insert(index, offset..offset + size);

        // Coalesce with the following and preceding ranges.
        if index + 1 < self.free.len() && self.free[index].end == self.free[index + 1].start {
            self.free[index].end = self.free[index + 1].end;
            self.free.remove(index + 1);
        }
        if index > 0 && self.free[index - 1].end == self.free[index].start {
            self.free[index - 1].end = self.free[index].end;
            self.free.remove(index);
        }
    }

    fn is_empty(&self) -> bool {
        self.free.len() == 1 && self.free[0] == (0..self.size)
    }

    fn used(&self) -> u64 {
        self.size - self.free.iter().map(|r| r.end - r.start).sum::<u64>()
    }
}

/// Suballocator for Upload and ReadBack staging memory.
pub struct StagingAllocator {
    backend: Arc<dyn GpuBackend>,
    page_size: u64,
    pages: Mutex<HashMap<HeapType, Vec<StagingPage>>>,
}

impl StagingAllocator {
    /// Create an allocator with the given page size.
    pub fn new(backend: Arc<dyn GpuBackend>, page_size: u64) -> Self {
        Self {
            backend,
            page_size: align_up(page_size.max(STAGING_ALIGNMENT), STAGING_ALIGNMENT),
            pages: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate `size` bytes of staging memory in `heap`.
    ///
    /// `heap` must be [`HeapType::Upload`] or [`HeapType::ReadBack`].
    pub fn allocate(&self, heap: HeapType, size: u64) -> Result<StagingAllocation<'_>> {
        if heap == HeapType::Default {
            return Err(ComputeError::InvalidOperation(
                "staging memory must be CPU visible".to_string(),
            ));
        }
        let aligned = align_up(size.max(1), STAGING_ALIGNMENT);

        let mut pages = self.pages.lock();
        let pages = pages.entry(heap).or_default();

        if aligned <= self.page_size {
            for page in pages.iter_mut().filter(|page| !page.dedicated) {
                if let Some(offset) = page.allocate(aligned) {
                    return Ok(self.allocation(heap, page.memory, offset, size, aligned));
                }
            }
        }

        let dedicated = aligned > self.page_size;
        let page_size = if dedicated { aligned } else { self.page_size };
        log::debug!(
            "StagingAllocator: creating {heap:?} page of {page_size} bytes (dedicated: {dedicated})"
        );
        let memory = self
            .backend
            .create_resource(&ResourceDescriptor::staging(heap, page_size))?;
        let mut page = StagingPage::new(memory, page_size, dedicated);
        let offset = page
            .allocate(aligned)
            .ok_or(ComputeError::OutOfMemory)?;
        pages.push(page);
        Ok(self.allocation(heap, memory, offset, size, aligned))
    }

    /// Number of live staging pages.
    pub fn page_count(&self) -> usize {
        self.pages.lock().values().map(Vec::len).sum()
    }

    /// Bytes currently handed out, including alignment padding.
    pub fn bytes_in_use(&self) -> u64 {
        self.pages
            .lock()
            .values()
            .flat_map(|pages| pages.iter().map(StagingPage::used))
            .sum()
    }

    /// Destroy every page.
    pub(crate) fn destroy(&self) {
        let mut pages = self.pages.lock();
        for (_, pages) in pages.drain() {
            for page in pages {
                self.backend.destroy_resource(page.memory);
            }
        }
    }

    fn allocation(
        &self,
        heap: HeapType,
        memory: MemoryHandle,
        offset: u64,
        size: u64,
        reserved: u64,
    ) -> StagingAllocation<'_> {
        log::trace!("StagingAllocator: {size} bytes at {memory:?}+{offset}");
        StagingAllocation {
            allocator: self,
            heap,
            memory,
            offset,
            size,
            reserved,
        }
    }

    fn release(&self, heap: HeapType, memory: MemoryHandle, offset: u64, reserved: u64) {
        let mut pages = self.pages.lock();
        let Some(pages) = pages.get_mut(&heap) else {
            return;
        };
        let Some(index) = pages.iter().position(|page| page.memory == memory) else {
            return;
        };
        pages[index].release(offset, reserved);
        if pages[index].dedicated && pages[index].is_empty() {
            let page = pages.swap_remove(index);
            self.backend.destroy_resource(page.memory);
        }
    }
}

impl std::fmt::Debug for StagingAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingAllocator")
            .field("page_size", &self.page_size)
            .field("pages", &self.page_count())
            .finish()
    }
}

/// A range of staging memory, returned to its page when dropped.
pub struct StagingAllocation<'a> {
    allocator: &'a StagingAllocator,
    heap: HeapType,
    memory: MemoryHandle,
    offset: u64,
    size: u64,
    reserved: u64,
}

impl StagingAllocation<'_> {
    /// Memory backing the allocation.
    pub fn memory(&self) -> MemoryHandle {
        self.memory
    }

    /// Byte offset of the allocation inside its memory.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Requested size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Heap the allocation lives in.
    pub fn heap(&self) -> HeapType {
        self.heap
    }

    /// Write `data` at `offset` bytes into the allocation.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.check_range(offset, data.len() as u64)?;
        self.allocator
            .backend
            .write_mapped(self.memory, self.offset + offset, data)
    }

    /// Read `out.len()` bytes at `offset` bytes into the allocation.
    pub fn read(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        self.check_range(offset, out.len() as u64)?;
        self.allocator
            .backend
            .read_mapped(self.memory, self.offset + offset, out)
    }

    fn check_range(&self, offset: u64, len: u64) -> Result<()> {
        if offset.checked_add(len).map_or(true, |end| end > self.size) {
            return Err(ComputeError::ArgumentOutOfRange {
                name: "staging range",
                value: offset.saturating_add(len),
                min: 0,
                max: self.size,
            });
        }
        Ok(())
    }
}

impl Drop for StagingAllocation<'_> {
    fn drop(&mut self) {
        self.allocator
            .release(self.heap, self.memory, self.offset, self.reserved);
    }
}

impl std::fmt::Debug for StagingAllocation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingAllocation")
            .field("heap", &self.heap)
            .field("memory", &self.memory)
            .field("offset", &self.offset)
            .field("size", &self.size)
            .finish()
    }
}
