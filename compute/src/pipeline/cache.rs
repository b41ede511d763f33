//! Pipeline cache.
//!
//! One pipeline and root signature is built per unique
//! (kernel, thread-group shape) key and shared for the lifetime of the
//! device. Lookups take a read lock. On a miss the pipeline is built outside
//! the lock and inserted under the write lock; if another thread inserted
//! the same key first, the freshly built objects are destroyed and the
//! cached entry is returned.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{GpuBackend, PipelineHandle, RootSignatureHandle};
use crate::error::Result;

use super::{KernelDescriptor, KernelId, check_binding_budget};

/// Cache key: kernel identity plus thread-group shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    /// Kernel identity.
    pub kernel: KernelId,
    /// Threads per group along X, Y and Z.
    pub threads: [u32; 3],
}

/// A compiled pipeline and its root signature. Immutable once built.
#[derive(Debug, PartialEq, Eq)]
pub struct PipelineData {
    key: PipelineKey,
    root_signature: RootSignatureHandle,
    pipeline: PipelineHandle,
    constant_count: u32,
    descriptor_tables: u32,
}

impl PipelineData {
    /// Key the pipeline was built for.
    pub fn key(&self) -> PipelineKey {
        self.key
    }

    /// Root signature handle.
    pub fn root_signature(&self) -> RootSignatureHandle {
        self.root_signature
    }

    /// Pipeline handle.
    pub fn pipeline(&self) -> PipelineHandle {
        self.pipeline
    }

    /// Number of 32-bit root constants at slot 0.
    pub fn constant_count(&self) -> u32 {
        self.constant_count
    }

    /// Number of descriptor tables starting at slot 1.
    pub fn descriptor_tables(&self) -> u32 {
        self.descriptor_tables
    }
}

/// Cache of compiled pipelines, keyed by [`PipelineKey`].
#[derive(Default)]
pub struct PipelineCache {
    entries: RwLock<HashMap<PipelineKey, Arc<PipelineData>>>,
}

impl PipelineCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the pipeline for `kernel` with the given thread-group shape,
    /// building it on first use.
    pub fn get_pipeline_data(
        &self,
        backend: &dyn GpuBackend,
        kernel: &KernelDescriptor,
        threads: [u32; 3],
    ) -> Result<Arc<PipelineData>> {
        let key = PipelineKey {
            kernel: kernel.id(),
            threads,
        };
        if let Some(data) = self.entries.read().get(&key) {
            return Ok(Arc::clone(data));
        }

        if let Err(err) = check_binding_budget(&kernel.binding_layout()) {
            log::warn!("PipelineCache: {err}");
        }

        let built = Arc::new(Self::build(backend, kernel, key)?);
        let mut entries = self.entries.write();
        match entries.entry(key) {
            Entry::Occupied(entry) => {
                let existing = Arc::clone(entry.get());
                drop(entries);
                backend.destroy_pipeline(built.pipeline);
                backend.destroy_root_signature(built.root_signature);
                Ok(existing)
            }
            Entry::Vacant(entry) => {
                log::debug!(
                    "PipelineCache: built pipeline for kernel {:?} with threads {threads:?}",
                    key.kernel
                );
                Ok(Arc::clone(entry.insert(built)))
            }
        }
    }

    fn build(
        backend: &dyn GpuBackend,
        kernel: &KernelDescriptor,
        key: PipelineKey,
    ) -> Result<PipelineData> {
        let layout = kernel.root_signature_descriptor();
        let root_signature = backend.create_root_signature(&layout)?;
        let pipeline =
            match backend.create_compute_pipeline(root_signature, kernel.bytecode(), key.threads) {
                Ok(pipeline) => pipeline,
                Err(err) => {
                    backend.destroy_root_signature(root_signature);
                    return Err(err);
                }
            };
        Ok(PipelineData {
            key,
            root_signature,
            pipeline,
            constant_count: layout.constant_count,
            descriptor_tables: layout.descriptor_tables,
        })
    }

    /// Number of cached pipelines.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing has been built yet.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns true if a pipeline exists for `key`.
    pub fn contains(&self, key: &PipelineKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Destroy every cached pipeline.
    pub(crate) fn destroy(&self, backend: &dyn GpuBackend) {
        for (_, data) in self.entries.write().drain() {
            backend.destroy_pipeline(data.pipeline);
            backend.destroy_root_signature(data.root_signature);
        }
    }
}

impl std::fmt::Debug for PipelineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCache")
            .field("len", &self.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(PipelineData: Send, Sync);
static_assertions::assert_impl_all!(PipelineCache: Send, Sync);
