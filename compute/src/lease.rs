//! Reference tracking for objects that own native handles.
//!
//! Every access to a native handle happens under a [`Lease`]. A lease is a
//! scoped guard: acquiring it increments the owner's lease count, dropping it
//! decrements the count on every exit path.
//!
//! Disposal interacts with outstanding leases according to the owner's
//! [`DisposalPolicy`]:
//!
//! - [`DisposalPolicy::Deferred`] (devices): dispose marks the object as
//!   disposed right away, so new leases fail with
//!   [`ComputeError::ObjectDisposed`]. Teardown runs when the last lease is
//!   released.
//! - [`DisposalPolicy::Exclusive`] (resources): dispose fails with
//!   [`ComputeError::InvalidOperation`] while any lease is outstanding.
//!
//! In both cases teardown runs exactly once, and disposing an already
//! disposed object is a no-op.

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ComputeError, Result};

/// How disposal behaves while leases are outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisposalPolicy {
    /// Disposal is accepted and teardown waits for leases to drain.
    Deferred,
    /// Disposal is refused while leases are outstanding.
    Exclusive,
}

#[derive(Debug, Default)]
struct TrackerState {
    leases: usize,
    disposed: bool,
    torn_down: bool,
}

impl TrackerState {
    fn take_teardown(&mut self) -> bool {
        if self.disposed && self.leases == 0 && !self.torn_down {
            self.torn_down = true;
            return true;
        }
        false
    }
}

/// Lease counter and disposal flag of one tracked object.
#[derive(Debug)]
pub struct ReferenceTracker {
    object: &'static str,
    policy: DisposalPolicy,
    state: Mutex<TrackerState>,
}

impl ReferenceTracker {
    /// Create a tracker for an object of the given name.
    pub fn new(object: &'static str, policy: DisposalPolicy) -> Self {
        Self {
            object,
            policy,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Name of the tracked object, used in errors.
    pub fn object_name(&self) -> &'static str {
        self.object
    }

    /// Disposal policy of the tracked object.
    pub fn policy(&self) -> DisposalPolicy {
        self.policy
    }

    /// Register a new lease.
    pub fn acquire(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(ComputeError::ObjectDisposed(self.object));
        }
        state.leases += 1;
        Ok(())
    }

    /// Release a lease. Returns true if the caller must run teardown.
    #[must_use]
    pub fn release(&self) -> bool {
        let mut state = self.state.lock();
        debug_assert!(state.leases > 0, "{} lease released twice", self.object);
        state.leases = state.leases.saturating_sub(1);
        state.take_teardown()
    }

    /// Mark the object as disposed. Returns true if the caller must run
    /// teardown now.
    #[must_use = "teardown must run when dispose returns true"]
    pub fn dispose(&self) -> Result<bool> {
        let mut state = self.state.lock();
        if state.disposed {
            return Ok(false);
        }
        if self.policy == DisposalPolicy::Exclusive && state.leases > 0 {
            return Err(ComputeError::InvalidOperation(format!(
                "cannot dispose {} while {} lease(s) are outstanding",
                self.object, state.leases
            )));
        }
        state.disposed = true;
        Ok(state.take_teardown())
    }

    /// Returns true once disposal has been requested.
    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// Returns true once teardown has run.
    pub fn is_torn_down(&self) -> bool {
        self.state.lock().torn_down
    }

    /// Number of outstanding leases.
    pub fn lease_count(&self) -> usize {
        self.state.lock().leases
    }
}

/// An object whose native handles are protected by a [`ReferenceTracker`].
pub trait ReferenceTracked {
    /// The object's tracker.
    fn reference_tracker(&self) -> &ReferenceTracker;

    /// Release native handles. Runs exactly once, after disposal has been
    /// requested and no lease is outstanding.
    fn on_teardown(&self);

    /// Acquire a scoped lease on this object.
    fn acquire_lease(&self) -> Result<Lease<'_, Self>>
    where
        Self: Sized,
    {
        self.reference_tracker().acquire()?;
        Ok(Lease { owner: self })
    }

    /// Request disposal, running teardown if the policy allows it now.
    fn dispose_tracked(&self) -> Result<()> {
        if self.reference_tracker().dispose()? {
            self.on_teardown();
        }
        Ok(())
    }
}

/// Scoped permission to use an object's native handles.
pub struct Lease<'a, T: ReferenceTracked> {
    owner: &'a T,
}

impl<T: ReferenceTracked> Deref for Lease<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.owner
    }
}

impl<T: ReferenceTracked> Drop for Lease<'_, T> {
    fn drop(&mut self) {
        if self.owner.reference_tracker().release() {
            self.owner.on_teardown();
        }
    }
}

impl<T: ReferenceTracked> std::fmt::Debug for Lease<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("object", &self.owner.reference_tracker().object_name())
            .finish()
    }
}

/// A lease that keeps its owner alive, for holders that outlive a scope.
///
/// Resources hold one of these on their device so the device's teardown
/// waits for every resource to be disposed.
pub struct OwnedLease<T: ReferenceTracked> {
    owner: Arc<T>,
}

impl<T: ReferenceTracked> OwnedLease<T> {
    /// Acquire a lease on `owner`.
    pub fn new(owner: Arc<T>) -> Result<Self> {
        owner.reference_tracker().acquire()?;
        Ok(Self { owner })
    }

    /// The leased object.
    pub fn owner(&self) -> &Arc<T> {
        &self.owner
    }
}

impl<T: ReferenceTracked> Deref for OwnedLease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.owner
    }
}

impl<T: ReferenceTracked> Drop for OwnedLease<T> {
    fn drop(&mut self) {
        if self.owner.reference_tracker().release() {
            self.owner.on_teardown();
        }
    }
}

impl<T: ReferenceTracked> std::fmt::Debug for OwnedLease<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedLease")
            .field("object", &self.owner.reference_tracker().object_name())
            .finish()
    }
}

static_assertions::assert_impl_all!(ReferenceTracker: Send, Sync);

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Tracked {
        tracker: ReferenceTracker,
        teardowns: AtomicUsize,
    }

    impl Tracked {
        fn new(policy: DisposalPolicy) -> Self {
            Self {
                tracker: ReferenceTracker::new("tracked", policy),
                teardowns: AtomicUsize::new(0),
            }
        }

        fn teardowns(&self) -> usize {
            self.teardowns.load(Ordering::SeqCst)
        }
    }

    impl ReferenceTracked for Tracked {
        fn reference_tracker(&self) -> &ReferenceTracker {
            &self.tracker
        }

        fn on_teardown(&self) {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_lease_counts() {
        let object = Tracked::new(DisposalPolicy::Deferred);
        {
            let _a = object.acquire_lease().unwrap();
            let _b = object.acquire_lease().unwrap();
            assert_eq!(object.tracker.lease_count(), 2);
        }
        assert_eq!(object.tracker.lease_count(), 0);
    }

    #[test]
    fn test_deferred_disposal_waits_for_leases() {
        let object = Tracked::new(DisposalPolicy::Deferred);
        let lease = object.acquire_lease().unwrap();
        object.dispose_tracked().unwrap();
        assert!(object.tracker.is_disposed());
        assert_eq!(object.teardowns(), 0);
        assert_eq!(
            object.acquire_lease().unwrap_err(),
            ComputeError::ObjectDisposed("tracked")
        );
        drop(lease);
        assert_eq!(object.teardowns(), 1);
    }

    #[test]
    fn test_exclusive_disposal_refused_while_leased() {
        let object = Tracked::new(DisposalPolicy::Exclusive);
        let lease = object.acquire_lease().unwrap();
        assert!(matches!(
            object.dispose_tracked(),
            Err(ComputeError::InvalidOperation(_))
        ));
        assert!(!object.tracker.is_disposed());
        drop(lease);
        object.dispose_tracked().unwrap();
        assert_eq!(object.teardowns(), 1);
    }

    #[test]
    fn test_double_dispose_is_noop() {
        let object = Tracked::new(DisposalPolicy::Exclusive);
        object.dispose_tracked().unwrap();
        object.dispose_tracked().unwrap();
        assert_eq!(object.teardowns(), 1);
        assert!(object.tracker.is_torn_down());
    }

    #[test]
    fn test_owned_lease_defers_teardown() {
        let object = Arc::new(Tracked::new(DisposalPolicy::Deferred));
        let lease = OwnedLease::new(Arc::clone(&object)).unwrap();
        object.dispose_tracked().unwrap();
        assert_eq!(object.teardowns(), 0);
        drop(lease);
        assert_eq!(object.teardowns(), 1);
    }
}
