//! Command recording and submission.
//!
//! A [`CommandList`] records native commands against a rented command
//! allocator and is submitted to one of the device's [`CommandQueue`]s.
//! Submission is synchronous: the submitting thread blocks until the queue's
//! fence reaches the list's value, after which the allocator goes back to
//! the pool.

mod list;
mod queue;

pub use list::{CommandList, CommandListState};
pub use queue::CommandQueue;
