//! Everything between the OS input hook and the aggregation owner: the raw event model, the
//! classifier that decides what counts, and the supervisor that keeps the hook armed.

pub mod classifier;
pub mod collector;
pub mod event;
pub mod listener;
#[cfg(feature = "rdev")]
pub mod rdev_listener;
