//! Mediator - event registration and asynchronous delivery for Uppe services.
//!
//! A [`Dispatcher`] decouples producers from consumers:
//! - listeners bind to a set of event names, at most one listener per name
//! - producers dispatch a payload by name without knowing who consumes it
//! - a fixed pool of workers hands each payload to the bound listener
//!
//! Every listener is pinned to a single worker, so payloads dispatched to the
//! same listener are delivered in the order they were accepted.

mod dispatcher;
mod error;
mod listener;

use std::fmt::{Debug, Display};
use std::hash::Hash;

pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::DispatchError;
pub use listener::{Delivery, Inbox, Listener};

/// Bound satisfied by every type usable as an event name.
///
/// Names come from a closed, process-defined set, so they are expected to be
/// small `Copy` enums.
pub trait EventKey: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static {}

impl<T> EventKey for T where T: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static {}

/// Default number of delivery workers
pub const DEFAULT_WORKERS: usize = 5;

/// Default capacity of each worker's job queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
