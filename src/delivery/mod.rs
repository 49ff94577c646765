//! Delivery of cached envelopes
//!
//! - `Transport`: the network seam, implemented outside this crate
//! - `DeliveryCoordinator`: one blocking pass over both caches
//! - `DeliveryWorker`: tokio task running the coordinator periodically

mod coordinator;
mod transport;
mod worker;

pub use coordinator::{DeliveryConfig, DeliveryCoordinator, FlushReport};
pub use transport::{SendOutcome, Transport};
pub use worker::DeliveryWorker;
