//! Adapters for the domain ports: stores, payout gateway, event publisher and clocks.

pub mod clock;
pub mod events;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
