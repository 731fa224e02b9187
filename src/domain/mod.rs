//! Domain model: the order aggregate, its state machine and the ports it needs.

pub mod actor;
pub mod events;
pub mod ids;
pub mod money;
pub mod order;
pub mod payment;
pub mod ports;
pub mod settlement;
pub mod status;
