//! Transport provider implementations
//!
//! Two providers are available:
//! - **Datadev**: register ioctls and DMA destinations on `/dev/datadev_*`
//! - **Tcp**: memory transactions and stream port pairs of the firmware
//!   simulation

pub mod frame;
pub mod hardware;
pub mod simulated;

#[cfg(test)]
pub(crate) mod loopback;

pub use hardware::{DatadevMemory, DatadevProvider};
pub use simulated::{TcpMemory, TcpProvider};
