//! Device-tree topology builder for the tracker PCIe PGP/FC card.
//!
//! Builds one addressable tree out of the card's register space and its
//! grid of (lane, VC) DMA streams, on either the real device node or the
//! TCP firmware simulation.
//!
//! # Construction order
//!
//! ```text
//! TransportProvider ─► ChannelGrid ─► SelfTestInjector (optional) ─► register-map modules
//!   Hardware: /dev/datadev_0       dest (0x100*lane)+vc
//!   Simulated: localhost:11000     ports 8002 + 512*lane + 2*vc
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use tracker_driver::{DeviceTreeRoot, Direction, RootConfig, StreamEndpoint};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg  = RootConfig::simulated().with_geometry(1, 4, 4);
//! let mut root = DeviceTreeRoot::new(cfg)?;
//!
//! println!("FPGA version {:#010x}", root.pcie_core().fpga_version()?);
//!
//! let tx = root.grid_mut().endpoint_mut(0, 2, Direction::Tx)?;
//! tx.send(bytes::Bytes::from_static(b"hello"))?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod config;
mod error;
pub mod grid;
pub mod modules;
pub mod prbs;
mod root;
mod selftest;
pub mod transport;
pub mod transports;

/// Card address model (re-exported from tracker-chip).
pub mod chip {
    pub use tracker_chip::addr::{Region, PCIE_CORE_BASE, PGPFC_BASE};
    pub use tracker_chip::{dma, pgp, sim, DEFAULT_DEVICE};
}

pub use config::{Geometry, ModuleOptions, RootConfig, SimEndpoint};
pub use error::{Result, TrackerError};
pub use grid::{ChannelGrid, Direction, EndpointId, GridCell, Termination};
pub use modules::{AxiPcieCore, PgpFcCore, RegisterModule, VersionInfo};
pub use prbs::{CheckerStats, GeneratorStats, PrbsChecker, PrbsGenerator, SelfTestTap};
pub use root::{Claim, DeviceTreeRoot};
pub use selftest::SelfTestInjector;
pub use transport::{
    realize, select_provider, MemoryBinding, MemoryInterface, StreamBinding, StreamEndpoint,
    StreamPair, TransportMode, TransportProvider,
};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        ChannelGrid, DeviceTreeRoot, Direction, MemoryInterface, Result, RootConfig,
        SelfTestTap, StreamEndpoint, TrackerError, TransportMode,
    };
}
