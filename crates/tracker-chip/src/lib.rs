//! Silicon model for the tracker PCIe PGP/FC data-acquisition card.
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of the card as seen from the host: the register address map,
//! DMA destination encoding, the simulated-card port scheme, and the
//! internal child layout of the protocol core.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`addr`] | Absolute address map (PCIe core at `0x0`, PGP/FC core at `0x0080_0000`) |
//! | [`dma`] | DMA destination encoding `(0x100 * lane) + vc`, datadev ioctls |
//! | [`sim`] | Simulated-card TCP ports (`11000`, `8002 + 512*lane + 2*vc`) |
//! | [`pgp`] | PGP/FC core child strides and AXI version block registers |
//!
//! The bring-up defaults (device path and geometry) live at the crate root.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod addr;
pub mod dma;
pub mod pgp;
pub mod sim;

/// Default datadev device node.
pub const DEFAULT_DEVICE: &str = "/dev/datadev_0";

/// Default number of DMA lanes (one per transceiver quad).
pub const DEFAULT_LANES: usize = 1;

/// Default number of physical links per quad.
pub const DEFAULT_LINKS: usize = 4;

/// Default number of virtual channels per lane.
pub const DEFAULT_VCS: usize = 4;
