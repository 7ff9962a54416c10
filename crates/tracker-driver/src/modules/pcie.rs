//! AXI PCIe core
//!
//! Parameterized by the DMA lane count. Only the version block is
//! modelled; everything else in the window is left to the firmware.

use std::sync::Arc;

use tracker_chip::addr::{Region, PCIE_CORE_SIZE};
use tracker_chip::pgp::axi_version;

use super::{RegisterModule, Window};
use crate::config::ModuleOptions;
use crate::error::Result;
use crate::transport::MemoryInterface;

const NAME: &str = Region::PcieCore.name();

/// Contents of the AXI version block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    /// Firmware version word
    pub fpga_version: u32,
    /// Scratchpad value
    pub scratch_pad: u32,
    /// Seconds since configuration
    pub up_time: u32,
}

/// PCIe core register map
#[derive(Debug)]
pub struct AxiPcieCore {
    dma_lanes: usize,
    window: Option<Window>,
    last_read: Option<VersionInfo>,
}

impl AxiPcieCore {
    /// Create an unattached core for `dma_lanes` lanes
    pub const fn new(dma_lanes: usize) -> Self {
        Self {
            dma_lanes,
            window: None,
            last_read: None,
        }
    }

    /// DMA lane count the core was built for
    pub const fn dma_lanes(&self) -> usize {
        self.dma_lanes
    }

    fn version(&self, offset: u64) -> Result<u32> {
        Window::get(&self.window, NAME)?.read32(axi_version::BASE + offset)
    }

    /// Firmware version word
    ///
    /// # Errors
    ///
    /// Returns error if not attached or the read fails.
    pub fn fpga_version(&self) -> Result<u32> {
        self.version(axi_version::FPGA_VERSION)
    }

    /// Seconds since FPGA configuration
    ///
    /// # Errors
    ///
    /// Returns error if not attached or the read fails.
    pub fn up_time(&self) -> Result<u32> {
        self.version(axi_version::UP_TIME_CNT)
    }

    /// Scratchpad register
    ///
    /// # Errors
    ///
    /// Returns error if not attached or the read fails.
    pub fn scratch_pad(&self) -> Result<u32> {
        self.version(axi_version::SCRATCH_PAD)
    }

    /// Write the scratchpad register
    ///
    /// # Errors
    ///
    /// Returns error if not attached or the write fails.
    pub fn set_scratch_pad(&self, value: u32) -> Result<()> {
        Window::get(&self.window, NAME)?.write32(axi_version::BASE + axi_version::SCRATCH_PAD, value)
    }

    /// Read the whole version block
    ///
    /// # Errors
    ///
    /// Returns error if not attached or a read fails.
    pub fn read_all(&mut self) -> Result<VersionInfo> {
        let info = VersionInfo {
            fpga_version: self.fpga_version()?,
            scratch_pad: self.scratch_pad()?,
            up_time: self.up_time()?,
        };
        self.last_read = Some(info);
        Ok(info)
    }

    /// Result of the most recent [`read_all`](Self::read_all)
    pub const fn last_read(&self) -> Option<VersionInfo> {
        self.last_read
    }
}

impl RegisterModule for AxiPcieCore {
    fn name(&self) -> &str {
        NAME
    }

    fn span(&self) -> u64 {
        PCIE_CORE_SIZE
    }

    fn attach(&mut self, memory: Arc<dyn MemoryInterface>, base: u64, options: ModuleOptions) -> Result<()> {
        let span = self.span();
        Window::bind(&mut self.window, NAME, memory, base, span, options)?;
        tracing::info!("{NAME} attached at {base:#010x} ({} DMA lanes)", self.dma_lanes);

        if options.init_read {
            let info = self.read_all()?;
            tracing::info!("{NAME}: FPGA version {:#010x}, up {} s", info.fpga_version, info.up_time);
        }
        Ok(())
    }

    fn base(&self) -> Option<u64> {
        self.window.as_ref().map(Window::base)
    }

    fn options(&self) -> Option<ModuleOptions> {
        self.window.as_ref().map(Window::options)
    }
}
