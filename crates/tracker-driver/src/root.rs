//! Device tree root
//!
//! Construction runs strictly in order:
//!
//! ```text
//! 1. TransportProvider  → memory interface + stream grid
//! 2. memory interface registered as the tree's addressable resource
//! 3. SelfTestInjector   → taps spliced in (if enabled)
//! 4. AxiPcieCore        @ 0x0000_0000
//! 5. PgpFc              @ 0x0080_0000
//! ```
//!
//! Any failure aborts construction; everything opened so far is dropped
//! before the error reaches the caller.

use std::sync::Arc;

use tracing::info;
use tracker_chip::addr::{self, Region};

use crate::config::{ModuleOptions, RootConfig};
use crate::error::{Result, TrackerError};
use crate::grid::ChannelGrid;
use crate::modules::{AxiPcieCore, PgpFcCore, RegisterModule};
use crate::selftest::SelfTestInjector;
use crate::transport::{self, MemoryInterface, TransportProvider};

/// Address range claimed by an attached module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    /// Module name
    pub module: String,
    /// First address
    pub base: u64,
    /// Bytes claimed
    pub span: u64,
}

/// Claim `[base, base + span)` for a module and attach it
fn attach_module(
    claims: &mut Vec<Claim>,
    module: &mut dyn RegisterModule,
    memory: &Arc<dyn MemoryInterface>,
    base: u64,
    options: ModuleOptions,
) -> Result<()> {
    let span = module.span();
    if let Some(other) = claims
        .iter()
        .find(|c| addr::overlaps(c.base, c.span, base, span))
    {
        return Err(TrackerError::attachment_failure(
            module.name(),
            format!(
                "[{base:#010x}, +{span:#x}) overlaps {} at [{:#010x}, +{:#x})",
                other.module, other.base, other.span
            ),
        ));
    }

    module.attach(Arc::clone(memory), base, options)?;
    claims.push(Claim {
        module: module.name().to_string(),
        base,
        span,
    });
    Ok(())
}

/// Fully wired device tree
///
/// Fields are declared in reverse construction order so teardown releases
/// modules first and the memory interface last.
#[derive(Debug)]
pub struct DeviceTreeRoot {
    protocol_core: PgpFcCore,
    pcie_core: AxiPcieCore,
    claims: Vec<Claim>,
    grid: ChannelGrid,
    memory: Arc<dyn MemoryInterface>,
    config: RootConfig,
}

impl DeviceTreeRoot {
    /// Build the tree on the transport selected by `config.mode`
    ///
    /// # Errors
    ///
    /// Returns `InvalidGeometry` before any transport is opened,
    /// `TransportUnavailable` if the transport cannot be opened, and
    /// `AttachmentFailure` if a module rejects its attach call.
    pub fn new(config: RootConfig) -> Result<Self> {
        config.validate()?;
        let provider = transport::select_provider(&config);
        Self::with_provider(config, provider.as_ref())
    }

    /// Build the tree on an explicit provider
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_provider(config: RootConfig, provider: &dyn TransportProvider) -> Result<Self> {
        config.validate()?;
        let geometry = config.geometry;

        info!(
            "Building device tree: {} transport, {} lanes, {} links, {} VCs, self-test {}",
            provider.mode(),
            geometry.lanes,
            geometry.links,
            geometry.vcs,
            if config.self_test { "on" } else { "off" }
        );

        let grid = transport::realize(provider, &geometry)?;
        let memory = Arc::clone(grid.memory_interface());
        info!("Registered memory interface {}", memory.binding());

        let grid = SelfTestInjector::new(config.self_test).attach(grid)?;

        let mut claims = Vec::with_capacity(2);

        let mut pcie_core = AxiPcieCore::new(geometry.lanes);
        attach_module(&mut claims, &mut pcie_core, &memory, Region::PcieCore.base(), config.options)?;

        let mut protocol_core = PgpFcCore::new(&geometry);
        attach_module(&mut claims, &mut protocol_core, &memory, Region::PgpFc.base(), config.options)?;

        info!("Device tree ready: {} stream cells, {} modules", grid.len(), claims.len());

        Ok(Self {
            protocol_core,
            pcie_core,
            claims,
            grid,
            memory,
            config,
        })
    }

    /// Configuration the tree was built from
    pub const fn config(&self) -> &RootConfig {
        &self.config
    }

    /// The tree's single memory interface
    pub fn memory(&self) -> &Arc<dyn MemoryInterface> {
        &self.memory
    }

    /// Stream grid
    pub const fn grid(&self) -> &ChannelGrid {
        &self.grid
    }

    /// Mutable stream grid, for sending/receiving and driving taps
    pub fn grid_mut(&mut self) -> &mut ChannelGrid {
        &mut self.grid
    }

    /// PCIe core module
    pub const fn pcie_core(&self) -> &AxiPcieCore {
        &self.pcie_core
    }

    /// Protocol core module
    pub const fn protocol_core(&self) -> &PgpFcCore {
        &self.protocol_core
    }

    /// Address ranges claimed by attached modules, in attach order
    pub fn address_map(&self) -> &[Claim] {
        &self.claims
    }

    /// Absolute address of a window-relative offset
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if `offset` is outside the window.
    pub fn absolute_address(&self, region: Region, offset: u64) -> Result<u64> {
        self.grid.absolute_address(region, offset)
    }
}

impl Drop for DeviceTreeRoot {
    fn drop(&mut self) {
        info!(
            "Releasing device tree: {} modules, {} stream cells, memory {}",
            self.claims.len(),
            self.grid.len(),
            self.memory.binding()
        );
    }
}
