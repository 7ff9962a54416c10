//! Tree construction configuration
//!
//! Every option the root understands is a field here; nothing else is
//! threaded through constructors. [`RootConfig::validate`] runs once,
//! before any transport resource is opened.

use tracker_chip::{dma, pgp, sim};

use crate::error::{Result, TrackerError};
use crate::transport::TransportMode;

/// Lane / link / VC counts of the card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// DMA lanes (one per transceiver quad)
    pub lanes: usize,
    /// Physical links per quad
    pub links: usize,
    /// Virtual channels per lane
    pub vcs: usize,
}

impl Geometry {
    /// Create a geometry (not validated)
    pub const fn new(lanes: usize, links: usize, vcs: usize) -> Self {
        Self { lanes, links, vcs }
    }

    /// Number of (lane, vc) cells
    pub const fn cells(&self) -> usize {
        self.lanes * self.vcs
    }

    /// Check the counts against both addressing schemes
    ///
    /// # Errors
    ///
    /// Returns `InvalidGeometry` if any count is zero or the lane/VC
    /// indices would not fit the DMA destination encoding or the
    /// protocol core window.
    pub fn validate(&self) -> Result<()> {
        if self.lanes == 0 {
            return Err(TrackerError::invalid_geometry("numLanes must be positive"));
        }
        if self.links == 0 {
            return Err(TrackerError::invalid_geometry("numLinks must be positive"));
        }
        if self.vcs == 0 {
            return Err(TrackerError::invalid_geometry("numVc must be positive"));
        }
        if self.vcs > dma::MAX_VCS {
            return Err(TrackerError::invalid_geometry(format!(
                "numVc {} aliases the next lane (max {})",
                self.vcs,
                dma::MAX_VCS
            )));
        }
        if self.lanes > dma::MAX_LANES.min(pgp::MAX_QUADS) {
            return Err(TrackerError::invalid_geometry(format!(
                "numLanes {} exceeds {} quads",
                self.lanes,
                dma::MAX_LANES.min(pgp::MAX_QUADS)
            )));
        }
        if self.links > pgp::MAX_LINKS {
            return Err(TrackerError::invalid_geometry(format!(
                "numLinks {} exceeds {} links per quad",
                self.links,
                pgp::MAX_LINKS
            )));
        }
        Ok(())
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new(
            tracker_chip::DEFAULT_LANES,
            tracker_chip::DEFAULT_LINKS,
            tracker_chip::DEFAULT_VCS,
        )
    }
}

/// Options forwarded untouched to the register-map modules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModuleOptions {
    /// Modules may poll their status registers periodically
    pub poll_enabled: bool,
    /// Modules read every register once when attached
    pub init_read: bool,
}

/// Where the simulated card listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimEndpoint {
    /// Simulation host
    pub host: String,
    /// Memory transaction server port
    pub memory_port: u16,
    /// Port of stream (0, 0); the rest follow `+ 512*lane + 2*vc`
    pub stream_base_port: u16,
}

impl Default for SimEndpoint {
    fn default() -> Self {
        Self {
            host: sim::DEFAULT_HOST.to_string(),
            memory_port: sim::MEMORY_PORT,
            stream_base_port: sim::STREAM_BASE_PORT,
        }
    }
}

/// Full construction configuration of a [`DeviceTreeRoot`](crate::DeviceTreeRoot)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootConfig {
    /// Real device or network-simulated card
    pub mode: TransportMode,
    /// Device node (hardware mode)
    pub device: String,
    /// Lane / link / VC counts
    pub geometry: Geometry,
    /// Splice PRBS generator/checker pairs into every stream cell
    pub self_test: bool,
    /// Forwarded to attached modules
    pub options: ModuleOptions,
    /// Simulated card address (simulated mode)
    pub sim: SimEndpoint,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::Hardware,
            device: tracker_chip::DEFAULT_DEVICE.to_string(),
            geometry: Geometry::default(),
            self_test: false,
            options: ModuleOptions::default(),
            sim: SimEndpoint::default(),
        }
    }
}

impl RootConfig {
    /// Hardware configuration for a device node with default geometry
    pub fn hardware(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Self::default()
        }
    }

    /// Simulated configuration against the default localhost ports
    pub fn simulated() -> Self {
        Self {
            mode: TransportMode::Simulated,
            ..Self::default()
        }
    }

    /// Set the geometry
    #[must_use]
    pub const fn with_geometry(mut self, lanes: usize, links: usize, vcs: usize) -> Self {
        self.geometry = Geometry::new(lanes, links, vcs);
        self
    }

    /// Enable or disable self-test injection
    #[must_use]
    pub const fn with_self_test(mut self, enabled: bool) -> Self {
        self.self_test = enabled;
        self
    }

    /// Set the forwarded module options
    #[must_use]
    pub const fn with_options(mut self, options: ModuleOptions) -> Self {
        self.options = options;
        self
    }

    /// Point the simulated transport at another host/port set
    #[must_use]
    pub fn with_sim(mut self, sim: SimEndpoint) -> Self {
        self.sim = sim;
        self
    }

    /// Validate the whole configuration
    ///
    /// # Errors
    ///
    /// Returns `InvalidGeometry` if the geometry is rejected or, in simulated
    /// mode, the stream ports would run past `u16::MAX`.
    pub fn validate(&self) -> Result<()> {
        self.geometry.validate()?;

        if self.mode == TransportMode::Simulated
            && sim::last_port(self.sim.stream_base_port, self.geometry.lanes, self.geometry.vcs).is_none()
        {
            return Err(TrackerError::invalid_geometry(format!(
                "{} lanes x {} VCs from port {} exceed the port range",
                self.geometry.lanes, self.geometry.vcs, self.sim.stream_base_port
            )));
        }
        Ok(())
    }
}
