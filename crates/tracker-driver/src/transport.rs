//! Transport abstraction for the card
//!
//! Provides one interface for the memory-mapped register space and the
//! (lane, VC) stream endpoints, whatever carries them. The mode is chosen
//! once, in [`select_provider`]; nothing downstream branches on it.

use std::fmt::{self, Debug};
use std::sync::Arc;

use bytes::Bytes;

use crate::config::{Geometry, RootConfig};
use crate::error::{Result, TrackerError};
use crate::grid::{self, ChannelGrid, Direction, EndpointId, GridCell};
use crate::transports::{DatadevProvider, TcpProvider};

/// Backing transport of the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportMode {
    /// datadev device node (`/dev/datadev_*`)
    Hardware,

    /// Firmware simulation reached over TCP
    Simulated,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardware => write!(f, "hardware"),
            Self::Simulated => write!(f, "simulated"),
        }
    }
}

/// What a memory interface is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryBinding {
    /// Register ioctls on a device node
    Device {
        /// Device path
        path: String,
    },
    /// Memory transaction server
    Tcp {
        /// Simulation host
        host: String,
        /// Server port
        port: u16,
    },
}

impl fmt::Display for MemoryBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device { path } => write!(f, "{path}"),
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
        }
    }
}

/// What a stream endpoint is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamBinding {
    /// DMA destination on a device node
    Dma {
        /// Device path
        device: String,
        /// Destination index `(0x100 * lane) + vc`
        dest: u32,
    },
    /// Simulated stream port pair; TX uses `port`, RX uses `port + 1`
    Tcp {
        /// Simulation host
        host: String,
        /// Pair port `base + 512*lane + 2*vc`, shared by both directions
        port: u16,
        /// Port this direction's socket is connected to
        socket: u16,
    },
}

impl fmt::Display for StreamBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dma { device, dest } => write!(f, "{device} dest {dest:#05x}"),
            Self::Tcp { host, port, socket } => write!(f, "tcp://{host}:{socket} (pair {port})"),
        }
    }
}

/// Register access to the card
///
/// One instance exists per tree and is shared by reference with every
/// attached module. Implementations serialize access as their transport
/// requires; callers add no locking of their own.
pub trait MemoryInterface: Debug + Send + Sync {
    /// What this interface is bound to
    fn binding(&self) -> MemoryBinding;

    /// Read `buf.len()` bytes starting at an absolute address
    ///
    /// # Errors
    ///
    /// Returns error if the transaction fails.
    fn read(&self, address: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `data` starting at an absolute address
    ///
    /// # Errors
    ///
    /// Returns error if the transaction fails.
    fn write(&self, address: u64, data: &[u8]) -> Result<()>;

    /// Read one 32-bit register
    ///
    /// # Errors
    ///
    /// Returns error if the transaction fails.
    fn read32(&self, address: u64) -> Result<u32> {
        let mut word = [0u8; 4];
        self.read(address, &mut word)?;
        Ok(u32::from_le_bytes(word))
    }

    /// Write one 32-bit register
    ///
    /// # Errors
    ///
    /// Returns error if the transaction fails.
    fn write32(&self, address: u64, value: u32) -> Result<()> {
        self.write(address, &value.to_le_bytes())
    }
}

/// One direction of one (lane, VC) stream
///
/// Each endpoint has exactly one owner. RX endpoints implement `recv`,
/// TX endpoints implement `send`; the other call is rejected.
pub trait StreamEndpoint: Debug + Send {
    /// Lane, VC and direction of this endpoint
    fn id(&self) -> EndpointId;

    /// What this endpoint is bound to
    fn binding(&self) -> StreamBinding;

    /// Send one frame (TX only)
    ///
    /// # Errors
    ///
    /// Returns error on RX endpoints or if the transfer fails.
    fn send(&mut self, frame: Bytes) -> Result<()> {
        let _ = frame;
        let id = self.id();
        Err(TrackerError::stream_owned(id.lane, id.vc, id.direction, "receive-only endpoint"))
    }

    /// Receive one frame if one is ready (RX only)
    ///
    /// # Errors
    ///
    /// Returns error on TX endpoints or if the transfer fails.
    fn recv(&mut self) -> Result<Option<Bytes>> {
        let id = self.id();
        Err(TrackerError::stream_owned(id.lane, id.vc, id.direction, "send-only endpoint"))
    }
}

/// Both directions of one (lane, VC) cell, as opened by a provider
#[derive(Debug)]
pub struct StreamPair {
    /// Card → host
    pub rx: Box<dyn StreamEndpoint>,
    /// Host → card
    pub tx: Box<dyn StreamEndpoint>,
}

/// Factory for the memory interface and the stream endpoints of one mode
pub trait TransportProvider: Debug {
    /// Mode implemented by this provider
    fn mode(&self) -> TransportMode;

    /// Open the register interface
    ///
    /// # Errors
    ///
    /// Returns `TransportUnavailable` if the resource cannot be opened.
    fn open_memory(&self) -> Result<Arc<dyn MemoryInterface>>;

    /// Open the RX/TX endpoints of one cell
    ///
    /// # Errors
    ///
    /// Returns `TransportUnavailable` if the resource cannot be opened.
    fn open_stream(&self, lane: usize, vc: usize) -> Result<StreamPair>;
}

/// Pick the provider for a configuration's mode
pub fn select_provider(config: &RootConfig) -> Box<dyn TransportProvider> {
    match config.mode {
        TransportMode::Hardware => Box::new(DatadevProvider::new(config.device.clone())),
        TransportMode::Simulated => Box::new(TcpProvider::new(config.sim.clone())),
    }
}

/// Open the memory interface and every stream cell of a geometry
///
/// Cells are opened lane-major, then VC. The first failure aborts; every
/// endpoint opened so far is released back to front, then the memory
/// interface, before the error is returned.
///
/// # Errors
///
/// Returns `InvalidGeometry` before touching the transport if the geometry
/// is rejected, otherwise the provider's first error.
pub fn realize(provider: &dyn TransportProvider, geometry: &Geometry) -> Result<ChannelGrid> {
    geometry.validate()?;

    tracing::info!(
        "Opening {} transport: {} lanes x {} VCs",
        provider.mode(),
        geometry.lanes,
        geometry.vcs
    );

    let memory = provider.open_memory()?;
    tracing::debug!("Memory interface bound to {}", memory.binding());

    let mut cells = Vec::with_capacity(geometry.cells());
    for lane in 0..geometry.lanes {
        for vc in 0..geometry.vcs {
            let pair = match provider.open_stream(lane, vc) {
                Ok(pair) => pair,
                Err(e) => {
                    grid::release_cells(&mut cells);
                    return Err(e);
                }
            };
            debug_assert_eq!(pair.rx.id(), EndpointId::new(lane, vc, Direction::Rx));
            debug_assert_eq!(pair.tx.id(), EndpointId::new(lane, vc, Direction::Tx));
            tracing::debug!("Stream [{lane}][{vc}] bound to {}", pair.tx.binding());
            cells.push(GridCell::pass_through(lane, vc, pair));
        }
    }

    Ok(ChannelGrid::new(*geometry, memory, cells))
}
