//! (lane, VC) → stream endpoint grid
//!
//! The grid is populated once by [`realize`](crate::transport::realize)
//! and never grows or shrinks. Its iteration order (lane-major, then VC,
//! then RX before TX) is the order every consumer binds in.

use std::fmt;
use std::sync::Arc;

use tracker_chip::addr::Region;

use crate::config::Geometry;
use crate::error::{Result, TrackerError};
use crate::prbs::SelfTestTap;
use crate::transport::{MemoryInterface, StreamEndpoint, StreamPair};

/// Stream direction, seen from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Card → host
    Rx,
    /// Host → card
    Tx,
}

impl Direction {
    /// Both directions in iteration order
    pub const ALL: [Self; 2] = [Self::Rx, Self::Tx];
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rx => write!(f, "RX"),
            Self::Tx => write!(f, "TX"),
        }
    }
}

/// Identity of one stream endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointId {
    /// Lane index
    pub lane: usize,
    /// VC index within the lane
    pub vc: usize,
    /// Direction
    pub direction: Direction,
}

impl EndpointId {
    /// Create an endpoint identity
    pub const fn new(lane: usize, vc: usize, direction: Direction) -> Self {
        Self { lane, vc, direction }
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}] {}", self.lane, self.vc, self.direction)
    }
}

/// What a cell's endpoints are connected to
#[derive(Debug)]
pub enum Termination {
    /// Endpoints are handed to external consumers as-is
    PassThrough {
        /// Card → host
        rx: Box<dyn StreamEndpoint>,
        /// Host → card
        tx: Box<dyn StreamEndpoint>,
    },
    /// Endpoints are owned by a PRBS generator/checker pair
    SelfTest(SelfTestTap),
}

/// One (lane, VC) cell
#[derive(Debug)]
pub struct GridCell {
    lane: usize,
    vc: usize,
    termination: Termination,
}

impl GridCell {
    pub(crate) fn pass_through(lane: usize, vc: usize, pair: StreamPair) -> Self {
        Self {
            lane,
            vc,
            termination: Termination::PassThrough {
                rx: pair.rx,
                tx: pair.tx,
            },
        }
    }

    /// Lane index
    pub const fn lane(&self) -> usize {
        self.lane
    }

    /// VC index
    pub const fn vc(&self) -> usize {
        self.vc
    }

    /// Current termination
    pub const fn termination(&self) -> &Termination {
        &self.termination
    }

    /// Whether a self-test tap owns this cell
    pub const fn is_self_test(&self) -> bool {
        matches!(self.termination, Termination::SelfTest(_))
    }

    /// Endpoint of one direction, whoever owns it
    pub fn endpoint(&self, direction: Direction) -> &dyn StreamEndpoint {
        match (&self.termination, direction) {
            (Termination::PassThrough { rx, .. }, Direction::Rx) => rx.as_ref(),
            (Termination::PassThrough { tx, .. }, Direction::Tx) => tx.as_ref(),
            (Termination::SelfTest(tap), direction) => tap.endpoint(direction),
        }
    }

    pub(crate) fn into_termination(self) -> Termination {
        self.termination
    }

    pub(crate) fn with_termination(lane: usize, vc: usize, termination: Termination) -> Self {
        Self { lane, vc, termination }
    }

    /// Close the cell, TX before RX
    fn release(self) {
        match self.termination {
            Termination::PassThrough { rx, tx } => {
                drop(tx);
                drop(rx);
            }
            // the tap drops its generator (TX) before its checker (RX)
            Termination::SelfTest(tap) => drop(tap),
        }
    }
}

/// Close cells back to front, undoing lane-major construction
pub(crate) fn release_cells(cells: &mut Vec<GridCell>) {
    while let Some(cell) = cells.pop() {
        tracing::trace!("Releasing stream [{}][{}]", cell.lane, cell.vc);
        cell.release();
    }
}

/// Fully populated grid of stream cells plus the shared memory interface
#[derive(Debug)]
pub struct ChannelGrid {
    geometry: Geometry,
    cells: Vec<GridCell>,
    memory: Arc<dyn MemoryInterface>,
}

impl ChannelGrid {
    pub(crate) fn new(geometry: Geometry, memory: Arc<dyn MemoryInterface>, cells: Vec<GridCell>) -> Self {
        debug_assert_eq!(cells.len(), geometry.cells());
        debug_assert!(cells
            .iter()
            .enumerate()
            .all(|(i, c)| c.lane * geometry.vcs + c.vc == i));
        Self {
            geometry,
            cells,
            memory,
        }
    }

    /// Geometry the grid was built for
    pub const fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Number of lanes
    pub const fn lanes(&self) -> usize {
        self.geometry.lanes
    }

    /// Number of VCs per lane
    pub const fn vcs(&self) -> usize {
        self.geometry.vcs
    }

    /// Number of cells (`lanes * vcs`)
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Always false for a constructed grid
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The shared register interface
    pub fn memory_interface(&self) -> &Arc<dyn MemoryInterface> {
        &self.memory
    }

    fn index(&self, lane: usize, vc: usize) -> Result<usize> {
        if lane >= self.geometry.lanes {
            return Err(TrackerError::out_of_range("lane", lane, self.geometry.lanes));
        }
        if vc >= self.geometry.vcs {
            return Err(TrackerError::out_of_range("vc", vc, self.geometry.vcs));
        }
        Ok(lane * self.geometry.vcs + vc)
    }

    /// Cell at (lane, vc)
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` outside the declared geometry.
    pub fn cell(&self, lane: usize, vc: usize) -> Result<&GridCell> {
        let i = self.index(lane, vc)?;
        Ok(&self.cells[i])
    }

    /// Endpoint at (lane, vc, direction), whoever owns it
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` outside the declared geometry.
    pub fn endpoint(&self, lane: usize, vc: usize, direction: Direction) -> Result<&dyn StreamEndpoint> {
        Ok(self.cell(lane, vc)?.endpoint(direction))
    }

    /// Mutable access to a pass-through endpoint
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` outside the declared geometry and `StreamOwned`
    /// if a self-test tap owns the cell.
    pub fn endpoint_mut(&mut self, lane: usize, vc: usize, direction: Direction) -> Result<&mut dyn StreamEndpoint> {
        let i = self.index(lane, vc)?;
        match (&mut self.cells[i].termination, direction) {
            (Termination::PassThrough { rx, .. }, Direction::Rx) => Ok(rx.as_mut()),
            (Termination::PassThrough { tx, .. }, Direction::Tx) => Ok(tx.as_mut()),
            (Termination::SelfTest(tap), direction) => Err(TrackerError::stream_owned(
                lane,
                vc,
                direction,
                format!("owned by {}", tap.owner_name(direction)),
            )),
        }
    }

    /// Self-test tap of a cell, if one was injected
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` outside the declared geometry.
    pub fn tap(&self, lane: usize, vc: usize) -> Result<Option<&SelfTestTap>> {
        match &self.cell(lane, vc)?.termination {
            Termination::SelfTest(tap) => Ok(Some(tap)),
            Termination::PassThrough { .. } => Ok(None),
        }
    }

    /// Mutable self-test tap of a cell, if one was injected
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` outside the declared geometry.
    pub fn tap_mut(&mut self, lane: usize, vc: usize) -> Result<Option<&mut SelfTestTap>> {
        let i = self.index(lane, vc)?;
        match &mut self.cells[i].termination {
            Termination::SelfTest(tap) => Ok(Some(tap)),
            Termination::PassThrough { .. } => Ok(None),
        }
    }

    /// Cells in lane-major, then VC order
    pub fn cells(&self) -> impl Iterator<Item = &GridCell> {
        self.cells.iter()
    }

    /// Every self-test tap, in cell order
    pub fn taps_mut(&mut self) -> impl Iterator<Item = &mut SelfTestTap> {
        self.cells.iter_mut().filter_map(|c| match &mut c.termination {
            Termination::SelfTest(tap) => Some(tap),
            Termination::PassThrough { .. } => None,
        })
    }

    /// Every endpoint: lane-major, then VC, then RX before TX
    pub fn endpoints(&self) -> impl Iterator<Item = &dyn StreamEndpoint> {
        self.cells
            .iter()
            .flat_map(|c| Direction::ALL.into_iter().map(move |d| c.endpoint(d)))
    }

    /// Absolute address of a window-relative register offset
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if `offset` is outside the window.
    pub fn absolute_address(&self, region: Region, offset: u64) -> Result<u64> {
        region
            .absolute(offset)
            .ok_or_else(|| TrackerError::out_of_range("offset", offset, region.size()))
    }

    /// Rebuild every cell in order, stopping at the first failure
    ///
    /// On failure the cells not yet handed to `f` and those already rebuilt
    /// are released back to front.
    pub(crate) fn try_map_cells<F>(mut self, mut f: F) -> Result<Self>
    where
        F: FnMut(GridCell) -> Result<GridCell>,
    {
        let mut pending = std::mem::take(&mut self.cells);
        pending.reverse();
        let mut cells = Vec::with_capacity(pending.len());
        while let Some(cell) = pending.pop() {
            match f(cell) {
                Ok(cell) => cells.push(cell),
                Err(e) => {
                    pending.reverse();
                    release_cells(&mut pending);
                    release_cells(&mut cells);
                    return Err(e);
                }
            }
        }
        Ok(Self::new(self.geometry, Arc::clone(&self.memory), cells))
    }
}

impl Drop for ChannelGrid {
    fn drop(&mut self) {
        if !self.cells.is_empty() {
            tracing::debug!("Releasing {} stream cells", self.cells.len());
        }
        release_cells(&mut self.cells);
    }
}
