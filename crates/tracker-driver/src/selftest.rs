//! Self-test injection over the stream grid
//!
//! When enabled, every cell's endpoints are handed to a
//! [`SelfTestTap`]. This must run before any register-map module sees
//! the grid; the root enforces the ordering.

use tracing::info;

use crate::error::Result;
use crate::grid::{ChannelGrid, GridCell, Termination};
use crate::prbs::SelfTestTap;

/// Optional PRBS tap injection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelfTestInjector {
    enabled: bool,
}

impl SelfTestInjector {
    /// Create an injector
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Return the grid unchanged when disabled, or with every cell tapped
    ///
    /// # Errors
    ///
    /// Returns `AttachmentFailure` if a tap rejects its endpoints.
    pub fn attach(&self, grid: ChannelGrid) -> Result<ChannelGrid> {
        if !self.enabled {
            return Ok(grid);
        }

        let cells = grid.len();
        let grid = grid.try_map_cells(|cell| {
            let (lane, vc) = (cell.lane(), cell.vc());
            let termination = match cell.into_termination() {
                Termination::PassThrough { rx, tx } => Termination::SelfTest(SelfTestTap::attach(rx, tx)?),
                tapped @ Termination::SelfTest(_) => tapped,
            };
            Ok(GridCell::with_termination(lane, vc, termination))
        })?;

        info!("Injected software PRBS taps on {cells} stream cells");
        Ok(grid)
    }
}
