//! PGP/FC protocol core
//!
//! Parameterized by quads (= DMA lanes), links per quad and VCs. The core
//! lays its per-link children out at fixed strides from its own base.

use std::sync::Arc;

use tracker_chip::addr::Region;
use tracker_chip::pgp;

use super::{RegisterModule, Window};
use crate::config::{Geometry, ModuleOptions};
use crate::error::{Result, TrackerError};
use crate::transport::MemoryInterface;

const NAME: &str = Region::PgpFc.name();

/// Protocol core register map
#[derive(Debug)]
pub struct PgpFcCore {
    quads: usize,
    links: usize,
    vcs: usize,
    window: Option<Window>,
    link_status: Vec<u32>,
}

impl PgpFcCore {
    /// Create an unattached core for a geometry
    pub const fn new(geometry: &Geometry) -> Self {
        Self {
            quads: geometry.lanes,
            links: geometry.links,
            vcs: geometry.vcs,
            window: None,
            link_status: Vec::new(),
        }
    }

    /// Quad count
    pub const fn quads(&self) -> usize {
        self.quads
    }

    /// Links per quad
    pub const fn links(&self) -> usize {
        self.links
    }

    /// VCs per link
    pub const fn vcs(&self) -> usize {
        self.vcs
    }

    /// Offset of a link block relative to the core base
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` for a quad or link outside the geometry.
    pub fn link_offset(&self, quad: usize, link: usize) -> Result<u64> {
        if quad >= self.quads {
            return Err(TrackerError::out_of_range("quad", quad, self.quads));
        }
        if link >= self.links {
            return Err(TrackerError::out_of_range("link", link, self.links));
        }
        Ok(pgp::link_offset(quad, link))
    }

    /// Absolute address of a link block, once attached
    ///
    /// # Errors
    ///
    /// Returns error if not attached or the indices are out of range.
    pub fn link_address(&self, quad: usize, link: usize) -> Result<u64> {
        let offset = self.link_offset(quad, link)?;
        Ok(Window::get(&self.window, NAME)?.base() + offset)
    }

    /// Status word of one link
    ///
    /// # Errors
    ///
    /// Returns error if not attached, out of range, or the read fails.
    pub fn link_status(&self, quad: usize, link: usize) -> Result<u32> {
        let offset = self.link_offset(quad, link)?;
        Window::get(&self.window, NAME)?.read32(offset + pgp::LINK_STATUS)
    }

    /// Read every link status word, quad-major
    ///
    /// # Errors
    ///
    /// Returns error if not attached or a read fails.
    pub fn read_all(&mut self) -> Result<&[u32]> {
        let mut status = Vec::with_capacity(self.quads * self.links);
        for quad in 0..self.quads {
            for link in 0..self.links {
                status.push(self.link_status(quad, link)?);
            }
        }
        self.link_status = status;
        Ok(&self.link_status)
    }
}

impl RegisterModule for PgpFcCore {
    fn name(&self) -> &str {
        NAME
    }

    fn span(&self) -> u64 {
        self.quads as u64 * pgp::QUAD_STRIDE
    }

    fn attach(&mut self, memory: Arc<dyn MemoryInterface>, base: u64, options: ModuleOptions) -> Result<()> {
        let span = self.span();
        Window::bind(&mut self.window, NAME, memory, base, span, options)?;
        tracing::info!(
            "{NAME} attached at {base:#010x} ({} quads x {} links x {} VCs)",
            self.quads,
            self.links,
            self.vcs
        );

        if options.init_read {
            let read = self.read_all()?.len();
            tracing::debug!("{NAME}: read {read} link status words");
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
