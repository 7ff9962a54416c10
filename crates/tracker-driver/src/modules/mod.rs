//! Register-map modules attached to the shared memory interface
//!
//! The root only relies on the [`RegisterModule`] attach contract; the
//! register contents are each module's own business.

use std::fmt::Debug;
use std::sync::Arc;

use crate::config::ModuleOptions;
use crate::error::{Result, TrackerError};
use crate::transport::MemoryInterface;

pub mod pcie;
pub mod pgpfc;

pub use pcie::{AxiPcieCore, VersionInfo};
pub use pgpfc::PgpFcCore;

/// A register-map module bound at a fixed base address
pub trait RegisterModule: Debug + Send {
    /// Module name
    fn name(&self) -> &str;

    /// Bytes of address space the module claims from its base
    fn span(&self) -> u64;

    /// Bind to the memory interface at `base`
    ///
    /// # Errors
    ///
    /// Returns `AttachmentFailure` if the module is already attached, or any
    /// error raised while honouring `options`.
    fn attach(&mut self, memory: Arc<dyn MemoryInterface>, base: u64, options: ModuleOptions) -> Result<()>;

    /// Base address, once attached
    fn base(&self) -> Option<u64>;

    /// Options received at attach time
    fn options(&self) -> Option<ModuleOptions>;
}

/// Memory binding shared by the module implementations
#[derive(Debug)]
pub(crate) struct Window {
    name: &'static str,
    memory: Arc<dyn MemoryInterface>,
    base: u64,
    span: u64,
    options: ModuleOptions,
}

impl Window {
    pub(crate) fn bind(
        slot: &mut Option<Self>,
        name: &'static str,
        memory: Arc<dyn MemoryInterface>,
        base: u64,
        span: u64,
        options: ModuleOptions,
    ) -> Result<()> {
        if let Some(existing) = slot {
            return Err(TrackerError::attachment_failure(
                name,
                format!("already attached at {:#010x}", existing.base),
            ));
        }
        if base.checked_add(span).is_none() {
            return Err(TrackerError::attachment_failure(
                name,
                format!("{span:#x} bytes from {base:#x} overflow the address space"),
            ));
        }
        *slot = Some(Self {
            name,
            memory,
            base,
            span,
            options,
        });
        Ok(())
    }

    pub(crate) fn get<'a>(slot: &'a Option<Self>, name: &'static str) -> Result<&'a Self> {
        slot.as_ref()
            .ok_or_else(|| TrackerError::transfer_failed(format!("{name} is not attached")))
    }

    pub(crate) const fn base(&self) -> u64 {
        self.base
    }

    pub(crate) const fn options(&self) -> ModuleOptions {
        self.options
    }

    fn address(&self, offset: u64) -> Result<u64> {
        if offset.saturating_add(4) > self.span {
            return Err(TrackerError::out_of_range("offset", offset, self.span));
        }
        Ok(self.base + offset)
    }

    pub(crate) fn read32(&self, offset: u64) -> Result<u32> {
        let address = self.address(offset)?;
        tracing::trace!("{}: read +{offset:#x}", self.name);
        self.memory.read32(address)
    }

    pub(crate) fn write32(&self, offset: u64, value: u32) -> Result<()> {
        let address = self.address(offset)?;
        tracing::trace!("{}: write +{offset:#x} = {value:#x}", self.name);
        self.memory.write32(address, value)
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        tracing::debug!("{}: detached from {:#010x}", self.name, self.base);
    }
}
