//! Absolute address map of the card's register space.
//!
//! ```text
//! Window        Base          Size      Contents
//! ───────────── ───────────── ───────── ─────────────────────────────────
//! PCIe core     0x0000_0000   8 MB      AXI PCIe core (version, DMA, PHY)
//! PGP/FC core   0x0080_0000   8 MB      PGP/FC quads, links, VCs
//! ```
//!
//! Both windows are relative to the base of the single memory interface.
//! The bases are fixed constants; they are not derived from the windows'
//! contents.

/// PCIe core window base.
pub const PCIE_CORE_BASE: u64 = 0x0000_0000;

/// PCIe core window size.
pub const PCIE_CORE_SIZE: u64 = 0x0080_0000;

/// PGP/FC protocol core window base.
pub const PGPFC_BASE: u64 = 0x0080_0000;

/// PGP/FC protocol core window size.
pub const PGPFC_SIZE: u64 = 0x0080_0000;

/// Named address windows on the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// AXI PCIe core.
    PcieCore,
    /// PGP/FC protocol core.
    PgpFc,
}

impl Region {
    /// Absolute base address of this window.
    #[must_use]
    pub const fn base(&self) -> u64 {
        match self {
            Self::PcieCore => PCIE_CORE_BASE,
            Self::PgpFc => PGPFC_BASE,
        }
    }

    /// Size of this window in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        match self {
            Self::PcieCore => PCIE_CORE_SIZE,
            Self::PgpFc => PGPFC_SIZE,
        }
    }

    /// Translate a window-relative offset into an absolute address.
    ///
    /// Returns `None` if `offset` falls outside the window.
    #[must_use]
    pub const fn absolute(&self, offset: u64) -> Option<u64> {
        if offset < self.size() {
            Some(self.base() + offset)
        } else {
            None
        }
    }

    /// Name of the module occupying this window.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PcieCore => "AxiPcieCore",
            Self::PgpFc => "PgpFc",
        }
    }
}

/// Whether two half-open address ranges `[a_base, a_base+a_len)` and
/// `[b_base, b_base+b_len)` share any address.
#[must_use]
pub const fn overlaps(a_base: u64, a_len: u64, b_base: u64, b_len: u64) -> bool {
    a_len != 0 && b_len != 0 && a_base < b_base.saturating_add(b_len) && b_base < a_base.saturating_add(a_len)
}
