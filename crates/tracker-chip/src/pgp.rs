//! Internal child layout of the register-map modules.
//!
//! Only the addressing is modelled here; register contents belong to the
//! firmware.
//!
//! ```text
//! PGP/FC core (base 0x0080_0000)
//!   quad q          + q * 0x0010_0000
//!     link l        + l * 0x0001_0000
//!       status      + 0x0000
//!
//! PCIe core (base 0x0000_0000)
//!   AxiVersion      + 0x0002_0000
//!     FpgaVersion   + 0x000
//!     ScratchPad    + 0x004
//!     UpTimeCnt     + 0x008
//! ```

/// Address stride between quads in the PGP/FC core.
pub const QUAD_STRIDE: u64 = 0x0010_0000;

/// Address stride between links inside a quad.
pub const LINK_STRIDE: u64 = 0x0001_0000;

/// Link status word, relative to the link base.
pub const LINK_STATUS: u64 = 0x0000;

/// Maximum quads that fit in the PGP/FC window.
pub const MAX_QUADS: usize = (crate::addr::PGPFC_SIZE / QUAD_STRIDE) as usize;

/// Maximum links that fit in one quad.
pub const MAX_LINKS: usize = (QUAD_STRIDE / LINK_STRIDE) as usize;

/// Offset of a link block relative to the PGP/FC core base.
#[must_use]
pub const fn link_offset(quad: usize, link: usize) -> u64 {
    quad as u64 * QUAD_STRIDE + link as u64 * LINK_STRIDE
}

/// AXI version block inside the PCIe core.
pub mod axi_version {
    /// Block offset relative to the PCIe core base.
    pub const BASE: u64 = 0x0002_0000;
    /// Firmware version word.
    pub const FPGA_VERSION: u64 = 0x000;
    /// Read/write scratchpad.
    pub const SCRATCH_PAD: u64 = 0x004;
    /// Seconds since FPGA configuration.
    pub const UP_TIME_CNT: u64 = 0x008;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_offsets() {
        assert_eq!(link_offset(0, 0), 0);
        assert_eq!(link_offset(0, 3), 0x3_0000);
        assert_eq!(link_offset(2, 1), 0x21_0000);
        assert_eq!(MAX_QUADS, 8);
        assert_eq!(MAX_LINKS, 16);
    }
}
